//! End-to-end tests over loopback TCP.

mod test_harness;

use std::time::Duration;

use bully_election::election::Phase;
use bully_election::network::send_once;
use bully_election::protocol::Message;
use test_harness::TcpCluster;

/// Test 1: Real nodes elect the highest id and fail over
#[tokio::test]
async fn test_tcp_cluster_elects_and_fails_over() {
    let mut cluster = TcpCluster::new(3).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(10))
        .await
        .expect("Initial leader should be elected");
    assert_eq!(leader, 3);

    assert!(cluster.shutdown_node(3).await, "Should shut down the leader");

    // Survivors keep following node 3 until their follower timeout passes
    let new_leader = cluster
        .wait_for_new_leader(3, Duration::from_secs(10))
        .await
        .expect("New leader should be elected");
    assert_eq!(new_leader, 2);
    assert_eq!(cluster.node(1).unwrap().engine().leader_id().await, Some(2));

    cluster.shutdown().await;
}

/// Test 2: A line written by hand is handled like a peer's message
#[tokio::test]
async fn test_raw_leader_line_is_accepted() {
    let cluster = TcpCluster::new(2).await;
    assert_eq!(cluster.wait_for_leader(Duration::from_secs(10)).await, Some(2));

    let node = cluster.node(1).unwrap();
    let address = node.local_addr().to_string();
    send_once(
        &address,
        Message::Heartbeat,
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
    .await
    .expect("Heartbeat should be delivered");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = node.engine().snapshot().await;
    assert_eq!(snapshot.phase, Phase::Follower);
    assert_eq!(snapshot.leader_id, Some(2));

    cluster.shutdown().await;
}
