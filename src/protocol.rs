//! Election Wire Protocol
//!
//! One newline-terminated UTF-8 line per connection, shaped as
//! `COMMAND[:ARG]`. `ARG` is the sender's node id and is absent for
//! `HEARTBEAT`. Nothing is ever written back on the same connection.

use std::fmt;
use std::str::FromStr;

use crate::directory::NodeId;
use crate::error::{Error, Result};

/// Protocol messages exchanged between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Sender is starting an election and asks higher nodes to take over
    Election { sender: NodeId },
    /// Sender has higher priority and is alive; the receiver must stand down
    Ok { sender: NodeId },
    /// Leadership announcement, repeated by the leader as its heartbeat
    Leader { announcer: NodeId },
    /// Keep-alive that refreshes the follower timeout without naming a leader
    Heartbeat,
}

impl Message {
    /// Command keyword used on the wire
    pub fn command(&self) -> &'static str {
        match self {
            Message::Election { .. } => "ELECTION",
            Message::Ok { .. } => "OK",
            Message::Leader { .. } => "LEADER",
            Message::Heartbeat => "HEARTBEAT",
        }
    }

    /// Node id carried by the message, if any
    pub fn sender(&self) -> Option<NodeId> {
        match self {
            Message::Election { sender } | Message::Ok { sender } => Some(*sender),
            Message::Leader { announcer } => Some(*announcer),
            Message::Heartbeat => None,
        }
    }

    /// Encode as a wire line, including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sender() {
            Some(id) => write!(f, "{}:{}", self.command(), id),
            None => f.write_str(self.command()),
        }
    }
}

impl FromStr for Message {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let (command, arg) = match trimmed.split_once(':') {
            Some((command, arg)) => (command, Some(arg)),
            None => (trimmed, None),
        };

        let id = || -> Result<NodeId> {
            let raw = arg.ok_or_else(|| Error::malformed(line, "missing node id"))?;
            raw.trim()
                .parse::<NodeId>()
                .map_err(|e| Error::malformed(line, format!("invalid node id: {}", e)))
        };

        match command {
            "ELECTION" => Ok(Message::Election { sender: id()? }),
            "OK" => Ok(Message::Ok { sender: id()? }),
            "LEADER" => Ok(Message::Leader { announcer: id()? }),
            // Older peers append their id to heartbeats; it carries no meaning.
            "HEARTBEAT" => Ok(Message::Heartbeat),
            other => Err(Error::malformed(line, format!("unknown command {:?}", other))),
        }
    }
}
