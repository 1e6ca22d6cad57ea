//! Bully Election Error Types

use thiserror::Error;

use crate::directory::NodeId;

/// Result type alias for election operations
pub type Result<T> = std::result::Result<T, Error>;

/// Election error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Protocol errors
    #[error("Malformed message {line:?}: {reason}")]
    MalformedMessage { line: String, reason: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unknown peer: node {0} is not in the peer directory")]
    UnknownPeer(NodeId),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a malformed-message error for an inbound line
    pub fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Error::MalformedMessage {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this error means the target peer could not be reached.
    ///
    /// The election engine counts these against the peer's retry budget.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::Network(_)
                | Error::Io(_)
        )
    }
}
