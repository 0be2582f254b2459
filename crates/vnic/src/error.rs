//! Error types for the virtual interface controller

use thiserror::Error;
use vnic_types::{NetworkId, ParseError};

/// Failure reported by the packet stack collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {reason}")]
pub struct StackError {
    /// Stack operation that failed (e.g. "bind_address")
    pub operation: &'static str,
    /// Reason given by the stack
    pub reason: String,
}

impl StackError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Virtual interface controller errors
#[derive(Error, Debug)]
pub enum VnicError {
    /// Configuration error (bad MTU, bad config file, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed address, MAC or network id
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] ParseError),

    /// Resource acquisition failed (thread creation)
    #[error("Resource error: {0}")]
    Resource(String),

    /// Packet stack collaborator rejected an operation
    #[error("Stack error: {0}")]
    Stack(#[from] StackError),

    /// No controller is joined to the network
    #[error("Network not joined: {0}")]
    NetworkNotFound(NetworkId),

    /// A controller is already joined to the network
    #[error("Network already joined: {0}")]
    NetworkAlreadyJoined(NetworkId),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, VnicError>;
