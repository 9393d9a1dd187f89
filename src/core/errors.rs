// src/core/errors.rs

//! Defines the primary error type for the client.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures surfaced by the client.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum BerylError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// Internal codec marker: the buffer does not yet hold a complete frame.
    /// The codec maps this to "keep reading"; it never reaches a caller.
    #[error("Incomplete frame in stream")]
    Incomplete,

    /// A malformed frame. Fatal to the connection that produced it.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The socket closed or errored while requests were outstanding, or the
    /// connection was used after `close()`.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server answered a single request with an error reply. The
    /// connection stays usable; only that request fails.
    #[error("Server error: {0}")]
    Server(String),

    /// A reply decoded fine but did not have the shape the command expects.
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// A subscription was registered while the connection was tearing down.
    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PartialEq for BerylError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BerylError::Io(e1), BerylError::Io(e2)) => e1.to_string() == e2.to_string(),
            (BerylError::Protocol(s1), BerylError::Protocol(s2)) => s1 == s2,
            (BerylError::Server(s1), BerylError::Server(s2)) => s1 == s2,
            (BerylError::UnexpectedReply(s1), BerylError::UnexpectedReply(s2)) => s1 == s2,
            (BerylError::InvalidState(s1), BerylError::InvalidState(s2)) => s1 == s2,
            (BerylError::InvalidConfig(s1), BerylError::InvalidConfig(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// `std::io::Error` is not cloneable; wrapping it in an Arc keeps the whole
// enum cheaply cloneable so one failure can resolve many pending requests.
impl From<std::io::Error> for BerylError {
    fn from(e: std::io::Error) -> Self {
        BerylError::Io(Arc::new(e))
    }
}
