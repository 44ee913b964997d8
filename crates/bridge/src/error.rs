//! Error types for the command bridge.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can surface from a dispatched command.
#[derive(Debug, Error)]
pub enum Error {
    /// No primary session is registered; the call fails fast without a
    /// network round trip.
    #[error("no primary session registered")]
    ConnectionUnavailable,

    /// No matching response arrived within the deadline. The pending call is
    /// discarded; a late response for it is dropped.
    #[error("timed out after {ms}ms waiting for response")]
    Timeout { ms: u64 },

    /// The executor reported a failure while applying the command. Render
    /// state on the session side is unchanged.
    #[error("remote execution failed: {message}")]
    RemoteExecution { message: String },

    /// Malformed envelope, unknown command name, or invalid argument shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A second caller attempted to claim the primary role while one exists.
    #[error("a primary session is already registered")]
    SessionConflict,

    /// Failed to reach the bridge endpoint.
    #[error("failed to connect to bridge endpoint: {0}")]
    ConnectionFailed(String),

    /// Transport-level error on the session socket.
    #[error("transport error: {0}")]
    Transport(String),

    /// Session channel closed while a call was in flight.
    #[error("session channel closed unexpectedly")]
    ChannelClosed,

    /// Snapshot raster encoding failed.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if the command itself was malformed or invalid.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}
