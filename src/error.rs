use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which transport primitive a timed-out send was waiting on.
///
/// Carried for diagnostics only; both variants time out the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPrimitive {
    /// The transport acknowledges once the payload is handed off.
    Send,
    /// The transport acknowledges once the payload is delivered to the peer.
    Deliver,
}

impl fmt::Display for SendPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendPrimitive::Send => f.write_str("send"),
            SendPrimitive::Deliver => f.write_str("deliver"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EmitterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IPC message took > {} ms to {primitive}", .bound.as_millis())]
    Timeout {
        bound: Duration,
        primitive: SendPrimitive,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Emitter closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection to {name} failed after {attempts} attempt(s): {reason}")]
    ConnectionFailed {
        name: String,
        attempts: u32,
        reason: String,
    },

    #[error("Send failed after {attempts} attempt(s): {reason}")]
    SendFailed { attempts: u32, reason: String },

    #[error("Receive failed after {attempts} attempt(s): {reason}")]
    ReceiveFailed { attempts: u32, reason: String },

    #[error("Transport not connected")]
    NotConnected,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Timed out after {duration_ms} ms: {operation}")]
    Timeout { duration_ms: u64, operation: String },
}

pub type Result<T> = std::result::Result<T, EmitterError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;

impl From<serde_json::Error> for EmitterError {
    fn from(err: serde_json::Error) -> Self {
        EmitterError::Serialization(err.to_string())
    }
}
