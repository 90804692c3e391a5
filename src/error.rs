//! Session Error Kinds
//!
//! Every session-ending condition apart from a clean end-of-stream. A clean
//! close is not an error: the relay engine simply terminates. All of these
//! are session-local; they never take down the listener set or any other
//! session.

use thiserror::Error;

/// Errors that terminate a single forwarding session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Device enumeration stabilized on an empty set
    #[error("no devices available")]
    NoDevicesAvailable,

    /// A specific device was requested but is not attached
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The transport failed to open a stream to the remote port
    #[error("failed to connect to port {port} on device {serial}: {reason}")]
    RemoteConnectFailed {
        serial: String,
        port: u16,
        reason: String,
    },

    /// Read or write failure while relaying
    #[error("stream error during relay: {0}")]
    Stream(#[from] std::io::Error),
}

impl SessionError {
    /// True when the failure happened before any remote stream was opened
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            SessionError::NoDevicesAvailable | SessionError::DeviceNotFound(_)
        )
    }
}
