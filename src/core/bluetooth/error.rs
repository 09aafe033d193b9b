//! Error types for the Bluetooth module.

use thiserror::Error;

use crate::core::bluetooth::types::SessionState;

/// Failure reported by the platform Bluetooth stack. The reason is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct LinkError {
    pub reason: String,
}

impl LinkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<bluest::Error> for LinkError {
    fn from(e: bluest::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Usage errors returned synchronously by a device session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not valid in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A command is already awaiting its response
    #[error("A command is already awaiting a response")]
    Busy,

    /// Commands need an open channel
    #[error("Not connected")]
    NotConnected,

    /// No Wi-Fi report has been received yet
    #[error("Wi-Fi state is not known yet")]
    UnknownWifiState,

    /// Writing to the channel failed
    #[error("Failed to send command: {reason}")]
    Send { reason: String },

    /// The session driver has stopped
    #[error("Session closed")]
    Closed,
}

/// Errors returned by the registry and the manager.
#[derive(Debug, Error)]
pub enum BluetoothError {
    #[error("A scan is already running")]
    ScanAlreadyActive,

    #[error("A device session is already active")]
    SessionActive,

    #[error("Device not found with address: {0}")]
    UnknownDevice(String),

    #[error("No device session is active")]
    NoActiveSession,

    #[error("Device session has not terminated (state: {0})")]
    SessionNotTerminated(SessionState),

    /// The last scan cycle ended because the platform stack failed
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Device registry lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, BluetoothError>;
