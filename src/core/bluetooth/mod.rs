//! Bluetooth functionality for the NCH Wi-Fi controller
//! This module handles all bluetooth operations including scanning,
//! pairing, connecting, and exchanging commands with an NCH.

mod commands;
mod connection;
mod constants;
mod driver;
mod error;
mod manager;
mod registry;
mod scanner;
mod session;
mod types;

// Re-export types that should be publicly accessible
pub use commands::{CommandCodec, NchCommand, NchMessage};
pub use connection::{
    BluestBackend, BluestLink, BluetoothBackend, DeviceLink, LinkEvent, LinkEventReceiver,
    LinkEventSender,
};
pub use constants::*; // Re-export all constants
pub use driver::{SessionHandle, SessionSnapshot};
pub use error::{BluetoothError, LinkError, SessionError};
pub use manager::BluetoothManager;
pub use registry::SessionRegistry;
pub use scanner::BluetoothScanner;
pub use session::{DeviceSession, PendingCommand};
pub use types::{
    DeviceDescriptor, EventReceiver, EventSender, SessionEvent, SessionState, WifiState,
};
