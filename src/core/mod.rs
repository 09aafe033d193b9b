//! Core functionality for the NCH Wi-Fi controller
//! This module contains everything needed to drive an NCH without any UI.

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, NchCommand, SessionEvent, SessionState, WifiState};
