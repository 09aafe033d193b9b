//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use log::error;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::bluetooth::commands::NchCommand;

/// Represents a discovered NCH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Platform identifier of the device, unique per device
    pub address: String,
    /// The advertised display name
    pub name: String,
    /// Whether the host is already paired with the device
    pub is_paired: bool,
}

impl DeviceDescriptor {
    /// Creates a new DeviceDescriptor instance
    pub fn new(address: impl Into<String>, name: impl Into<String>, is_paired: bool) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            is_paired,
        }
    }

    /// Returns true if the display name contains `filter`, ignoring case
    pub fn matches_family(&self, filter: &str) -> bool {
        self.name.to_lowercase().contains(&filter.to_lowercase())
    }
}

/// State of the NCH's Wi-Fi radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WifiState {
    On,
    Off,
}

impl fmt::Display for WifiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Lifecycle of one device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Pairing,
    PairFailed,
    Connecting,
    ConnectFailed,
    ConnectedIdle,
    ConnectedBusy,
    Disconnecting,
    Disconnected,
}

impl SessionState {
    /// Terminal for the current attempt; a retry may re-enter the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PairFailed | Self::ConnectFailed | Self::Disconnected)
    }

    /// The session is pairing, connecting, connected or closing.
    pub fn is_engaged(&self) -> bool {
        matches!(
            self,
            Self::Pairing
                | Self::Connecting
                | Self::ConnectedIdle
                | Self::ConnectedBusy
                | Self::Disconnecting
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::ConnectedIdle | Self::ConnectedBusy)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Events emitted towards the presentation layer, in transition order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    ScanStarted,
    DeviceAdded(DeviceDescriptor),
    DeviceUpdated(DeviceDescriptor),
    ScanComplete,
    /// The platform stack could not run the scan; `ScanComplete` follows
    ScanFailed { reason: String },
    PairingStarted,
    PairingFailed { reason: String },
    Paired,
    ConnectFailed { reason: String },
    Connected,
    WifiStateChanged(WifiState),
    CommandTimedOut(NchCommand),
    CommandSendFailed { reason: String },
    /// A message the codec did not recognise, surfaced for diagnostics
    ProtocolAnomaly { raw: String, bytes: Vec<u8> },
    UnexpectedDisconnect,
    Disconnected,
}

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Sending half of the event channel shared by the registry and the session.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.tx.send(event) {
            error!("Failed to emit {:?} event: receiver dropped", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_filter_ignores_case() {
        let device = DeviceDescriptor::new("00-11", "Office NCH-42", false);
        assert!(device.matches_family("nch"));
        assert!(device.matches_family("NCH"));
        assert!(!DeviceDescriptor::new("00-12", "Keyboard", false).matches_family("nch"));
    }

    #[test]
    fn state_classes() {
        assert!(SessionState::Disconnected.is_terminal());
        assert!(SessionState::ConnectFailed.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::ConnectedIdle.is_terminal());
        assert!(SessionState::ConnectedBusy.is_engaged());
        assert!(!SessionState::PairFailed.is_engaged());
    }

    #[test]
    fn events_serialize_as_tagged_json() {
        let json = serde_json::to_value(SessionEvent::WifiStateChanged(WifiState::On)).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "wifi_state_changed", "data": "on" }));
    }

    #[test]
    fn anomaly_keeps_the_bytes() {
        let json = serde_json::to_value(SessionEvent::ProtocolAnomaly {
            raw: "\u{fffd}A".to_string(),
            bytes: vec![0xff, b'A'],
        })
        .unwrap();
        assert_eq!(json["data"]["bytes"], serde_json::json!([255, 65]));
    }
}
