//! NCH command codec
//! Maps the closed command set onto the ASCII text the NCH understands, and
//! classifies whatever text comes back.

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    WIRE_CONNECTION_ACK, WIRE_GET_WIFI, WIRE_WIFI_DISABLE, WIRE_WIFI_ENABLE, WIRE_WIFI_OFF,
    WIRE_WIFI_ON,
};
use crate::core::bluetooth::types::WifiState;

/// Commands that can be sent to the NCH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NchCommand {
    /// Ask for the current Wi-Fi state ("Get_Wifi")
    GetWifiState,
    /// Turn the Wi-Fi radio on ("Wifi_Enable")
    EnableWifi,
    /// Turn the Wi-Fi radio off ("Wifi_Disable")
    DisableWifi,
}

impl NchCommand {
    /// All commands, in wire-table order
    pub const ALL: [NchCommand; 3] = [Self::GetWifiState, Self::EnableWifi, Self::DisableWifi];

    /// The wire text of this command
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::GetWifiState => WIRE_GET_WIFI,
            Self::EnableWifi => WIRE_WIFI_ENABLE,
            Self::DisableWifi => WIRE_WIFI_DISABLE,
        }
    }

    /// Convert the command to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_wire().as_bytes().to_vec()
    }

    /// The command that flips the radio away from `current`
    pub fn toggle_from(current: WifiState) -> Self {
        match current {
            WifiState::On => Self::DisableWifi,
            WifiState::Off => Self::EnableWifi,
        }
    }
}

/// A message received from the NCH
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NchMessage {
    /// The acknowledgement printed right after the channel opens
    ConnectionAck,
    /// "1" or "0"
    WifiStateReport(WifiState),
    /// Anything else, kept verbatim for diagnostics
    Unrecognized(Vec<u8>),
}

/// Stateless codec between [`NchCommand`]/[`NchMessage`] and wire text.
///
/// The acknowledgement literal is device-defined, so it is carried by the
/// codec rather than hard-coded.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    ack_sentinel: String,
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new(WIRE_CONNECTION_ACK)
    }
}

impl CommandCodec {
    pub fn new(ack_sentinel: impl Into<String>) -> Self {
        Self {
            ack_sentinel: ack_sentinel.into(),
        }
    }

    pub fn encode(&self, command: NchCommand) -> Vec<u8> {
        command.to_bytes()
    }

    /// Classifies one message. Never fails: unknown text becomes
    /// [`NchMessage::Unrecognized`] holding the original bytes.
    pub fn decode(&self, bytes: &[u8]) -> NchMessage {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.trim(),
            Err(_) => return NchMessage::Unrecognized(bytes.to_vec()),
        };

        if text == self.ack_sentinel {
            NchMessage::ConnectionAck
        } else if text == WIRE_WIFI_ON {
            NchMessage::WifiStateReport(WifiState::On)
        } else if text == WIRE_WIFI_OFF {
            NchMessage::WifiStateReport(WifiState::Off)
        } else {
            NchMessage::Unrecognized(bytes.to_vec())
        }
    }

    /// Splits one received chunk into messages.
    ///
    /// Lines end at CR or LF; a chunk without any terminator is a single
    /// message. Blank segments are dropped.
    pub fn split_frames<'a>(&self, chunk: &'a [u8]) -> Vec<&'a [u8]> {
        chunk
            .split(|b| *b == b'\n' || *b == b'\r')
            .filter(|frame| !frame.iter().all(|b| b.is_ascii_whitespace()))
            .collect()
    }

    /// Splits and decodes one received chunk.
    pub fn decode_chunk(&self, chunk: &[u8]) -> Vec<NchMessage> {
        self.split_frames(chunk)
            .into_iter()
            .map(|frame| self.decode(frame))
            .collect()
    }
}
