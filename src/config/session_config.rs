use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{DEFAULT_RESPONSE_TIMEOUT_MS, WIRE_CONNECTION_ACK};

/// Settings of a device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a command waits for its Wi-Fi report, in milliseconds.
    pub response_timeout_ms: u64,
    /// Text the NCH prints once the channel is open. It is never shown to the user.
    pub ack_sentinel: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            ack_sentinel: WIRE_CONNECTION_ACK.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
