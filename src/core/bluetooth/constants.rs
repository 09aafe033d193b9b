//! Constants used throughout the application
//! This module contains the wire strings spoken by the NCH, the GATT
//! identifiers of its serial channel, and default timings.

use uuid::Uuid;

/// Substring every NCH advertises in its display name (matched case-insensitively)
pub const NCH_NAME_FILTER: &str = "nch";

/// Wire text of the Wi-Fi state query
pub const WIRE_GET_WIFI: &str = "Get_Wifi";

/// Wire text of the Wi-Fi enable command
pub const WIRE_WIFI_ENABLE: &str = "Wifi_Enable";

/// Wire text of the Wi-Fi disable command
pub const WIRE_WIFI_DISABLE: &str = "Wifi_Disable";

/// Acknowledgement the NCH prints once the serial channel is open
pub const WIRE_CONNECTION_ACK: &str = "CONNECTED";

/// Report meaning the Wi-Fi radio is on
pub const WIRE_WIFI_ON: &str = "1";

/// Report meaning the Wi-Fi radio is off
pub const WIRE_WIFI_OFF: &str = "0";

/// Serial (UART-style) service exposed by the NCH
pub const UUID_SERIAL_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Characteristic the host writes commands to
pub const UUID_SERIAL_WRITE_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Characteristic the NCH notifies responses on
pub const UUID_SERIAL_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// How long a command waits for its report before it is abandoned
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Length of one discovery cycle in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 10;

/// Capacity of the discovery hand-off channel between backend and scanner
pub const DISCOVERY_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the request queue of a session driver
pub const SESSION_REQUEST_CAPACITY: usize = 16;
