use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{DEFAULT_SCAN_DURATION_SECS, NCH_NAME_FILTER};

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Substring a display name must contain (case-insensitive) to count as an NCH
    pub name_filter: String,
    /// Length of one scan cycle in seconds
    pub scan_duration_secs: u64,
    /// Devices weaker than this RSSI are not reported. `None` reports everything.
    pub min_rssi: Option<i16>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            name_filter: NCH_NAME_FILTER.to_string(),
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            min_rssi: None,
        }
    }
}

impl ScanConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }
}
