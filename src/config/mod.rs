pub mod scan_config;
pub mod session_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::utils::ensure_directory_exists;

pub use scan_config::ScanConfig;
pub use session_config::SessionConfig;

const CONFIG_FILE_NAME: &str = "nch_config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub scan: ScanConfig,
}

impl AppConfig {
    /// Loads the config from `config_dir`, falling back to defaults when the file is missing.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!(
                "Config file not found at {:?}, using default.",
                file_path_str
            );
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config to `config_dir`.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;

        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(&file_path, config_json).await?;
        info!("Config saved to {:?}", file_path_str);
        Ok(())
    }

    /// Loads the config and writes it back with every key present.
    pub async fn write_effective(config_dir: &Path) -> Result<Self> {
        let config = Self::load_config(config_dir).await?;
        config.save_config(config_dir).await?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_config(dir.path()).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.session.ack_sentinel, "CONNECTED");
        assert_eq!(config.scan.name_filter, "nch");
    }

    #[tokio::test]
    async fn saved_config_is_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nch");
        let mut config = AppConfig::default();
        config.session.response_timeout_ms = 1500;
        config.scan.min_rssi = Some(-70);

        config.save_config(&nested).await.unwrap();
        assert_eq!(AppConfig::load_config(&nested).await.unwrap(), config);
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "session": { "response_timeout_ms": 250 } }"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load_config(dir.path()).await.unwrap();
        assert_eq!(config.session.response_timeout_ms, 250);
        assert_eq!(config.session.ack_sentinel, "CONNECTED");
        assert_eq!(config.scan, ScanConfig::default());
    }

    #[tokio::test]
    async fn effective_config_fills_in_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&file_path, r#"{ "scan": { "min_rssi": -60 } }"#)
            .await
            .unwrap();

        let config = AppConfig::write_effective(dir.path()).await.unwrap();
        assert_eq!(config.scan.min_rssi, Some(-60));

        let written: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&file_path).await.unwrap()).unwrap();
        assert_eq!(written["scan"]["min_rssi"], -60);
        assert_eq!(written["scan"]["name_filter"], "nch");
        assert_eq!(written["session"]["ack_sentinel"], "CONNECTED");
        assert_eq!(AppConfig::load_config(dir.path()).await.unwrap(), config);
    }
}
