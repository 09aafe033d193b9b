//! Application state management
//! This module defines and manages the state shared by the presentation layer.

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::core::BluetoothManager;
use crate::core::bluetooth::{BluestBackend, BluetoothBackend, EventReceiver};

/// Global application state
pub struct AppState {
    /// The Bluetooth manager instance
    pub bluetooth_manager: Arc<Mutex<BluetoothManager>>,
    pub config: AppConfig,
}

impl AppState {
    /// Creates the state on top of the system Bluetooth adapter.
    pub async fn new(config: AppConfig) -> Result<(Self, EventReceiver)> {
        info!("Initializing BluetoothManager...");
        let backend = BluestBackend::new(config.scan.min_rssi).await?;
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// Creates the state on top of an arbitrary Bluetooth stack
    pub fn with_backend(
        backend: Arc<dyn BluetoothBackend>,
        config: AppConfig,
    ) -> (Self, EventReceiver) {
        let (manager, events) = BluetoothManager::new(backend, config.clone());
        let state = Self {
            bluetooth_manager: Arc::new(Mutex::new(manager)),
            config,
        };
        (state, events)
    }

    /// Gets a reference to the Bluetooth manager
    pub fn get_bluetooth_manager_arc(&self) -> Arc<Mutex<BluetoothManager>> {
        self.bluetooth_manager.clone()
    }
}
