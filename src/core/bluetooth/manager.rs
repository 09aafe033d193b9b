//! Bluetooth manager for the NCH Wi-Fi controller
//! This module provides the interface the presentation layer talks to:
//! scanning, selecting a device, answering retry prompts, sending commands
//! and disconnecting.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::bluetooth::commands::NchCommand;
use crate::core::bluetooth::connection::BluetoothBackend;
use crate::core::bluetooth::driver::{SessionHandle, SessionSnapshot};
use crate::core::bluetooth::error::{BluetoothError, Result};
use crate::core::bluetooth::registry::SessionRegistry;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::types::{DeviceDescriptor, EventReceiver, EventSender, SessionState};

/// Manages Bluetooth operations
pub struct BluetoothManager {
    backend: Arc<dyn BluetoothBackend>,
    /// Discovered devices and the single-session policy
    registry: Arc<Mutex<SessionRegistry>>,
    /// Bluetooth scanner
    scanner: BluetoothScanner,
    /// The session handed out by the registry, if any
    session: Option<SessionHandle>,
    config: AppConfig,
}

impl BluetoothManager {
    /// Creates a new BluetoothManager and the receiver of its events
    pub fn new(backend: Arc<dyn BluetoothBackend>, config: AppConfig) -> (Self, EventReceiver) {
        let (events, event_rx) = EventSender::channel();
        let registry = Arc::new(Mutex::new(SessionRegistry::new(
            config.scan.name_filter.clone(),
            events,
        )));
        let scanner = BluetoothScanner::new(backend.clone(), registry.clone());

        let manager = Self {
            backend,
            registry,
            scanner,
            session: None,
            config,
        };
        (manager, event_rx)
    }

    fn registry(&self) -> Result<MutexGuard<'_, SessionRegistry>> {
        self.registry
            .lock()
            .map_err(|_| BluetoothError::LockPoisoned)
    }

    fn session(&self) -> Result<&SessionHandle> {
        self.session.as_ref().ok_or(BluetoothError::NoActiveSession)
    }

    /// Starts a discovery cycle
    pub fn start_scan(&mut self) -> Result<()> {
        self.scanner.start_scan(self.config.scan.scan_duration())
    }

    /// Ends the running discovery cycle early
    pub async fn stop_scan(&mut self) -> Result<()> {
        self.scanner.stop_scan().await
    }

    pub fn is_scanning(&self) -> bool {
        self.registry().map(|registry| registry.is_scanning()).unwrap_or(false)
    }

    /// Devices found in the current cycle
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.registry()
            .map(|registry| registry.devices().cloned().collect())
            .unwrap_or_default()
    }

    /// Looks a discovered device up by address or display name
    pub fn find_device(&self, address_or_name: &str) -> Option<DeviceDescriptor> {
        self.registry()
            .ok()
            .and_then(|registry| registry.find(address_or_name).cloned())
    }

    /// Selects a discovered device and starts pairing or connecting to it.
    pub async fn select_device(&mut self, address: &str) -> Result<()> {
        if self.scanner.is_scanning() || self.is_scanning() {
            self.stop_scan().await?;
        }
        self.release_finished_session()?;

        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let session = self.registry()?.begin_session(
            address,
            &self.config.session,
            |device| backend.create_link(device, link_tx),
        )?;

        let handle = SessionHandle::spawn(session, link_rx);
        handle.start().await?;
        info!("Selected {} ({})", handle.device().name, address);
        self.session = Some(handle);
        Ok(())
    }

    /// Answers "try again?" after a failed pairing, connect or a lost link
    pub async fn confirm_pair_retry(&mut self) -> Result<()> {
        self.session()?.retry().await?;
        Ok(())
    }

    /// Gives up on the current device and releases it
    pub async fn abandon(&mut self) -> Result<()> {
        self.session()?.abandon().await?;
        self.end_session()
    }

    pub async fn send_command(&mut self, command: NchCommand) -> Result<()> {
        self.session()?.send(command).await?;
        Ok(())
    }

    /// Flips the Wi-Fi radio relative to the last report
    pub async fn toggle_wifi(&mut self) -> Result<NchCommand> {
        Ok(self.session()?.toggle_wifi().await?)
    }

    /// Closes the channel and releases the session
    pub async fn request_disconnect(&mut self) -> Result<()> {
        self.session()?.disconnect().await?;
        self.end_session()
    }

    /// Returns the active session to the registry. The session must have
    /// reached a terminal state.
    pub fn end_session(&mut self) -> Result<()> {
        self.registry()?.end_session()?;
        self.session = None;
        Ok(())
    }

    fn release_finished_session(&mut self) -> Result<()> {
        let Some(state) = self.registry()?.active_state() else {
            return Ok(());
        };
        if state.is_engaged() {
            return Err(BluetoothError::SessionActive);
        }
        warn!("Releasing previous session left in state {}", state);
        self.end_session()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(|session| session.state())
    }

    /// Waits until the active session reaches a state accepted by `predicate`
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState> {
        Ok(self.session()?.wait_for_state(predicate).await?)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        Ok(self.session()?.snapshot().await?)
    }
}
