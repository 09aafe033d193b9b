//! Presentation commands
//! This module defines the calls a user interface makes into the core. Each
//! one locks the manager for the duration of the call only; progress is
//! reported through the event channel returned by [`AppState::new`].

use anyhow::Result;

use crate::core::bluetooth::{DeviceDescriptor, NchCommand, SessionSnapshot};
use crate::state::AppState;

/// Starts a discovery cycle
///
/// Emits `scan_started`, then `device_added` / `device_updated` for every NCH
/// seen, and `scan_complete` when the cycle ends.
pub async fn start_scan(app_state: &AppState) -> Result<()> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    bluetooth_manager_guard.start_scan()?;
    Ok(())
}

pub async fn stop_scan(app_state: &AppState) -> Result<()> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    bluetooth_manager_guard.stop_scan().await?;
    Ok(())
}

/// Lists the NCHs found in the current cycle
pub async fn list_devices(app_state: &AppState) -> Vec<DeviceDescriptor> {
    app_state.bluetooth_manager.lock().await.devices()
}

/// Selects a discovered device by address and starts pairing or connecting
///
/// # Arguments
/// * `address` - The platform address reported in `device_added`
pub async fn select_device(app_state: &AppState, address: &str) -> Result<()> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    bluetooth_manager_guard.select_device(address).await?;
    Ok(())
}

/// Answers "yes" to the retry prompt after `pairing_failed`,
/// `connect_failed` or a lost connection
pub async fn confirm_pair_retry(app_state: &AppState) -> Result<()> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    bluetooth_manager_guard.confirm_pair_retry().await?;
    Ok(())
}

/// Answers "no" to the retry prompt
pub async fn abandon(app_state: &AppState) -> Result<()> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    bluetooth_manager_guard.abandon().await?;
    Ok(())
}

pub async fn send_command(app_state: &AppState, command: NchCommand) -> Result<()> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    bluetooth_manager_guard.send_command(command).await?;
    Ok(())
}

/// Flips the Wi-Fi radio, returning the command that was sent
pub async fn toggle_wifi(app_state: &AppState) -> Result<NchCommand> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    Ok(bluetooth_manager_guard.toggle_wifi().await?)
}

pub async fn request_disconnect(app_state: &AppState) -> Result<()> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let mut bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    bluetooth_manager_guard.request_disconnect().await?;
    Ok(())
}

/// Current view of the selected device
pub async fn get_status(app_state: &AppState) -> Result<SessionSnapshot> {
    let bluetooth_manager_arc = app_state.get_bluetooth_manager_arc();
    let bluetooth_manager_guard = bluetooth_manager_arc.lock().await;

    Ok(bluetooth_manager_guard.snapshot().await?)
}
