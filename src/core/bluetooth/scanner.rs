//! Device discovery
//! Runs one scan cycle in the background, feeding everything the backend
//! reports into the [`SessionRegistry`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::connection::{BluetoothBackend, DeviceTable};
use crate::core::bluetooth::constants::DISCOVERY_CHANNEL_CAPACITY;
use crate::core::bluetooth::error::{BluetoothError, LinkError, Result};
use crate::core::bluetooth::registry::SessionRegistry;
use crate::core::bluetooth::types::DeviceDescriptor;

pub struct BluetoothScanner {
    backend: Arc<dyn BluetoothBackend>,
    registry: Arc<Mutex<SessionRegistry>>,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<std::result::Result<(), LinkError>>>,
}

impl BluetoothScanner {
    pub fn new(backend: Arc<dyn BluetoothBackend>, registry: Arc<Mutex<SessionRegistry>>) -> Self {
        Self {
            backend,
            registry,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Starts a scan cycle that ends by itself after `duration`.
    pub fn start_scan(&mut self, duration: Duration) -> Result<()> {
        lock(&self.registry)?.begin_scan()?;

        self.cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::internal_scan_task(
            self.backend.clone(),
            self.registry.clone(),
            self.cancel_token.clone(),
            duration,
        ));
        self.scan_task_handle = Some(handle);

        info!("Device scan task started.");
        Ok(())
    }

    async fn internal_scan_task(
        backend: Arc<dyn BluetoothBackend>,
        registry: Arc<Mutex<SessionRegistry>>,
        cancel_token: CancellationToken,
        duration: Duration,
    ) -> std::result::Result<(), LinkError> {
        let (found_tx, mut found_rx) = mpsc::channel(DISCOVERY_CHANNEL_CAPACITY);

        let discovery = {
            let cancel_token = cancel_token.clone();
            tokio::spawn(async move { backend.discover(found_tx, cancel_token).await })
        };

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                found = found_rx.recv() => match found {
                    Some(descriptor) => {
                        if !record_device(&registry, descriptor) {
                            error!("Registry lock poisoned, aborting scan");
                            cancel_token.cancel();
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut deadline, if !cancel_token.is_cancelled() => {
                    info!("Scan cycle elapsed.");
                    cancel_token.cancel();
                }
            }
        }

        let outcome = match discovery.await {
            Ok(Ok(())) => {
                info!("Discovery finished.");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) if e.is_cancelled() => {
                info!("Discovery task was cancelled.");
                Ok(())
            }
            Err(e) => Err(LinkError::new(format!("Discovery task failed: {}", e))),
        };

        let finished = lock(&registry).map(|mut registry| {
            if let Err(e) = &outcome {
                registry.on_scan_failed(e.reason.clone());
            }
            registry.end_scan();
        });
        if let Err(e) = finished {
            error!("Failed to end scan: {}", e);
        }
        outcome
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_task_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Cancels the running scan cycle and waits for it to wind down.
    ///
    /// Fails with [`BluetoothError::Discovery`] when the cycle had already
    /// been cut short by the platform stack.
    pub async fn stop_scan(&mut self) -> Result<()> {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        let Some(handle) = self.scan_task_handle.take() else {
            info!("No active scan task handle found to wait for.");
            return Ok(());
        };
        debug!("Waiting for scan task to finish...");
        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BluetoothError::Discovery(e.reason)),
            Err(e) => {
                error!("Scan task finished with an unexpected join error: {:?}", e);
                lock(&self.registry)?.end_scan();
                Ok(())
            }
        }
    }
}

fn record_device(registry: &Mutex<SessionRegistry>, descriptor: DeviceDescriptor) -> bool {
    match registry.lock() {
        Ok(mut registry) => {
            registry.on_device_found(descriptor);
            true
        }
        Err(_) => false,
    }
}

fn lock(registry: &Mutex<SessionRegistry>) -> Result<std::sync::MutexGuard<'_, SessionRegistry>> {
    registry
        .lock()
        .map_err(|_| BluetoothError::LockPoisoned)
}

/// Scans with a `bluest` adapter, reporting connected devices first
pub(crate) async fn discover_with_adapter(
    adapter: &Adapter,
    devices: Arc<DeviceTable<Device>>,
    min_rssi: Option<i16>,
    found: mpsc::Sender<DeviceDescriptor>,
    cancel_token: CancellationToken,
) -> std::result::Result<(), LinkError> {
    devices.start_cycle();

    info!("Checking for connected devices");
    for device in adapter.connected_devices().await? {
        report_device(&devices, &found, device).await;
    }

    info!("Starting bluetooth scan");
    let mut scan_stream = adapter.scan(&[]).await?;

    loop {
        tokio::select! {
            result = scan_stream.next() => {
                match result {
                    Some(discovered_device) => {
                        let rssi = discovered_device.rssi;
                        debug!("Found device - Device: {:?}, RSSI: {:?}", discovered_device.device, rssi);

                        let strong_enough = match (min_rssi, rssi) {
                            (Some(threshold), Some(signal_strength)) => signal_strength >= threshold,
                            (Some(_), None) => false,
                            (None, _) => true,
                        };
                        if strong_enough {
                            report_device(&devices, &found, discovered_device.device).await;
                        }
                    }
                    None => {
                        info!("Bluetooth scan stream has ended.");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }
    Ok(())
}

async fn report_device(
    devices: &DeviceTable<Device>,
    found: &mpsc::Sender<DeviceDescriptor>,
    device: Device,
) {
    let Ok(name) = device.name() else {
        return;
    };
    let address = device.id().to_string();
    let is_paired = device.is_paired().await.unwrap_or(false);

    devices.insert(address.clone(), device);

    if found
        .send(DeviceDescriptor::new(address, name, is_paired))
        .await
        .is_err()
    {
        debug!("Scan consumer is gone, dropping discovered device");
    }
}
