//! Bluetooth connection handling for the NCH
//! This module defines the transport seam used by device sessions and its
//! `bluest` implementation: pairing, opening the serial channel, writing
//! commands and forwarding notifications.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{
    UUID_SERIAL_NOTIFY_CHAR, UUID_SERIAL_SERVICE, UUID_SERIAL_WRITE_CHAR,
};
use crate::core::bluetooth::error::LinkError;
use crate::core::bluetooth::scanner;
use crate::core::bluetooth::types::DeviceDescriptor;

/// Completions and notifications delivered by a [`DeviceLink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The platform pairing procedure finished
    PairingFinished(Result<(), LinkError>),
    /// The serial channel finished opening
    OpenFinished(Result<(), LinkError>),
    /// Bytes received on the open channel
    Data(Vec<u8>),
    /// The channel was closed by the remote side or the stack
    Closed,
}

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// The wireless serial channel to one device.
///
/// `start_pairing` and `start_open` return immediately; their outcome is
/// reported later as a [`LinkEvent`].
#[async_trait]
pub trait DeviceLink: Send {
    fn start_pairing(&mut self);

    fn start_open(&mut self);

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    async fn close(&mut self) -> Result<(), LinkError>;
}

/// Platform Bluetooth stack: device discovery and link creation.
#[async_trait]
pub trait BluetoothBackend: Send + Sync {
    /// Reports devices into `found` until `cancel` fires or the inquiry ends.
    async fn discover(
        &self,
        found: mpsc::Sender<DeviceDescriptor>,
        cancel: CancellationToken,
    ) -> Result<(), LinkError>;

    /// Creates the link for a previously discovered device.
    fn create_link(
        &self,
        device: &DeviceDescriptor,
        events: LinkEventSender,
    ) -> Result<Box<dyn DeviceLink>, LinkError>;
}

fn deliver(events: &LinkEventSender, event: LinkEvent) {
    if let Err(e) = events.send(event) {
        debug!("Link event {:?} dropped: session is gone", e.0);
    }
}

/// Platform handles of the devices reported in the current scan cycle,
/// by address
#[derive(Debug)]
pub struct DeviceTable<H> {
    handles: Mutex<HashMap<String, H>>,
}

impl<H: Clone> DeviceTable<H> {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, H>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Forgets the handles of the previous cycle.
    pub fn start_cycle(&self) {
        let mut handles = self.handles();
        if !handles.is_empty() {
            debug!("Dropping {} device handle(s) from the previous scan", handles.len());
        }
        handles.clear();
    }

    pub fn insert(&self, address: String, handle: H) {
        self.handles().insert(address, handle);
    }

    pub fn get(&self, address: &str) -> Option<H> {
        self.handles().get(address).cloned()
    }
}

impl<H: Clone> Default for DeviceTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// `bluest` backed stack
pub struct BluestBackend {
    adapter: Adapter,
    devices: Arc<DeviceTable<Device>>,
    min_rssi: Option<i16>,
}

impl BluestBackend {
    pub async fn new(min_rssi: Option<i16>) -> Result<Self, LinkError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| LinkError::new("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            devices: Arc::new(DeviceTable::new()),
            min_rssi,
        })
    }
}

#[async_trait]
impl BluetoothBackend for BluestBackend {
    async fn discover(
        &self,
        found: mpsc::Sender<DeviceDescriptor>,
        cancel: CancellationToken,
    ) -> Result<(), LinkError> {
        scanner::discover_with_adapter(
            &self.adapter,
            self.devices.clone(),
            self.min_rssi,
            found,
            cancel,
        )
        .await
    }

    fn create_link(
        &self,
        device: &DeviceDescriptor,
        events: LinkEventSender,
    ) -> Result<Box<dyn DeviceLink>, LinkError> {
        let handle = self
            .devices
            .get(&device.address)
            .ok_or_else(|| LinkError::new(format!("Device not found with ID: {}", device.address)))?;

        Ok(Box::new(BluestLink::new(self.adapter.clone(), handle, events)))
    }
}

/// Serial channel over the NCH's UART-style GATT service
pub struct BluestLink {
    adapter: Adapter,
    device: Device,
    events: LinkEventSender,
    write_char: Arc<tokio::sync::Mutex<Option<Characteristic>>>,
    pair_task: Option<JoinHandle<()>>,
    io_task: Option<JoinHandle<()>>,
}

impl BluestLink {
    pub fn new(adapter: Adapter, device: Device, events: LinkEventSender) -> Self {
        Self {
            adapter,
            device,
            events,
            write_char: Arc::new(tokio::sync::Mutex::new(None)),
            pair_task: None,
            io_task: None,
        }
    }

    /// Connects, locates the serial service and subscribes to notifications.
    /// Returns once the channel is ready; notifications are then forwarded
    /// until the stream ends.
    async fn open_and_listen(
        adapter: Adapter,
        device: Device,
        write_slot: Arc<tokio::sync::Mutex<Option<Characteristic>>>,
        events: LinkEventSender,
    ) {
        let opened = Self::try_open(
            &adapter,
            &device,
            UUID_SERIAL_SERVICE,
            UUID_SERIAL_NOTIFY_CHAR,
            UUID_SERIAL_WRITE_CHAR,
        )
        .await;

        let notify_char = match opened {
            Ok((notify_char, write_char)) => {
                *write_slot.lock().await = Some(write_char);
                notify_char
            }
            Err(e) => {
                warn!("Opening serial channel to {} failed: {}", device.id(), e);
                deliver(&events, LinkEvent::OpenFinished(Err(e)));
                return;
            }
        };

        info!("Subscribing to notifications...");
        match notify_char.notify().await {
            Ok(mut notification_stream) => {
                deliver(&events, LinkEvent::OpenFinished(Ok(())));
                while let Some(result) = notification_stream.next().await {
                    match result {
                        Ok(value) => {
                            debug!("Received NCH data: {:?}", String::from_utf8_lossy(&value));
                            deliver(&events, LinkEvent::Data(value));
                        }
                        Err(e) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                    }
                }
                info!("Notification stream ended");
                write_slot.lock().await.take();
                deliver(&events, LinkEvent::Closed);
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                write_slot.lock().await.take();
                deliver(&events, LinkEvent::OpenFinished(Err(e.into())));
            }
        }
    }

    /// Try to connect and find the serial characteristics
    async fn try_open(
        adapter: &Adapter,
        device: &Device,
        service_uuid: Uuid,
        notify_char_uuid: Uuid,
        write_char_uuid: Uuid,
    ) -> Result<(Characteristic, Characteristic), LinkError> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - ID: {}, Name: {:?}", device.id(), name);

        if !device.is_connected().await {
            info!("Initiating connection to {}...", device.id());
            adapter.connect_device(device).await?;
        }

        info!("Connection successful, discovering services...");
        let services = device.services().await?;
        let serial_service = services
            .iter()
            .find(|s| s.uuid() == service_uuid)
            .ok_or_else(|| {
                for service in &services {
                    debug!("Available service: {}", service.uuid());
                }
                LinkError::new(format!("Serial service not found: {}", service_uuid))
            })?
            .clone();

        let mut notify_char_opt = None;
        let mut write_char_opt = None;

        for characteristic in serial_service.characteristics().await? {
            let uuid = characteristic.uuid();
            if uuid == notify_char_uuid {
                debug!("Found notification characteristic: {}", uuid);
                notify_char_opt = Some(characteristic);
            } else if uuid == write_char_uuid {
                debug!("Found write characteristic: {}", uuid);
                write_char_opt = Some(characteristic);
            }
        }

        let notify_char = notify_char_opt.ok_or_else(|| {
            LinkError::new(format!("Notification characteristic not found: {}", notify_char_uuid))
        })?;
        let write_char = write_char_opt.ok_or_else(|| {
            LinkError::new(format!("Write characteristic not found: {}", write_char_uuid))
        })?;

        Ok((notify_char, write_char))
    }
}

#[async_trait]
impl DeviceLink for BluestLink {
    fn start_pairing(&mut self) {
        let device = self.device.clone();
        let events = self.events.clone();

        self.pair_task = Some(tokio::spawn(async move {
            info!("Pairing with {}...", device.id());
            let result = match device.is_paired().await {
                Ok(true) => Ok(()),
                _ => device.pair().await.map_err(LinkError::from),
            };
            deliver(&events, LinkEvent::PairingFinished(result));
        }));
    }

    fn start_open(&mut self) {
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
        self.io_task = Some(tokio::spawn(Self::open_and_listen(
            self.adapter.clone(),
            self.device.clone(),
            self.write_char.clone(),
            self.events.clone(),
        )));
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let guard = self.write_char.lock().await;
        let write_char = guard
            .as_ref()
            .ok_or_else(|| LinkError::new("Serial channel is not open"))?;
        write_char.write(bytes).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        if let Some(task) = self.pair_task.take() {
            task.abort();
        }
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
        self.write_char.lock().await.take();

        if self.device.is_connected().await {
            info!("Disconnecting from device {}", self.device.id());
            self.adapter.disconnect_device(&self.device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", self.device.id());
        }
        Ok(())
    }
}
