//! Session registry
//! Tracks the NCHs seen in the current discovery cycle and makes sure only
//! one device session is active at a time.

use std::collections::HashMap;

use log::{debug, error, info};
use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::core::bluetooth::connection::DeviceLink;
use crate::core::bluetooth::error::{BluetoothError, LinkError, Result};
use crate::core::bluetooth::session::DeviceSession;
use crate::core::bluetooth::types::{DeviceDescriptor, EventSender, SessionEvent, SessionState};

pub struct SessionRegistry {
    /// Descriptors of the current scan cycle, by address
    devices: HashMap<String, DeviceDescriptor>,
    /// Discovery order, for stable listing
    order: Vec<String>,
    scan_active: bool,
    /// State of the session handed out by `begin_session`, if any
    active_session: Option<watch::Receiver<SessionState>>,
    name_filter: String,
    events: EventSender,
}

impl SessionRegistry {
    pub fn new(name_filter: impl Into<String>, events: EventSender) -> Self {
        Self {
            devices: HashMap::new(),
            order: Vec::new(),
            scan_active: false,
            active_session: None,
            name_filter: name_filter.into(),
            events,
        }
    }

    /// Starts a new discovery cycle, forgetting the previous one.
    pub fn begin_scan(&mut self) -> Result<()> {
        if self.scan_active {
            return Err(BluetoothError::ScanAlreadyActive);
        }
        if self.active_state().is_some_and(|state| state.is_engaged()) {
            return Err(BluetoothError::SessionActive);
        }

        self.devices.clear();
        self.order.clear();
        self.scan_active = true;
        info!("Scan cycle started.");
        self.events.emit(SessionEvent::ScanStarted);
        Ok(())
    }

    /// Inserts or updates a discovered device.
    ///
    /// Devices outside the NCH family are ignored. `DeviceUpdated` is only
    /// emitted when something about a known address actually changed.
    pub fn on_device_found(&mut self, descriptor: DeviceDescriptor) {
        if !descriptor.matches_family(&self.name_filter) {
            debug!("Ignoring {:?}: not an NCH", descriptor.name);
            return;
        }

        match self.devices.get_mut(&descriptor.address) {
            Some(known) if *known == descriptor => {}
            Some(known) => {
                info!("Updated NCH {} ({})", descriptor.name, descriptor.address);
                *known = descriptor.clone();
                self.events.emit(SessionEvent::DeviceUpdated(descriptor));
            }
            None => {
                info!(
                    "Found NCH: Address: {}, Name: {:?}, Is Paired: {:?}",
                    descriptor.address, descriptor.name, descriptor.is_paired
                );
                self.order.push(descriptor.address.clone());
                self.devices
                    .insert(descriptor.address.clone(), descriptor.clone());
                self.events.emit(SessionEvent::DeviceAdded(descriptor));
            }
        }
    }

    /// Reports that the platform could not run the current cycle.
    /// Outside a cycle this is ignored.
    pub fn on_scan_failed(&mut self, reason: impl Into<String>) {
        if !self.scan_active {
            return;
        }
        let reason = reason.into();
        error!("Scan cycle failed: {}", reason);
        self.events.emit(SessionEvent::ScanFailed { reason });
    }

    /// Marks the scan cycle finished. Repeated calls are ignored.
    pub fn end_scan(&mut self) {
        if !self.scan_active {
            return;
        }
        self.scan_active = false;
        info!("Scan cycle complete, {} NCH(s) found.", self.devices.len());
        self.events.emit(SessionEvent::ScanComplete);
    }

    /// Hands out a new session for `address`.
    ///
    /// The registry keeps only an observer of the session's state; the
    /// caller owns the session until it is released with [`end_session`].
    ///
    /// [`end_session`]: SessionRegistry::end_session
    pub fn begin_session<F>(
        &mut self,
        address: &str,
        config: &SessionConfig,
        make_link: F,
    ) -> Result<DeviceSession>
    where
        F: FnOnce(&DeviceDescriptor) -> std::result::Result<Box<dyn DeviceLink>, LinkError>,
    {
        let device = self
            .devices
            .get(address)
            .cloned()
            .ok_or_else(|| BluetoothError::UnknownDevice(address.to_string()))?;
        if self.active_session.is_some() {
            return Err(BluetoothError::SessionActive);
        }

        let link = make_link(&device)?;
        let session = DeviceSession::new(device, link, self.events.clone(), config);
        self.active_session = Some(session.subscribe());
        info!("Session started for {}", address);
        Ok(session)
    }

    /// Releases the active session once it has reached a terminal state.
    pub fn end_session(&mut self) -> Result<()> {
        let state = self.active_state().ok_or(BluetoothError::NoActiveSession)?;
        if state.is_engaged() {
            return Err(BluetoothError::SessionNotTerminated(state));
        }
        self.active_session = None;
        info!("Session released in state {}", state);
        Ok(())
    }

    /// State of the active session, if one has been handed out
    pub fn active_state(&self) -> Option<SessionState> {
        self.active_session.as_ref().map(|state| *state.borrow())
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_active
    }

    pub fn device(&self, address: &str) -> Option<&DeviceDescriptor> {
        self.devices.get(address)
    }

    /// Looks a device up by address, then by display name.
    pub fn find(&self, address_or_name: &str) -> Option<&DeviceDescriptor> {
        self.devices.get(address_or_name).or_else(|| {
            self.devices()
                .find(|device| device.name.eq_ignore_ascii_case(address_or_name))
        })
    }

    /// Devices of the current cycle in discovery order
    pub fn devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.order.iter().filter_map(|address| self.devices.get(address))
    }
}
