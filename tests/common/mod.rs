//! In-memory Bluetooth stack used by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nch_wifi_controller_lib::config::AppConfig;
use nch_wifi_controller_lib::core::bluetooth::{
    BluetoothBackend, DeviceDescriptor, DeviceLink, EventReceiver, LinkError, LinkEvent,
    LinkEventSender, SessionEvent,
};
use nch_wifi_controller_lib::state::AppState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Behaviour of the simulated NCH
#[derive(Debug, Default)]
pub struct FakeNch {
    pub wifi_on: bool,
    /// Print the connection acknowledgement after the channel opens
    pub send_ack: bool,
    /// Never answer commands
    pub silent: bool,
    pub pairing_failures: u32,
    pub open_failures: u32,
    pub write_failures: u32,
    /// Fail every scan as a powered-off adapter would
    pub adapter_off: bool,
    /// Every command written, as text
    pub written: Vec<String>,
    pub closes: u32,
    link_events: Option<LinkEventSender>,
}

pub type SharedNch = Arc<Mutex<FakeNch>>;

pub fn nch(wifi_on: bool) -> SharedNch {
    Arc::new(Mutex::new(FakeNch {
        wifi_on,
        send_ack: true,
        ..FakeNch::default()
    }))
}

/// Pushes raw bytes from the NCH to the host.
pub fn nch_says(nch: &SharedNch, text: &str) {
    if let Some(events) = nch.lock().unwrap().link_events.as_ref() {
        events.send(LinkEvent::Data(text.as_bytes().to_vec())).unwrap();
    }
}

/// Simulates the NCH going out of range.
pub fn drop_link(nch: &SharedNch) {
    if let Some(events) = nch.lock().unwrap().link_events.as_ref() {
        events.send(LinkEvent::Closed).unwrap();
    }
}

pub fn written(nch: &SharedNch) -> Vec<String> {
    nch.lock().unwrap().written.clone()
}

pub struct FakeBackend {
    devices: Vec<DeviceDescriptor>,
    nch: SharedNch,
}

impl FakeBackend {
    pub fn new(devices: Vec<DeviceDescriptor>, nch: SharedNch) -> Self {
        Self { devices, nch }
    }
}

#[async_trait]
impl BluetoothBackend for FakeBackend {
    async fn discover(
        &self,
        found: mpsc::Sender<DeviceDescriptor>,
        cancel: CancellationToken,
    ) -> Result<(), LinkError> {
        if self.nch.lock().unwrap().adapter_off {
            return Err(LinkError::new("adapter powered off"));
        }
        for device in &self.devices {
            if found.send(device.clone()).await.is_err() {
                return Ok(());
            }
        }
        cancel.cancelled().await;
        Ok(())
    }

    fn create_link(
        &self,
        _device: &DeviceDescriptor,
        events: LinkEventSender,
    ) -> Result<Box<dyn DeviceLink>, LinkError> {
        self.nch.lock().unwrap().link_events = Some(events.clone());
        Ok(Box::new(FakeLink {
            nch: self.nch.clone(),
            events,
        }))
    }
}

struct FakeLink {
    nch: SharedNch,
    events: LinkEventSender,
}

impl FakeLink {
    fn send(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl DeviceLink for FakeLink {
    fn start_pairing(&mut self) {
        let mut nch = self.nch.lock().unwrap();
        if nch.pairing_failures > 0 {
            nch.pairing_failures -= 1;
            self.send(LinkEvent::PairingFinished(Err(LinkError::new("pairing rejected"))));
        } else {
            self.send(LinkEvent::PairingFinished(Ok(())));
        }
    }

    fn start_open(&mut self) {
        let mut nch = self.nch.lock().unwrap();
        if nch.open_failures > 0 {
            nch.open_failures -= 1;
            self.send(LinkEvent::OpenFinished(Err(LinkError::new("serial service not found"))));
            return;
        }
        self.send(LinkEvent::OpenFinished(Ok(())));
        if nch.send_ack {
            self.send(LinkEvent::Data(b"CONNECTED\r\n".to_vec()));
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut nch = self.nch.lock().unwrap();
        if nch.write_failures > 0 {
            nch.write_failures -= 1;
            return Err(LinkError::new("write rejected"));
        }

        let command = String::from_utf8_lossy(bytes).into_owned();
        nch.written.push(command.clone());
        if nch.silent {
            return Ok(());
        }
        match command.as_str() {
            "Wifi_Enable" => nch.wifi_on = true,
            "Wifi_Disable" => nch.wifi_on = false,
            _ => {}
        }
        let report: &[u8] = if nch.wifi_on { b"1" } else { b"0" };
        self.send(LinkEvent::Data(report.to_vec()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.nch.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scan.scan_duration_secs = 1;
    config
}

pub fn app_state(devices: Vec<DeviceDescriptor>, nch: &SharedNch) -> (AppState, EventReceiver) {
    AppState::with_backend(
        Arc::new(FakeBackend::new(devices, nch.clone())),
        test_config(),
    )
}

/// Receives events until one satisfies `predicate`, returning everything seen.
pub async fn events_until(
    events: &mut EventReceiver,
    mut predicate: impl FnMut(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        let done = predicate(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Event names of JSON lines printed by the console flow
pub fn printed_events(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["event"].as_str().unwrap().to_string()
        })
        .collect()
}
