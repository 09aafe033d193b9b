//! Device session state machine
//! Drives one NCH through pair -> connect -> command exchange -> disconnect.
//!
//! A session is single-writer: every input (user request or link event) must
//! be applied from one task, see [`crate::core::bluetooth::driver`].

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::core::bluetooth::commands::{CommandCodec, NchCommand, NchMessage};
use crate::core::bluetooth::connection::{DeviceLink, LinkEvent};
use crate::core::bluetooth::error::{LinkError, SessionError};
use crate::core::bluetooth::types::{
    DeviceDescriptor, EventSender, SessionEvent, SessionState, WifiState,
};

/// A command written to the NCH that still waits for its report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: NchCommand,
    pub deadline: Instant,
}

pub struct DeviceSession {
    device: DeviceDescriptor,
    link: Box<dyn DeviceLink>,
    codec: CommandCodec,
    events: EventSender,
    state_tx: watch::Sender<SessionState>,
    response_timeout: Duration,
    wifi_state: Option<WifiState>,
    pending: Option<PendingCommand>,
    last_sent: Option<NchCommand>,
    last_response: Option<NchMessage>,
    retry_count: u32,
    disconnect_requested: bool,
}

impl DeviceSession {
    pub fn new(
        device: DeviceDescriptor,
        link: Box<dyn DeviceLink>,
        events: EventSender,
        config: &SessionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            device,
            link,
            codec: CommandCodec::new(config.ack_sentinel.clone()),
            events,
            state_tx,
            response_timeout: config.response_timeout(),
            wifi_state: None,
            pending: None,
            last_sent: None,
            last_response: None,
            retry_count: 0,
            disconnect_requested: false,
        }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Observer of the session state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn wifi_state(&self) -> Option<WifiState> {
        self.wifi_state
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn last_sent(&self) -> Option<NchCommand> {
        self.last_sent
    }

    pub fn last_response(&self) -> Option<&NchMessage> {
        self.last_response.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// When the pending command expires, if one is pending
    pub fn response_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    fn set_state(&mut self, next: SessionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!("Session {}: {} -> {}", self.device.address, previous, next);
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state(),
        }
    }

    /// Leaves `Idle`. Already paired devices go straight to `Connecting`.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Idle {
            return Err(self.invalid("start"));
        }
        if self.device.is_paired {
            debug!("{} is already paired, skipping pairing", self.device.name);
            self.begin_connecting();
        } else {
            self.begin_pairing();
        }
        Ok(())
    }

    fn begin_pairing(&mut self) {
        self.set_state(SessionState::Pairing);
        self.events.emit(SessionEvent::PairingStarted);
        self.link.start_pairing();
    }

    fn begin_connecting(&mut self) {
        self.disconnect_requested = false;
        self.set_state(SessionState::Connecting);
        self.link.start_open();
    }

    /// Re-enters the lifecycle after a failed attempt or a disconnect.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::PairFailed => {
                self.retry_count += 1;
                info!("Retrying pairing with {} (attempt {})", self.device.name, self.retry_count + 1);
                self.begin_pairing();
                Ok(())
            }
            SessionState::ConnectFailed | SessionState::Disconnected => {
                self.retry_count += 1;
                info!("Retrying connection to {} (attempt {})", self.device.name, self.retry_count + 1);
                self.begin_connecting();
                Ok(())
            }
            _ => Err(self.invalid("retry")),
        }
    }

    /// Gives up on a failed or finished attempt and returns to `Idle`.
    pub async fn abandon(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if !state.is_terminal() {
            return Err(self.invalid("abandon"));
        }
        if state == SessionState::ConnectFailed {
            if let Err(e) = self.link.close().await {
                warn!("Closing half-open link failed: {}", e);
            }
        }
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Applies one completion or notification from the link.
    pub async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::PairingFinished(result) => self.on_pairing_finished(result),
            LinkEvent::OpenFinished(result) => self.on_open_finished(result).await,
            LinkEvent::Data(bytes) => self.on_data(&bytes),
            LinkEvent::Closed => self.on_transport_closed(),
        }
    }

    fn on_pairing_finished(&mut self, result: Result<(), LinkError>) {
        if self.state() != SessionState::Pairing {
            debug!("Ignoring pairing result in state {}", self.state());
            return;
        }
        match result {
            Ok(()) => {
                info!("Paired with {}", self.device.name);
                self.device.is_paired = true;
                self.events.emit(SessionEvent::Paired);
                self.begin_connecting();
            }
            Err(e) => {
                warn!("Pairing with {} failed: {}", self.device.name, e);
                self.set_state(SessionState::PairFailed);
                self.events.emit(SessionEvent::PairingFailed { reason: e.reason });
            }
        }
    }

    async fn on_open_finished(&mut self, result: Result<(), LinkError>) {
        if self.state() != SessionState::Connecting {
            debug!("Ignoring channel open result in state {}", self.state());
            return;
        }
        match result {
            Ok(()) => {
                self.set_state(SessionState::ConnectedIdle);
                self.events.emit(SessionEvent::Connected);
                // Fetch the initial status without waiting for the caller.
                if let Err(e) = self.send(NchCommand::GetWifiState).await {
                    warn!("Initial Wi-Fi query failed: {}", e);
                }
            }
            Err(e) => {
                warn!("Connecting to {} failed: {}", self.device.name, e);
                self.set_state(SessionState::ConnectFailed);
                self.events.emit(SessionEvent::ConnectFailed { reason: e.reason });
            }
        }
    }

    /// Writes `command` and starts waiting for its report.
    ///
    /// A failed write emits `CommandSendFailed` and leaves the state as it was.
    pub async fn send(&mut self, command: NchCommand) -> Result<(), SessionError> {
        match self.state() {
            SessionState::ConnectedIdle => {}
            SessionState::ConnectedBusy => return Err(SessionError::Busy),
            _ => return Err(SessionError::NotConnected),
        }

        let bytes = self.codec.encode(command);
        debug!("Sending command to NCH: {:?} ({})", command, command.as_wire());
        if let Err(e) = self.link.write(&bytes).await {
            warn!("Writing {:?} failed: {}", command, e);
            self.events.emit(SessionEvent::CommandSendFailed {
                reason: e.reason.clone(),
            });
            return Err(SessionError::Send { reason: e.reason });
        }

        self.last_sent = Some(command);
        self.pending = Some(PendingCommand {
            command,
            deadline: Instant::now() + self.response_timeout,
        });
        self.set_state(SessionState::ConnectedBusy);
        Ok(())
    }

    /// Sends whichever command flips the last reported Wi-Fi state.
    pub async fn toggle_wifi(&mut self) -> Result<NchCommand, SessionError> {
        let current = self.wifi_state.ok_or(SessionError::UnknownWifiState)?;
        let command = NchCommand::toggle_from(current);
        self.send(command).await?;
        Ok(command)
    }

    fn on_data(&mut self, bytes: &[u8]) {
        for message in self.codec.decode_chunk(bytes) {
            self.on_message(message);
        }
    }

    fn on_message(&mut self, message: NchMessage) {
        if !self.state().is_connected() {
            debug!("Ignoring {:?} in state {}", message, self.state());
            return;
        }
        self.last_response = Some(message.clone());

        match message {
            NchMessage::ConnectionAck => {
                debug!("Connection acknowledged by {}", self.device.name);
            }
            NchMessage::WifiStateReport(wifi_state) => {
                match self.pending.take() {
                    Some(pending) => debug!("{:?} answered: Wi-Fi {}", pending.command, wifi_state),
                    None => debug!("Unsolicited Wi-Fi report: {}", wifi_state),
                }
                self.wifi_state = Some(wifi_state);
                self.set_state(SessionState::ConnectedIdle);
                self.events.emit(SessionEvent::WifiStateChanged(wifi_state));
            }
            NchMessage::Unrecognized(bytes) => {
                let raw = String::from_utf8_lossy(&bytes).into_owned();
                info!("Unrecognized message from NCH: {:?} ({:02x?})", raw, bytes);
                self.events.emit(SessionEvent::ProtocolAnomaly { raw, bytes });
            }
        }
    }

    /// Abandons the pending command once its deadline has passed.
    pub fn on_response_timeout(&mut self) {
        if self.state() != SessionState::ConnectedBusy {
            return;
        }
        let Some(pending) = self.pending else {
            return;
        };
        if Instant::now() < pending.deadline {
            return;
        }

        self.pending = None;
        warn!("No response to {:?} within {:?}", pending.command, self.response_timeout);
        self.set_state(SessionState::ConnectedIdle);
        self.events.emit(SessionEvent::CommandTimedOut(pending.command));
    }

    fn on_transport_closed(&mut self) {
        match self.state() {
            SessionState::ConnectedIdle | SessionState::ConnectedBusy => {
                self.pending = None;
                self.set_state(SessionState::Disconnected);
                if !self.disconnect_requested {
                    warn!("Connection to {} was broken", self.device.name);
                    self.events.emit(SessionEvent::UnexpectedDisconnect);
                }
                self.events.emit(SessionEvent::Disconnected);
            }
            SessionState::Disconnecting => {
                self.set_state(SessionState::Disconnected);
                self.events.emit(SessionEvent::Disconnected);
            }
            SessionState::Connecting => {
                self.set_state(SessionState::ConnectFailed);
                self.events.emit(SessionEvent::ConnectFailed {
                    reason: "channel closed while opening".to_string(),
                });
            }
            state => debug!("Ignoring channel closure in state {}", state),
        }
    }

    /// Closes the channel on request. Cancels any pending response wait.
    pub async fn request_disconnect(&mut self) -> Result<(), SessionError> {
        if !self.state().is_connected() {
            return Err(self.invalid("disconnect"));
        }

        self.disconnect_requested = true;
        if let Some(pending) = self.pending.take() {
            debug!("Cancelling wait for {:?}", pending.command);
        }
        self.set_state(SessionState::Disconnecting);
        info!("Disconnecting from {}", self.device.name);

        if let Err(e) = self.link.close().await {
            warn!("There was an error closing the channel: {}", e);
        }
        if self.state() == SessionState::Disconnecting {
            self.set_state(SessionState::Disconnected);
            self.events.emit(SessionEvent::Disconnected);
        }
        Ok(())
    }
}
