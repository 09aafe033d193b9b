//! Headless console flow
//! Drives one task (scan, status, enable, disable, toggle) to completion by
//! reacting to the event stream, printing every event as a JSON line.

use std::io::Write;

use anyhow::{Result, bail};
use log::{info, warn};

use crate::commands;
use crate::core::bluetooth::{DeviceDescriptor, EventReceiver, NchCommand, SessionEvent, WifiState};
use crate::state::AppState;

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Scan,
    Status,
    Enable,
    Disable,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRequest {
    pub task: Task,
    /// Address or display name of the NCH; unused by [`Task::Scan`]
    pub device: Option<String>,
    /// Automatic "try again" answers before giving up
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Scanning for the requested device
    Searching,
    /// Pairing or opening the channel
    Linking,
    /// Waiting for the status query sent on connect
    Querying,
    /// Waiting for the report that answers the user's command
    Commanding,
}

enum Step {
    Continue,
    Done(Option<WifiState>),
}

struct Flow<'a, W> {
    app_state: &'a AppState,
    request: &'a ConsoleRequest,
    retries_left: u32,
    phase: Phase,
    out: W,
}

/// Runs `request` and returns the last reported Wi-Fi state.
///
/// Scanning returns `None` once the cycle completes. Device tasks return
/// after the channel has been closed again.
pub async fn run<W: Write>(
    app_state: &AppState,
    events: &mut EventReceiver,
    request: &ConsoleRequest,
    out: W,
) -> Result<Option<WifiState>> {
    if request.task != Task::Scan && request.device.is_none() {
        bail!("no device given for {:?}", request.task);
    }

    let mut flow = Flow {
        app_state,
        request,
        retries_left: request.retries,
        phase: Phase::Searching,
        out,
    };

    commands::start_scan(app_state).await?;
    while let Some(event) = events.recv().await {
        flow.print(&event)?;
        if let Step::Done(outcome) = flow.on_event(event).await? {
            // Flush what the disconnect produced.
            while let Ok(event) = events.try_recv() {
                flow.print(&event)?;
            }
            return Ok(outcome);
        }
    }
    bail!("event channel closed")
}

impl<W: Write> Flow<'_, W> {
    fn print(&mut self, event: &SessionEvent) -> Result<()> {
        writeln!(self.out, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }

    fn is_target(&self, device: &DeviceDescriptor) -> bool {
        self.request.device.as_deref().is_some_and(|wanted| {
            device.address == wanted || device.name.eq_ignore_ascii_case(wanted)
        })
    }

    async fn on_event(&mut self, event: SessionEvent) -> Result<Step> {
        match (self.phase, event) {
            (Phase::Searching, SessionEvent::ScanFailed { reason }) => {
                bail!("scanning for NCHs failed: {}", reason);
            }
            (Phase::Searching, SessionEvent::ScanComplete) => {
                if self.request.task == Task::Scan {
                    return Ok(Step::Done(None));
                }
                bail!(
                    "no NCH matching {:?} was found",
                    self.request.device.as_deref().unwrap_or_default()
                );
            }
            (
                Phase::Searching,
                SessionEvent::DeviceAdded(device) | SessionEvent::DeviceUpdated(device),
            ) if self.request.task != Task::Scan && self.is_target(&device) => {
                info!("Selecting {} ({})", device.name, device.address);
                commands::select_device(self.app_state, &device.address).await?;
                self.phase = Phase::Linking;
            }
            (_, SessionEvent::PairingFailed { reason } | SessionEvent::ConnectFailed { reason }) => {
                self.retry_or_give_up(&reason).await?;
            }
            (_, SessionEvent::Connected) => self.phase = Phase::Querying,
            (Phase::Querying, SessionEvent::WifiStateChanged(wifi_state)) => {
                match self.request.task {
                    Task::Enable => self.send(NchCommand::EnableWifi).await?,
                    Task::Disable => self.send(NchCommand::DisableWifi).await?,
                    Task::Toggle => {
                        let command = commands::toggle_wifi(self.app_state).await?;
                        info!("Wi-Fi is {}, sent {:?}", wifi_state, command);
                        self.phase = Phase::Commanding;
                    }
                    Task::Scan | Task::Status => return self.finish(wifi_state).await,
                }
            }
            (Phase::Commanding, SessionEvent::WifiStateChanged(wifi_state)) => {
                return self.finish(wifi_state).await;
            }
            (_, SessionEvent::CommandTimedOut(command)) => {
                commands::request_disconnect(self.app_state).await?;
                bail!("the NCH did not answer {:?}", command);
            }
            (_, SessionEvent::CommandSendFailed { reason }) => {
                commands::request_disconnect(self.app_state).await?;
                bail!("sending to the NCH failed: {}", reason);
            }
            (Phase::Linking | Phase::Querying | Phase::Commanding, SessionEvent::Disconnected) => {
                self.retry_or_give_up("connection lost").await?;
            }
            _ => {}
        }
        Ok(Step::Continue)
    }

    async fn send(&mut self, command: NchCommand) -> Result<()> {
        commands::send_command(self.app_state, command).await?;
        self.phase = Phase::Commanding;
        Ok(())
    }

    async fn retry_or_give_up(&mut self, reason: &str) -> Result<()> {
        if self.retries_left == 0 {
            commands::abandon(self.app_state).await?;
            bail!("giving up: {}", reason);
        }
        self.retries_left -= 1;
        warn!("{}, retrying ({} left)", reason, self.retries_left);
        commands::confirm_pair_retry(self.app_state).await?;
        self.phase = Phase::Linking;
        Ok(())
    }

    async fn finish(&mut self, wifi_state: WifiState) -> Result<Step> {
        commands::request_disconnect(self.app_state).await?;
        Ok(Step::Done(Some(wifi_state)))
    }
}
