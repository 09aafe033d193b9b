//! Session driver
//! Owns a [`DeviceSession`] on a dedicated task so that user requests, link
//! callbacks and the response timeout are applied one at a time.

use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::core::bluetooth::commands::{NchCommand, NchMessage};
use crate::core::bluetooth::connection::LinkEventReceiver;
use crate::core::bluetooth::constants::SESSION_REQUEST_CAPACITY;
use crate::core::bluetooth::error::SessionError;
use crate::core::bluetooth::session::DeviceSession;
use crate::core::bluetooth::types::{DeviceDescriptor, SessionState, WifiState};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum SessionRequest {
    Start(Reply<()>),
    Retry(Reply<()>),
    Abandon(Reply<()>),
    Send(NchCommand, Reply<()>),
    ToggleWifi(Reply<NchCommand>),
    Disconnect(Reply<()>),
    Snapshot(Reply<SessionSnapshot>),
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub device: DeviceDescriptor,
    pub state: SessionState,
    pub wifi_state: Option<WifiState>,
    pub last_sent: Option<NchCommand>,
    pub pending: Option<NchCommand>,
    /// Last message decoded from the NCH, including acknowledgements
    pub last_response: Option<NchMessage>,
    pub retry_count: u32,
}

impl SessionSnapshot {
    fn of(session: &DeviceSession) -> Self {
        Self {
            device: session.device().clone(),
            state: session.state(),
            wifi_state: session.wifi_state(),
            last_sent: session.last_sent(),
            pending: session.pending().map(|pending| pending.command),
            last_response: session.last_response().cloned(),
            retry_count: session.retry_count(),
        }
    }
}

/// Exclusive handle to a running session
pub struct SessionHandle {
    device: DeviceDescriptor,
    requests: mpsc::Sender<SessionRequest>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Moves `session` onto its own task, fed by `link_events`.
    pub fn spawn(session: DeviceSession, link_events: LinkEventReceiver) -> Self {
        let (requests, request_rx) = mpsc::channel(SESSION_REQUEST_CAPACITY);
        let device = session.device().clone();
        let state = session.subscribe();
        let task = tokio::spawn(Self::run(session, request_rx, link_events));
        Self {
            device,
            requests,
            state,
            task,
        }
    }

    async fn run(
        mut session: DeviceSession,
        mut requests: mpsc::Receiver<SessionRequest>,
        mut link_events: LinkEventReceiver,
    ) {
        info!("Session driver for {} started.", session.device().address);
        loop {
            let deadline = session.response_deadline();
            let response_timeout = sleep_until(deadline.unwrap_or_else(far_future));

            tokio::select! {
                biased;
                Some(event) = link_events.recv() => session.handle_link_event(event).await,
                request = requests.recv() => match request {
                    Some(request) => Self::dispatch(&mut session, request).await,
                    None => break,
                },
                _ = response_timeout, if deadline.is_some() => session.on_response_timeout(),
            }
        }
        info!("Session driver for {} stopped.", session.device().address);
    }

    async fn dispatch(session: &mut DeviceSession, request: SessionRequest) {
        // A dropped reply receiver only means the caller stopped waiting.
        let delivered = match request {
            SessionRequest::Start(reply) => reply.send(session.start()).is_ok(),
            SessionRequest::Retry(reply) => reply.send(session.retry()).is_ok(),
            SessionRequest::Abandon(reply) => reply.send(session.abandon().await).is_ok(),
            SessionRequest::Send(command, reply) => reply.send(session.send(command).await).is_ok(),
            SessionRequest::ToggleWifi(reply) => reply.send(session.toggle_wifi().await).is_ok(),
            SessionRequest::Disconnect(reply) => {
                reply.send(session.request_disconnect().await).is_ok()
            }
            SessionRequest::Snapshot(reply) => reply.send(Ok(SessionSnapshot::of(session))).is_ok(),
        };
        if !delivered {
            debug!("Session reply dropped: caller went away");
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionRequest,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Waits until the session state satisfies `predicate`.
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState, SessionError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(predicate)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(*reached)
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.request(SessionRequest::Start).await
    }

    pub async fn retry(&self) -> Result<(), SessionError> {
        self.request(SessionRequest::Retry).await
    }

    pub async fn abandon(&self) -> Result<(), SessionError> {
        self.request(SessionRequest::Abandon).await
    }

    pub async fn send(&self, command: NchCommand) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::Send(command, reply)).await
    }

    pub async fn toggle_wifi(&self) -> Result<NchCommand, SessionError> {
        self.request(SessionRequest::ToggleWifi).await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(SessionRequest::Disconnect).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionRequest::Snapshot).await
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}
