//! ConnectionManager - owns the single event connection.
//!
//! The manager interprets the pure [`ConnectionState`] machine from
//! sync-core: every state change goes through `on_event`, and the returned
//! actions are executed here against the [`Transport`].
//!
//! ```text
//! connect() ─┐
//!            ▼
//!      driver task ── open (handshake timeout, no retry)
//!            │
//!            ├── pump: recv → decode → inbound sink (arrival order, backpressured)
//!            │                       └→ broadcast observers
//!            │
//!            └── on drop: close, backoff, open ... until Connected or Failed
//! ```
//!
//! One driver task exists per connect cycle. `disconnect` cancels it under
//! the same lock that guards the state, so a cancelled driver can never
//! publish a transition afterwards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use murmur_sync_core::{Action, ConnectionEvent, ConnectionState, Event, ReconnectPolicy};
use murmur_sync_types::{Credential, InboundEvent, OutboundEvent, SyncError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::transport::Transport;

/// Observable connection status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Most recent failure, if the last transition reported one.
    pub error: Option<SyncError>,
}

impl ConnectionStatus {
    fn new(state: ConnectionState) -> Self {
        Self { state, error: None }
    }
}

/// Owns the transport and its lifecycle.
///
/// Cloning yields another handle to the same connection.
pub struct ConnectionManager<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<T> {
    transport: T,
    endpoint: String,
    handshake_timeout: Duration,
    policy: ReconnectPolicy,
    control: Mutex<Control>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<InboundEvent>,
    lifecycle: broadcast::Sender<ConnectionEvent>,
}

struct Control {
    state: ConnectionState,
    cancel: CancellationToken,
    inbound: Option<mpsc::Sender<InboundEvent>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager for `transport`. Nothing is opened until `connect`.
    pub fn new(transport: T, config: &SyncConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::new(ConnectionState::Disconnected));
        let (events, _) = broadcast::channel(config.event_buffer);
        let (lifecycle, _) = broadcast::channel(config.event_buffer);

        Self {
            shared: Arc::new(Shared {
                transport,
                endpoint: config.endpoint.clone(),
                handshake_timeout: config.handshake_timeout(),
                policy: config.reconnect_policy(),
                control: Mutex::new(Control {
                    state: ConnectionState::Disconnected,
                    cancel: CancellationToken::new(),
                    inbound: None,
                }),
                status,
                events,
                lifecycle,
            }),
        }
    }

    /// Connect with `credential`.
    ///
    /// Allowed from `Disconnected` or `Failed`. While a connect (or an
    /// automatic reconnect) is in flight, further calls wait for the same
    /// outcome instead of opening a second transport. Already connected
    /// returns immediately.
    ///
    /// # Errors
    ///
    /// `ConnectionTimeout`, `AuthRejected` or `TransportLost` for a failed
    /// handshake, `ReconnectExhausted` when joining a reconnect cycle that
    /// gives up, `ConnectCancelled` if `disconnect` runs first.
    pub async fn connect(&self, credential: Credential) -> Result<(), SyncError> {
        let mut status_rx = self.shared.status.subscribe();

        {
            let mut control = self.shared.lock_control();
            match control.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                    tracing::debug!("connect already in flight, joining");
                }
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    let token = CancellationToken::new();
                    control.cancel = token.clone();
                    let actions = self.shared.apply(&mut control, Event::ConnectRequested);

                    tracing::info!(
                        endpoint = %self.shared.endpoint,
                        user = %credential.user_id,
                        "connecting"
                    );
                    tokio::spawn(drive(Arc::clone(&self.shared), token, credential, actions));
                }
            }
        }

        let status = status_rx
            .wait_for(|status| !status.state.is_connecting())
            .await
            .map_err(|_| SyncError::ConnectCancelled)?
            .clone();

        match status.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(SyncError::ConnectCancelled),
            _ => Err(status
                .error
                .unwrap_or_else(|| SyncError::TransportLost("connection failed".into()))),
        }
    }

    /// Tear the connection down.
    ///
    /// Cancels any in-flight connect and any pending reconnect timer, closes
    /// the transport and moves to `Disconnected`. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        let actions = {
            let mut control = self.shared.lock_control();
            control.cancel.cancel();
            self.shared.apply(&mut control, Event::DisconnectRequested)
        };

        if actions.is_empty() {
            return;
        }
        tracing::info!("disconnecting");
        for action in actions {
            match action {
                Action::CloseTransport => self.shared.close_transport().await,
                Action::EmitEvent(event) => self.shared.emit(event),
                Action::CancelReconnect => tracing::debug!("cancelled pending connect"),
                other => tracing::warn!(?other, "unexpected action on disconnect"),
            }
        }
    }

    /// Send an event over the live connection.
    ///
    /// # Errors
    ///
    /// `NotConnected` unless the state is `Connected`; `TransportLost` if
    /// the transport rejects the frame.
    pub async fn send(&self, event: OutboundEvent) -> Result<(), SyncError> {
        if !self.state().is_connected() {
            return Err(SyncError::NotConnected);
        }
        tracing::debug!(event = event.name(), "send");
        self.shared
            .transport
            .send(event.to_frame())
            .await
            .map_err(SyncError::from)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.status.borrow().state
    }

    /// Current status (state plus last failure).
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Attach the inbound sink and return its receiving end.
    ///
    /// Every decoded event is delivered to the sink in arrival order. When
    /// the sink is full the pump stops reading from the transport until
    /// the consumer catches up, so nothing is dropped. Attaching again
    /// replaces the previous sink.
    pub fn attach_inbound(&self, capacity: usize) -> mpsc::Receiver<InboundEvent> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.shared.lock_control().inbound = Some(sender);
        receiver
    }

    /// Subscribe to decoded inbound events as an observer.
    ///
    /// Observers that fall behind by more than the event buffer miss
    /// events; use [`attach_inbound`](Self::attach_inbound) for lossless
    /// delivery. Dropping the receiver unsubscribes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<InboundEvent> {
        self.shared.events.subscribe()
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.lifecycle.subscribe()
    }

    /// Get a reference to the transport (for testing).
    pub fn transport(&self) -> &T {
        &self.shared.transport
    }
}

impl<T: Transport> Shared<T> {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one transition and publish the resulting status.
    fn apply(&self, control: &mut Control, event: Event) -> Vec<Action> {
        let (next, actions) = control.state.on_event(event, &self.policy);
        control.state = next;

        let error = actions.iter().rev().find_map(|action| match action {
            Action::EmitEvent(event) => event.failure(),
            _ => None,
        });
        self.status.send_if_modified(|status| {
            let changed = status.state != next || error.is_some();
            status.state = next;
            match next {
                ConnectionState::Failed | ConnectionState::Reconnecting { .. } => {
                    if error.is_some() {
                        status.error = error;
                    }
                }
                _ => status.error = None,
            }
            changed
        });
        actions
    }

    /// Transition on behalf of the driver holding `token`.
    ///
    /// Returns `None` once the token is cancelled; the state then belongs to
    /// whoever cancelled it.
    fn transition(&self, token: &CancellationToken, event: Event) -> Option<Vec<Action>> {
        let mut control = self.lock_control();
        if token.is_cancelled() {
            return None;
        }
        Some(self.apply(&mut control, event))
    }

    async fn close_transport(&self) {
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "transport close failed");
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Connected => tracing::info!("connected"),
            ConnectionEvent::ConnectionFailed { error } => {
                tracing::warn!(%error, "connect failed")
            }
            ConnectionEvent::ConnectionLost { reason } => {
                tracing::warn!(%reason, "connection lost")
            }
            ConnectionEvent::ReconnectFailed { attempt, error } => {
                tracing::warn!(attempt, %error, "reconnect attempt failed")
            }
            ConnectionEvent::Reconnected { attempts } => {
                tracing::info!(attempts, "reconnected")
            }
            ConnectionEvent::ReconnectExhausted { attempts } => {
                tracing::error!(attempts, "reconnection exhausted, giving up")
            }
            ConnectionEvent::Disconnected => tracing::info!("disconnected"),
        }
        let _ = self.lifecycle.send(event);
    }

    /// Open the transport, bounded by the handshake timeout.
    ///
    /// `None` means the attempt was cancelled.
    async fn open(
        &self,
        token: &CancellationToken,
        credential: &Credential,
    ) -> Option<Result<(), SyncError>> {
        let attempt = tokio::time::timeout(
            self.handshake_timeout,
            self.transport.open(&self.endpoint, credential),
        );
        tokio::select! {
            _ = token.cancelled() => None,
            result = attempt => Some(match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(SyncError::from(e)),
                Err(_) => Err(SyncError::ConnectionTimeout(self.handshake_timeout)),
            }),
        }
    }

    /// Forward inbound frames until the connection drops.
    ///
    /// Returns the drop reason, or `None` if cancelled.
    async fn pump(&self, token: &CancellationToken) -> Option<String> {
        loop {
            let received = tokio::select! {
                _ = token.cancelled() => return None,
                received = self.transport.recv() => received,
            };

            let frame = match received {
                Ok(frame) => frame,
                Err(e) => return Some(e.to_string()),
            };

            match InboundEvent::decode(&frame) {
                Ok(event) => {
                    tracing::trace!(event = event.name(), "inbound");
                    if self.events.receiver_count() > 0 {
                        let _ = self.events.send(event.clone());
                    }
                    let sink = self.lock_control().inbound.clone();
                    if let Some(sink) = sink {
                        tokio::select! {
                            _ = token.cancelled() => return None,
                            delivered = sink.send(event) => {
                                if delivered.is_err() {
                                    tracing::debug!("inbound sink closed, event dropped");
                                }
                            }
                        }
                    }
                }
                Err(SyncError::UnknownEvent(name)) => {
                    tracing::debug!(event = %name, "ignoring unknown event");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping invalid frame");
                }
            }
        }
    }
}

/// Driver task for one connect cycle.
///
/// Executes the state machine's actions until the state settles in
/// `Failed` or the token is cancelled.
async fn drive<T: Transport>(
    shared: Arc<Shared<T>>,
    token: CancellationToken,
    credential: Credential,
    actions: Vec<Action>,
) {
    let mut pending: VecDeque<Action> = actions.into();

    loop {
        while let Some(action) = pending.pop_front() {
            if token.is_cancelled() {
                return;
            }
            let follow_up = match action {
                Action::OpenTransport => {
                    let Some(result) = shared.open(&token, &credential).await else {
                        return;
                    };
                    let event = match result {
                        Ok(()) => Event::ConnectSucceeded,
                        Err(error) => Event::ConnectFailed { error },
                    };
                    match shared.transition(&token, event) {
                        Some(actions) => actions,
                        None => {
                            // disconnect won the race; make sure nothing stays open
                            shared.close_transport().await;
                            return;
                        }
                    }
                }
                Action::CloseTransport => {
                    shared.close_transport().await;
                    Vec::new()
                }
                Action::StartReconnectTimer { delay } => {
                    tracing::info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    match shared.transition(&token, Event::ReconnectTimer) {
                        Some(actions) => actions,
                        None => return,
                    }
                }
                Action::CancelReconnect => Vec::new(),
                Action::EmitEvent(event) => {
                    shared.emit(event);
                    Vec::new()
                }
            };
            pending.extend(follow_up);
        }

        let connected = {
            let control = shared.lock_control();
            !token.is_cancelled() && control.state.is_connected()
        };
        if !connected {
            return;
        }

        let Some(reason) = shared.pump(&token).await else {
            return;
        };
        match shared.transition(&token, Event::ConnectionLost { reason }) {
            Some(actions) => pending.extend(actions),
            None => return,
        }
    }
}
