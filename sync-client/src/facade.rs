//! SyncFacade - the single entry point for the UI layer.
//!
//! Composes the connection, message list, presence and typing components
//! into one session and publishes a merged [`Snapshot`].
//!
//! # Architecture
//!
//! ```text
//! UI ──► SyncFacade ──► ConnectionManager ──► Transport
//!            │  ▲                │
//!            │  └── Snapshot ◄───┤ inbound events (arrival order)
//!            ▼                   ▼
//!       Persistence        Session: MessageReconciler
//!                                   PresenceTracker
//!                                   TypingCoordinator
//! ```
//!
//! A session is created when `connect` succeeds and discarded by
//! `disconnect`; nothing survives from one session to the next.
//!
//! Mutations only mark the session dirty. A publisher task turns any number
//! of marks within the same scheduler tick into a single snapshot update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use murmur_sync_core::{typing_scope, ConnectionState, PresenceTracker};
use murmur_sync_types::{
    ConversationSummary, Credential, InboundEvent, Message, OutboundEvent, OutgoingMessage,
    PeerId, Scope, ServerId, ServerMessage, SyncError,
};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::connection::ConnectionManager;
use crate::persistence::Persistence;
use crate::reconciler::{LoadOutcome, MessageReconciler};
use crate::transport::Transport;
use crate::typing::TypingCoordinator;

/// Everything the UI renders, as one consistent value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Connection state.
    pub connection_state: ConnectionState,
    /// Message list of the active scope, in display order.
    pub messages: Vec<Message>,
    /// Online peers, sorted.
    pub online_ids: Vec<PeerId>,
    /// Peers typing in the active scope, sorted.
    pub typing_ids: Vec<PeerId>,
    /// The active conversation scope.
    pub scope: Option<Scope>,
    /// Conversation summaries from the last refresh.
    pub conversations: Vec<ConversationSummary>,
    /// Incremented on every published change.
    pub revision: u64,
}

impl Snapshot {
    fn empty(connection_state: ConnectionState) -> Self {
        Self {
            connection_state,
            messages: Vec::new(),
            online_ids: Vec::new(),
            typing_ids: Vec::new(),
            scope: None,
            conversations: Vec::new(),
            revision: 0,
        }
    }
}

/// Entry point for the UI layer.
pub struct SyncFacade<T: Transport, P: Persistence> {
    config: SyncConfig,
    connection: ConnectionManager<T>,
    persistence: Arc<P>,
    inbound: Arc<Mutex<mpsc::Receiver<InboundEvent>>>,
    session: Mutex<Option<Arc<Session<T, P>>>>,
    snapshot: Arc<watch::Sender<Snapshot>>,
}

impl<T: Transport, P: Persistence> SyncFacade<T, P> {
    /// Create a facade. Nothing happens until `connect`.
    pub fn new(transport: T, persistence: P, config: SyncConfig) -> Self {
        let connection = ConnectionManager::new(transport, &config);
        let inbound = connection.attach_inbound(config.event_buffer);
        let (snapshot, _) = watch::channel(Snapshot::empty(ConnectionState::Disconnected));
        Self {
            config,
            connection,
            persistence: Arc::new(persistence),
            inbound: Arc::new(Mutex::new(inbound)),
            session: Mutex::new(None),
            snapshot: Arc::new(snapshot),
        }
    }

    /// Connect and start a session for `credential`'s user.
    ///
    /// Calling it while connected (or while a connect is in flight) joins
    /// the existing connection and keeps the current session.
    pub async fn connect(&self, credential: Credential) -> Result<(), SyncError> {
        let user_id = credential.user_id.clone();
        let mut status = self.connection.subscribe_state();
        let connecting = self.connection.connect(credential);
        tokio::pin!(connecting);

        // Until a session exists its publisher is not there to report these
        let result = loop {
            tokio::select! {
                result = &mut connecting => break result,
                Ok(()) = status.changed() => {
                    let state = status.borrow_and_update().state;
                    if self.session.lock().await.is_none() {
                        publish(&self.snapshot, Snapshot::empty(state));
                    }
                }
            }
        };

        if let Err(error) = result {
            if self.session.lock().await.is_none() {
                publish(&self.snapshot, Snapshot::empty(self.connection.state()));
            }
            return Err(error);
        }

        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        tracing::info!(user = %user_id, "session started");
        let session = Arc::new(Session::new(
            user_id,
            self.connection.clone(),
            Arc::clone(&self.persistence),
            Arc::clone(&self.snapshot),
            &self.config,
        ));
        session.spawn_tasks(Arc::clone(&self.inbound), &self.config);
        session.dirty.notify_one();
        *slot = Some(session);
        Ok(())
    }

    /// End the session and tear the connection down. Idempotent.
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.typing.stop().await;
            session.shutdown().await;
            tracing::info!(user = %session.user_id, "session ended");
        }
        self.connection.disconnect().await;

        // Events of the closed connection never reach the next session
        let mut inbound = self.inbound.lock().await;
        let mut stale = 0usize;
        while inbound.try_recv().is_ok() {
            stale += 1;
        }
        drop(inbound);
        if stale > 0 {
            tracing::debug!(stale, "discarded inbound events of ended session");
        }

        publish(&self.snapshot, Snapshot::empty(self.connection.state()));
    }

    /// Send `content` to the active scope.
    ///
    /// Content is trimmed first. The message is listed as pending at once,
    /// sent over the live connection and written durably in parallel.
    /// Resolves with the saved record once the entry has settled.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a session, `EmptyMessage` for blank content,
    /// `NoActiveScope` before any
    /// `load_messages`, `DurableWriteFailed` / `RequestTimeout` if the
    /// durable write fails (the pending entry is removed).
    pub async fn send_message(&self, content: &str) -> Result<ServerMessage, SyncError> {
        let session = self.session().await?;
        session.send_message(content).await
    }

    /// Make `scope` the active conversation and load its history.
    ///
    /// A load superseded by a later call resolves with
    /// [`LoadOutcome::Superseded`] and leaves the list untouched.
    pub async fn load_messages(&self, scope: Scope) -> Result<LoadOutcome, SyncError> {
        let session = self.session().await?;
        session.load_messages(scope).await
    }

    /// Report whether the local draft has content.
    pub async fn set_typing(&self, has_content: bool) -> Result<(), SyncError> {
        let session = self.session().await?;
        let scope = session.active_scope().await.ok_or(SyncError::NoActiveScope)?;
        session.typing.on_content_changed(&scope, has_content).await;
        Ok(())
    }

    /// Fetch conversation summaries and publish them.
    pub async fn refresh_conversations(&self) -> Result<Vec<ConversationSummary>, SyncError> {
        let session = self.session().await?;
        session.refresh_conversations().await
    }

    /// Subscribe to snapshots. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// The connection manager (for testing).
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    async fn session(&self) -> Result<Arc<Session<T, P>>, SyncError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(SyncError::NotConnected)
    }
}

/// Publish `next` if its content differs from the current snapshot.
fn publish(sender: &watch::Sender<Snapshot>, mut next: Snapshot) {
    sender.send_if_modified(|current| {
        next.revision = current.revision;
        if *current == next {
            return false;
        }
        next.revision += 1;
        *current = next;
        true
    });
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-connection state, discarded on disconnect.
struct Session<T: Transport, P: Persistence> {
    user_id: PeerId,
    connection: ConnectionManager<T>,
    persistence: Arc<P>,
    reconciler: MessageReconciler,
    typing: TypingCoordinator<T>,
    state: Mutex<SessionState>,
    dirty: Arc<Notify>,
    refresh: Notify,
    refresh_issued: AtomicU64,
    tasks: CancellationToken,
    snapshot: Arc<watch::Sender<Snapshot>>,
    request_timeout: Duration,
    typing_expiry: Duration,
}

struct SessionState {
    presence: PresenceTracker,
    scope: Option<Scope>,
    conversations: Vec<ConversationSummary>,
    /// Issue number of the refresh that produced `conversations`.
    conversations_issue: u64,
}

impl<T: Transport, P: Persistence> Session<T, P> {
    fn new(
        user_id: PeerId,
        connection: ConnectionManager<T>,
        persistence: Arc<P>,
        snapshot: Arc<watch::Sender<Snapshot>>,
        config: &SyncConfig,
    ) -> Self {
        let dirty = Arc::new(Notify::new());
        Self {
            user_id,
            typing: TypingCoordinator::new(connection.clone(), config.typing_idle()),
            connection,
            persistence,
            reconciler: MessageReconciler::new(config.echo_grace(), Arc::clone(&dirty)),
            state: Mutex::new(SessionState {
                presence: PresenceTracker::new(),
                scope: None,
                conversations: Vec::new(),
                conversations_issue: 0,
            }),
            dirty,
            refresh: Notify::new(),
            refresh_issued: AtomicU64::new(0),
            tasks: CancellationToken::new(),
            snapshot,
            request_timeout: config.request_timeout(),
            typing_expiry: config.typing_expiry(),
        }
    }

    fn spawn_tasks(
        self: &Arc<Self>,
        inbound: Arc<Mutex<mpsc::Receiver<InboundEvent>>>,
        config: &SyncConfig,
    ) {
        tokio::spawn(Arc::clone(self).run_inbound(inbound));
        tokio::spawn(Arc::clone(self).run_refresh());
        tokio::spawn(Arc::clone(self).run_sweep(config.presence_sweep()));
        tokio::spawn(Arc::clone(self).run_publisher());
        tokio::spawn(Arc::clone(self).run_state_watch());
    }

    async fn shutdown(&self) {
        self.tasks.cancel();
        self.typing.shutdown().await;
        self.reconciler.shutdown().await;
    }

    async fn active_scope(&self) -> Option<Scope> {
        self.state.lock().await.scope.clone()
    }

    /// Run a persistence call under the request timeout.
    async fn bounded<R, E>(
        &self,
        call: impl std::future::Future<Output = Result<R, E>>,
    ) -> Result<R, SyncError>
    where
        E: Into<SyncError>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(SyncError::RequestTimeout(self.request_timeout)),
        }
    }

    async fn send_message(&self, content: &str) -> Result<ServerMessage, SyncError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let scope = self.active_scope().await.ok_or(SyncError::NoActiveScope)?;
        let outgoing = OutgoingMessage::new(self.user_id.clone(), scope.clone(), content);

        self.typing.stop().await;
        let pending = self.reconciler.begin(&outgoing, unix_millis()).await;

        let fast = self.connection.send(OutboundEvent::SendMessage {
            scope,
            content: outgoing.content.clone(),
        });
        let durable = self.bounded(self.persistence.send_message(&outgoing));
        let (fast, durable) = tokio::join!(fast, durable);

        if let Err(e) = fast {
            tracing::debug!(error = %e, "fast-path send skipped");
        }
        self.reconciler.settle(pending, durable).await
    }

    async fn load_messages(&self, scope: Scope) -> Result<LoadOutcome, SyncError> {
        let previous = {
            let mut state = self.state.lock().await;
            let previous = state.scope.replace(scope.clone());
            if previous.as_ref() != Some(&scope) {
                // list and scope switch together
                self.reconciler.reset().await;
            }
            previous
        };
        self.dirty.notify_one();

        if previous.as_ref() != Some(&scope) {
            self.typing.stop().await;
            self.switch_subscription(previous.as_ref(), &scope).await;
        }

        let mut unread: Vec<ServerId> = Vec::new();
        let fetch = async {
            let records = self
                .bounded(self.persistence.fetch_messages(&self.user_id, &scope))
                .await?;
            unread = records
                .iter()
                .filter(|m| m.receiver_id.as_ref() == Some(&self.user_id) && !m.read)
                .map(|m| m.id.clone())
                .collect();
            Ok::<_, SyncError>(records)
        };
        let outcome = self.reconciler.load(fetch).await?;

        if let LoadOutcome::Loaded(count) = outcome {
            tracing::debug!(%scope, count, "messages loaded");
            if !unread.is_empty() {
                self.mark_read(&unread).await;
                if let Err(e) = self.refresh_conversations().await {
                    tracing::warn!(error = %e, "conversation refresh failed");
                }
            }
        }
        Ok(outcome)
    }

    async fn switch_subscription(&self, previous: Option<&Scope>, next: &Scope) {
        if let Some(Scope::Group(group)) = previous {
            if let Err(e) = self.connection.send(OutboundEvent::LeaveGroup(group.clone())).await {
                tracing::debug!(%group, error = %e, "leave_group not sent");
            }
        }
        if let Scope::Group(group) = next {
            if let Err(e) = self.connection.send(OutboundEvent::JoinGroup(group.clone())).await {
                tracing::debug!(%group, error = %e, "join_group not sent");
            }
        }
    }

    async fn mark_read(&self, ids: &[ServerId]) {
        for id in ids {
            if let Err(e) = self.bounded(self.persistence.mark_read(id)).await {
                tracing::warn!(%id, error = %e, "mark read failed");
            }
        }
    }

    /// Fetch and store the summaries.
    ///
    /// A result that lands after one issued later is discarded in favour
    /// of the newer summaries.
    async fn refresh_conversations(&self) -> Result<Vec<ConversationSummary>, SyncError> {
        let issue = self.refresh_issued.fetch_add(1, Ordering::Relaxed) + 1;
        let conversations = self
            .bounded(self.persistence.fetch_conversations(&self.user_id))
            .await?;

        let mut state = self.state.lock().await;
        if issue < state.conversations_issue {
            tracing::debug!(issue, "stale conversation refresh discarded");
            return Ok(state.conversations.clone());
        }
        state.conversations_issue = issue;
        state.conversations = conversations.clone();
        drop(state);
        self.dirty.notify_one();
        Ok(conversations)
    }

    /// Apply one inbound event.
    async fn apply(&self, event: InboundEvent) {
        let now = tokio::time::Instant::now().into_std();
        match event {
            InboundEvent::ReceiveMessage(message) => {
                let addressed_to_me = message.receiver_id.as_ref() == Some(&self.user_id)
                    && message.sender_id != self.user_id;
                let in_scope = match self.active_scope().await {
                    Some(scope) => message.in_scope(&self.user_id, &scope),
                    None => true,
                };

                if in_scope {
                    self.reconciler.receive(message).await;
                } else {
                    tracing::trace!(id = %message.id, "message outside active scope");
                }
                if addressed_to_me {
                    self.refresh.notify_one();
                }
            }
            InboundEvent::OnlineUsers(ids) => {
                self.state.lock().await.presence.apply_full_snapshot(ids);
                self.dirty.notify_one();
            }
            InboundEvent::UserConnected(id) => {
                self.state.lock().await.presence.apply_peer_connected(id);
                self.dirty.notify_one();
            }
            InboundEvent::UserDisconnected(id) => {
                self.state.lock().await.presence.apply_peer_disconnected(&id);
                self.dirty.notify_one();
            }
            InboundEvent::UserTyping { user_id, group_id } => {
                let scope = typing_scope(&user_id, group_id.as_ref());
                self.state
                    .lock()
                    .await
                    .presence
                    .apply_typing_start(user_id, scope, now);
                self.dirty.notify_one();
            }
            InboundEvent::UserStoppedTyping { user_id, group_id } => {
                let scope = typing_scope(&user_id, group_id.as_ref());
                self.state
                    .lock()
                    .await
                    .presence
                    .apply_typing_stop(&user_id, &scope);
                self.dirty.notify_one();
            }
        }
    }

    async fn build_snapshot(&self) -> Snapshot {
        let messages = self.reconciler.messages().await;
        let state = self.state.lock().await;
        Snapshot {
            connection_state: self.connection.state(),
            messages,
            online_ids: state.presence.online_ids(),
            typing_ids: state
                .scope
                .as_ref()
                .map(|scope| state.presence.typing_ids(scope))
                .unwrap_or_default(),
            scope: state.scope.clone(),
            conversations: state.conversations.clone(),
            revision: 0,
        }
    }

    async fn run_inbound(self: Arc<Self>, inbound: Arc<Mutex<mpsc::Receiver<InboundEvent>>>) {
        let mut events = tokio::select! {
            _ = self.tasks.cancelled() => return,
            events = inbound.lock_owned() => events,
        };
        loop {
            let received = tokio::select! {
                _ = self.tasks.cancelled() => return,
                received = events.recv() => received,
            };
            match received {
                Some(event) => self.apply(event).await,
                None => return,
            }
        }
    }

    /// Single conversation refresher; any number of triggers while a
    /// refresh runs fold into one follow-up.
    async fn run_refresh(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.tasks.cancelled() => return,
                _ = self.refresh.notified() => {}
            }
            tokio::select! {
                _ = self.tasks.cancelled() => return,
                result = self.refresh_conversations() => {
                    if let Err(e) = result {
                        tracing::debug!(error = %e, "conversation refresh failed");
                    }
                }
            }
        }
    }

    async fn run_sweep(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = self.tasks.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let now = tokio::time::Instant::now().into_std();
            let expired = {
                let mut state = self.state.lock().await;
                state.presence.has_typing() && state.presence.sweep(now, self.typing_expiry)
            };
            if expired {
                tracing::trace!("typing entries expired");
                self.dirty.notify_one();
            }
        }
    }

    async fn run_publisher(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.tasks.cancelled() => return,
                _ = self.dirty.notified() => {}
            }
            // let mutations from the same tick land first
            tokio::task::yield_now().await;
            if self.tasks.is_cancelled() {
                return;
            }
            let snapshot = self.build_snapshot().await;
            if self.tasks.is_cancelled() {
                return;
            }
            publish(&self.snapshot, snapshot);
        }
    }

    async fn run_state_watch(self: Arc<Self>) {
        let mut status = self.connection.subscribe_state();
        loop {
            tokio::select! {
                _ = self.tasks.cancelled() => return,
                changed = status.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    self.dirty.notify_one();
                }
            }
        }
    }
}
