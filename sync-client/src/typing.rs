//! TypingCoordinator - turns local edits into typing signals on the wire.
//!
//! Decisions come from [`TypingDebounce`]; this module owns the idle timer
//! and sends the resulting signals through the [`ConnectionManager`].
//! Signals are best-effort: a send that fails (e.g. while reconnecting) is
//! logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use murmur_sync_core::{TypingDebounce, TypingSignal};
use murmur_sync_types::Scope;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionManager;
use crate::transport::Transport;

/// Debounces local typing activity into `typing` / `stop_typing` events.
pub struct TypingCoordinator<T: Transport> {
    shared: Arc<Shared<T>>,
}

struct Shared<T: Transport> {
    connection: ConnectionManager<T>,
    state: Mutex<TypingState>,
}

struct TypingState {
    debounce: TypingDebounce,
    timer: Option<CancellationToken>,
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

impl<T: Transport> TypingCoordinator<T> {
    /// Create a coordinator that stops after `idle` without activity.
    pub fn new(connection: ConnectionManager<T>, idle: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                connection,
                state: Mutex::new(TypingState {
                    debounce: TypingDebounce::new(idle),
                    timer: None,
                }),
            }),
        }
    }

    /// Report that the local draft for `scope` changed.
    ///
    /// Safe to call on every keystroke: only the first call of a burst
    /// emits `typing`, and every call pushes the idle stop further out.
    pub async fn on_content_changed(&self, scope: &Scope, has_content: bool) {
        let mut state = self.shared.state.lock().await;
        let signals = state.debounce.on_content_changed(scope, has_content, now());
        arm_idle_timer(&self.shared, &mut state);
        for signal in signals {
            self.shared.dispatch(signal).await;
        }
    }

    /// End the current burst, sending `stop_typing` if one is active.
    pub async fn stop(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        if let Some(signal) = state.debounce.reset() {
            self.shared.dispatch(signal).await;
        }
    }

    /// Whether a burst is active.
    pub async fn is_active(&self) -> bool {
        self.shared.state.lock().await.debounce.is_active()
    }

    /// Cancel the idle timer and forget the burst without sending anything.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.debounce.reset();
    }
}

impl<T: Transport> Shared<T> {
    async fn dispatch(&self, signal: TypingSignal) {
        let event = signal.into_event();
        let name = event.name();
        if let Err(e) = self.connection.send(event).await {
            tracing::debug!(event = name, error = %e, "typing signal not sent");
        }
    }
}

/// Replace the idle timer with one for the current deadline.
fn arm_idle_timer<T: Transport>(shared: &Arc<Shared<T>>, state: &mut TypingState) {
    if let Some(timer) = state.timer.take() {
        timer.cancel();
    }
    let Some(deadline) = state.debounce.idle_deadline() else {
        return;
    };

    let token = CancellationToken::new();
    state.timer = Some(token.clone());
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep_until(Instant::from_std(deadline)) => {}
        }

        let mut state = shared.state.lock().await;
        if token.is_cancelled() {
            return;
        }
        state.timer = None;
        if let Some(signal) = state.debounce.on_idle(now()) {
            tracing::trace!("typing idle");
            shared.dispatch(signal).await;
        }
    });
}
