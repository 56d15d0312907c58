//! MessageReconciler - the async side of the local message list.
//!
//! Wraps [`MessageLog`] with the timers and completion sources of a send:
//!
//! - `begin` appends the optimistic entry and arms a one-shot echo signal
//! - `receive` applies inbound messages; an echo of a pending entry fires
//!   its signal, which cancels that send's fallback wait
//! - `settle` applies the durable-write result, waiting first for whichever
//!   comes earlier of the echo and the grace deadline
//!
//! Exactly one of the three paths settles an entry; the others observe
//! that it is no longer pending and leave the list alone.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use murmur_sync_core::{DurableOutcome, MessageLog, ReceiveOutcome};
use murmur_sync_types::{LocalId, Message, OutgoingMessage, ServerMessage, SyncError};
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A send that has been shown optimistically and awaits settlement.
#[derive(Debug)]
pub struct PendingSend {
    /// Local id of the optimistic entry.
    pub local_id: LocalId,
    deadline: Instant,
    echo: oneshot::Receiver<()>,
}

/// Result of [`MessageReconciler::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The list was replaced; carries the number of entries.
    Loaded(usize),
    /// A newer load started first; this result was discarded.
    Superseded,
}

struct ReconcilerState {
    log: MessageLog,
    echoes: HashMap<LocalId, oneshot::Sender<()>>,
    load_generation: u64,
    load_cancel: CancellationToken,
}

/// Owns the message list for one session.
pub struct MessageReconciler {
    state: Mutex<ReconcilerState>,
    grace: Duration,
    changed: Arc<Notify>,
}

impl MessageReconciler {
    /// Create an empty reconciler.
    ///
    /// `changed` is notified after every mutation of the list.
    pub fn new(grace: Duration, changed: Arc<Notify>) -> Self {
        Self {
            state: Mutex::new(ReconcilerState {
                log: MessageLog::new(),
                echoes: HashMap::new(),
                load_generation: 0,
                load_cancel: CancellationToken::new(),
            }),
            grace,
            changed,
        }
    }

    /// Snapshot of the list.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.log.messages().to_vec()
    }

    /// Append an optimistic entry and start its grace window.
    pub async fn begin(&self, outgoing: &OutgoingMessage, created_at: u64) -> PendingSend {
        let (tx, rx) = oneshot::channel();
        let local_id = {
            let mut state = self.state.lock().await;
            let local_id = state.log.append_pending(outgoing, created_at);
            state.echoes.insert(local_id, tx);
            local_id
        };
        self.changed.notify_one();
        tracing::debug!(%local_id, "optimistic message appended");

        PendingSend {
            local_id,
            deadline: Instant::now() + self.grace,
            echo: rx,
        }
    }

    /// Apply an inbound message.
    pub async fn receive(&self, message: ServerMessage) -> ReceiveOutcome {
        let server_id = message.id.clone();
        let outcome = {
            let mut state = self.state.lock().await;
            let outcome = state.log.receive(message);
            if let ReceiveOutcome::ConfirmedPending(local_id) = outcome {
                if let Some(echo) = state.echoes.remove(&local_id) {
                    let _ = echo.send(());
                }
            }
            outcome
        };

        match outcome {
            ReceiveOutcome::Appended => {
                tracing::trace!(%server_id, "message appended");
                self.changed.notify_one();
            }
            ReceiveOutcome::ConfirmedPending(local_id) => {
                tracing::debug!(%local_id, %server_id, "confirmed by echo");
                self.changed.notify_one();
            }
            ReceiveOutcome::Duplicate => {
                tracing::debug!(%server_id, "duplicate delivery ignored");
            }
        }
        outcome
    }

    /// Settle a send with its durable-write result.
    ///
    /// On success, waits until the echo arrives or the grace deadline passes
    /// before applying the saved record, so a prompt echo always wins. On
    /// failure, a still-pending entry is removed; an entry the echo already
    /// confirmed stays confirmed. The error is returned either way.
    pub async fn settle(
        &self,
        pending: PendingSend,
        durable: Result<ServerMessage, SyncError>,
    ) -> Result<ServerMessage, SyncError> {
        let PendingSend {
            local_id,
            deadline,
            mut echo,
        } = pending;

        let saved = match durable {
            Ok(saved) => saved,
            Err(error) => {
                let removed = {
                    let mut state = self.state.lock().await;
                    state.echoes.remove(&local_id);
                    state.log.fail(&local_id)
                };
                if removed.is_some() {
                    tracing::warn!(%local_id, %error, "durable write failed, message removed");
                    self.changed.notify_one();
                } else {
                    tracing::warn!(%local_id, %error, "durable write failed after confirmation");
                }
                return Err(error);
            }
        };

        tokio::select! {
            _ = &mut echo => {}
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let outcome = {
            let mut state = self.state.lock().await;
            state.echoes.remove(&local_id);
            state.log.apply_durable(&local_id, saved.clone())
        };
        match outcome {
            DurableOutcome::Replaced => {
                tracing::debug!(%local_id, server_id = %saved.id, "confirmed by durable write");
                self.changed.notify_one();
            }
            DurableOutcome::MergedIntoExisting => {
                tracing::debug!(%local_id, server_id = %saved.id, "merged into delivered copy");
                self.changed.notify_one();
            }
            DurableOutcome::AlreadySettled => {
                tracing::trace!(%local_id, "durable result discarded, already confirmed");
            }
            DurableOutcome::Missing => {
                tracing::debug!(%local_id, "durable result discarded, list reloaded");
            }
        }
        Ok(saved)
    }

    /// Replace the list with the result of `fetch`.
    ///
    /// Starting a load cancels any load still in flight; a result that
    /// arrives for a superseded load is discarded.
    pub async fn load<F>(&self, fetch: F) -> Result<LoadOutcome, SyncError>
    where
        F: Future<Output = Result<Vec<ServerMessage>, SyncError>>,
    {
        let (generation, cancel) = {
            let mut state = self.state.lock().await;
            state.load_cancel.cancel();
            state.load_generation += 1;
            state.load_cancel = CancellationToken::new();
            (state.load_generation, state.load_cancel.clone())
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(generation, "load superseded");
                return Ok(LoadOutcome::Superseded);
            }
            result = fetch => result,
        };

        let count = {
            let mut state = self.state.lock().await;
            if state.load_generation != generation {
                tracing::debug!(generation, "load superseded on arrival");
                return Ok(LoadOutcome::Superseded);
            }
            let records = result?;
            state.log.replace_all(records);
            state.echoes.clear();
            state.log.len()
        };
        self.changed.notify_one();
        Ok(LoadOutcome::Loaded(count))
    }

    /// Empty the list for a new scope.
    ///
    /// Loads still in flight are superseded and pending sends lose their
    /// entries; their durable results are discarded when they arrive.
    pub async fn reset(&self) {
        {
            let mut state = self.state.lock().await;
            state.load_cancel.cancel();
            state.load_generation += 1;
            state.log.clear();
            state.echoes.clear();
        }
        self.changed.notify_one();
    }

    /// Cancel any load in flight and drop every pending echo signal.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.load_cancel.cancel();
        state.echoes.clear();
    }
}
