//! Outgoing typing-signal debounce for murmur.
//!
//! Turns a high-frequency stream of "content changed" notifications into at
//! most one `typing` per burst and exactly one `stop_typing` when the burst
//! ends, either explicitly (content cleared) or by going idle.

use std::time::{Duration, Instant};

use murmur_sync_types::{OutboundEvent, Scope};

/// A typing signal to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingSignal {
    /// The local user started typing in this scope.
    Start(Scope),
    /// The local user stopped typing in this scope.
    Stop(Scope),
}

impl TypingSignal {
    /// Outbound event for this signal.
    pub fn into_event(self) -> OutboundEvent {
        match self {
            Self::Start(scope) => OutboundEvent::Typing(scope),
            Self::Stop(scope) => OutboundEvent::StopTyping(scope),
        }
    }
}

/// Debounce state for the local user's typing indicator.
#[derive(Debug, Clone)]
pub struct TypingDebounce {
    active: Option<Scope>,
    last_activity: Option<Instant>,
    idle: Duration,
}

impl TypingDebounce {
    /// Create a debounce that stops after `idle` without activity.
    pub fn new(idle: Duration) -> Self {
        Self {
            active: None,
            last_activity: None,
            idle,
        }
    }

    /// Whether a `Start` has been emitted and not yet stopped.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The scope currently signaled, if any.
    pub fn active_scope(&self) -> Option<&Scope> {
        self.active.as_ref()
    }

    /// Handle a local content change in `scope`.
    ///
    /// Every call with content resets the idle window. Switching scope while
    /// active stops the old scope before starting the new one.
    pub fn on_content_changed(
        &mut self,
        scope: &Scope,
        has_content: bool,
        now: Instant,
    ) -> Vec<TypingSignal> {
        let mut signals = Vec::new();

        if let Some(active) = self.active.as_ref() {
            if active != scope || !has_content {
                signals.extend(self.reset());
            }
        }

        if has_content {
            self.last_activity = Some(now);
            if self.active.is_none() {
                self.active = Some(scope.clone());
                signals.push(TypingSignal::Start(scope.clone()));
            }
        }

        signals
    }

    /// When the idle stop fires if nothing else happens.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.active.as_ref()?;
        self.last_activity.map(|at| at + self.idle)
    }

    /// Check the idle window; emits `Stop` once it has elapsed.
    pub fn on_idle(&mut self, now: Instant) -> Option<TypingSignal> {
        let last = self.last_activity?;
        if now.saturating_duration_since(last) >= self.idle {
            self.reset()
        } else {
            None
        }
    }

    /// End any active burst, returning its `Stop`.
    pub fn reset(&mut self) -> Option<TypingSignal> {
        self.last_activity = None;
        self.active.take().map(TypingSignal::Stop)
    }
}
