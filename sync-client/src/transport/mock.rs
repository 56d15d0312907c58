//! Mock transport for testing.
//!
//! Allows scripting connect outcomes, queueing inbound frames, dropping the
//! connection on demand and capturing sent frames for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use murmur_sync_types::{Credential, InboundEvent, PeerId, RawFrame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep a handle while the connection
/// manager owns another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    wake: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    open: bool,
    open_calls: usize,
    endpoint: Option<String>,
    user_id: Option<PeerId>,
    connect_delay: Duration,
    connect_failures: VecDeque<TransportError>,
    sent: Vec<RawFrame>,
    inbound: VecDeque<RawFrame>,
    drop_pending: bool,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `open()` by `delay` before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_delay = delay;
    }

    /// Cause the next `open()` to fail with the given error.
    pub fn fail_next_connect(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_failures.push_back(error);
    }

    /// Cause the next `count` `open()` calls to fail.
    pub fn fail_connects(&self, count: usize, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..count {
            inner
                .connect_failures
                .push_back(TransportError::ConnectionFailed(reason.to_string()));
        }
    }

    /// Cause the next `send()` to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Queue a raw frame for `recv()`.
    pub fn push_frame(&self, frame: RawFrame) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.inbound.push_back(frame);
        }
        self.wake.notify_one();
    }

    /// Queue a server event for `recv()`.
    pub fn push_event(&self, event: &InboundEvent) {
        self.push_frame(event.to_frame());
    }

    /// Drop the live connection as if the network went away.
    ///
    /// Frames already queued stay queued for the next connection.
    pub fn simulate_drop(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.drop_pending = true;
        }
        self.wake.notify_one();
    }

    /// Number of `open()` calls so far, successful or not.
    pub fn open_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.open_calls
    }

    /// Get all frames that were sent.
    pub fn sent_frames(&self) -> Vec<RawFrame> {
        let inner = self.inner.lock().unwrap();
        inner.sent.clone()
    }

    /// Names of all sent events, in order.
    pub fn sent_event_names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent.iter().map(|f| f.event.clone()).collect()
    }

    /// Get the endpoint that was opened.
    pub fn endpoint(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.endpoint.clone()
    }

    /// Get the user that authenticated.
    pub fn authenticated_user(&self) -> Option<PeerId> {
        let inner = self.inner.lock().unwrap();
        inner.user_id.clone()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            wake: Arc::clone(&self.wake),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, endpoint: &str, credential: &Credential) -> Result<(), TransportError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            if inner.open {
                return Err(TransportError::AlreadyOpen);
            }
            inner.open_calls += 1;
            inner.connect_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.connect_failures.pop_front() {
            return Err(error);
        }

        inner.open = true;
        inner.drop_pending = false;
        inner.endpoint = Some(endpoint.to_string());
        inner.user_id = Some(credential.user_id.clone());
        Ok(())
    }

    async fn send(&self, frame: RawFrame) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.open {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent.push(frame);
        Ok(())
    }

    async fn recv(&self) -> Result<RawFrame, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }

        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.drop_pending {
                    inner.drop_pending = false;
                    inner.open = false;
                    return Err(TransportError::ConnectionClosed);
                }
                if !inner.open {
                    return Err(TransportError::ConnectionClosed);
                }
                if let Some(frame) = inner.inbound.pop_front() {
                    return Ok(frame);
                }
            }
            self.wake.notified().await;
        }
    }

    fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.open
    }

    async fn close(&self) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.open = false;
        }
        self.wake.notify_one();
        Ok(())
    }
}
