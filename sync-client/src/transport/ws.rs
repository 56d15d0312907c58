//! WebSocket transport.
//!
//! JSON text frames of the form `{"event": ..., "payload": ...}` over a
//! single WebSocket. The bearer token travels in the `Authorization` header
//! of the upgrade request, so an unauthenticated socket never opens.

use super::{Transport, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use murmur_sync_types::{Credential, RawFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket implementation of [`Transport`].
pub struct WsTransport {
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    open: AtomicBool,
    closed: std::sync::Mutex<CancellationToken>,
}

impl WsTransport {
    /// Create a closed transport.
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            open: AtomicBool::new(false),
            closed: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    fn close_token(&self) -> CancellationToken {
        self.closed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn reset_close_token(&self) {
        let mut token = self
            .closed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *token = CancellationToken::new();
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("open", &self.open.load(Ordering::Acquire))
            .finish()
    }
}

fn handshake_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                TransportError::AuthRejected(status.to_string())
            } else {
                TransportError::ConnectionFailed(format!("handshake answered {}", status))
            }
        }
        other => TransportError::ConnectionFailed(other.to_string()),
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, endpoint: &str, credential: &Credential) -> Result<(), TransportError> {
        if self.open.load(Ordering::Acquire) {
            return Err(TransportError::AlreadyOpen);
        }

        let mut request = endpoint
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credential.token))
            .map_err(|_| TransportError::AuthRejected("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        tracing::debug!(endpoint, "opening websocket");
        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(handshake_error)?;
        let (writer, reader) = stream.split();

        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        self.reset_close_token();
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn send(&self, frame: RawFrame) -> Result<(), TransportError> {
        let text = frame
            .to_json()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<RawFrame, TransportError> {
        let closed = self.close_token();
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            let next = tokio::select! {
                _ = closed.cancelled() => return Err(TransportError::ConnectionClosed),
                next = reader.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => match RawFrame::from_json(text.as_str()) {
                    Ok(frame) => return Ok(frame),
                    Err(e) => {
                        tracing::warn!(error = %e, len = text.len(), "skipping malformed text frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    self.open.store(false, Ordering::Release);
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.open.store(false, Ordering::Release);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        self.close_token().cancel();

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "close frame not delivered");
            }
        }
        self.reader.lock().await.take();
        Ok(())
    }
}
