//! Push channel transports
//!
//! A transport turns a session id into an ordered stream of text frames.
//! The stream ends when the server closes the channel; a transport error is
//! yielded as the last item.

use agentview_core::{ClientConfig, ClientError, ClientResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{future, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Ordered text frames for one session
pub type FrameStream = BoxStream<'static, ClientResult<String>>;

/// Opens the push channel for a session
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Connect and return the frame stream
    ///
    /// # Errors
    /// - `ClientError::Network` if the channel cannot be opened
    async fn connect(&self, session_id: &str) -> ClientResult<FrameStream>;
}

/// WebSocket push channel at `{base}/analysis/{id}`
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    base_url: String,
}

impl WebSocketTransport {
    /// Create for a push channel base URL
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Create from client configuration
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.ws_base_url.clone())
    }

    /// Channel URL for a session
    #[must_use]
    pub fn session_url(&self, session_id: &str) -> String {
        format!("{}/analysis/{session_id}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn connect(&self, session_id: &str) -> ClientResult<FrameStream> {
        let url = self.session_url(session_id);
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Network(format!("push channel {url}: {e}")))?;
        tracing::info!(%url, "push channel connected");

        let frames = socket
            .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(WsMessage::Text(text)) => Some(Ok(text.to_string())),
                    Ok(_) => None,
                    Err(e) => Some(Err(ClientError::Network(e.to_string()))),
                })
            });
        Ok(frames.boxed())
    }
}

/// In-memory transport fed through [`FrameSender`]s
///
/// Each session id can be connected once; unknown ids fail to connect like
/// an unreachable server.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    pending: Mutex<HashMap<String, mpsc::UnboundedReceiver<ClientResult<String>>>>,
    unavailable: bool,
}

/// Sending half of a [`ChannelTransport`] session
///
/// Dropping every sender ends the stream.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<ClientResult<String>>,
}

impl FrameSender {
    /// Queue a text frame; false once the reader is gone
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.tx.send(Ok(frame.into())).is_ok()
    }

    /// Queue a transport error
    pub fn fail(&self, error: ClientError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

impl ChannelTransport {
    /// Create an empty transport
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose every connect fails
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Register a session and return its sender
    pub fn open(&self, session_id: impl Into<String>) -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.lock().insert(session_id.into(), rx);
        FrameSender { tx }
    }
}

#[async_trait]
impl PushTransport for ChannelTransport {
    async fn connect(&self, session_id: &str) -> ClientResult<FrameStream> {
        if self.unavailable {
            return Err(ClientError::Network("push channel unavailable".to_string()));
        }
        let rx = self
            .pending
            .lock()
            .remove(session_id)
            .ok_or_else(|| ClientError::Network(format!("no push channel for {session_id}")))?;
        let frames = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        Ok(frames.boxed())
    }
}
