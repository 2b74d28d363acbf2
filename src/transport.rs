//! Transport adapter.
//!
//! [`Transport`] is the seam between the connection engine and whatever
//! actually carries bytes. The engine only ever talks to `dyn Transport`,
//! so tests can swap in [`mock::MockTransport`] without touching a socket.

pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StreamError};

/// A single binary websocket-level connection, already established.
///
/// Every method is cancel-aware: if `cancel` fires while the call is in
/// flight, it returns [`StreamError::Cancelled`] rather than blocking
/// forever on a peer that has gone silent.
#[async_trait]
pub trait Transport: Send {
    /// Read the next binary frame. `Ok(None)` means the peer closed the
    /// connection cleanly.
    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Vec<u8>>>;

    /// Send a binary frame.
    async fn write(&mut self, data: Vec<u8>, cancel: &CancellationToken) -> Result<()>;

    /// Send a protocol-level ping.
    async fn ping(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Close the connection, best-effort.
    async fn close(&mut self) -> Result<()>;
}

/// Builds a freshly connected [`Transport`] on demand. The supervisor calls
/// this once per (re)connect attempt.
pub type TransportFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Box<dyn Transport>>> + Send + Sync>;

/// A [`Transport`] backed by a real websocket connection.
pub struct WebSocketTransport {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl WebSocketTransport {
    /// Connect to `url`, returning a boxed [`Transport`] suitable for a
    /// [`TransportFactory`].
    pub async fn connect(url: url::Url) -> Result<Box<dyn Transport>> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Box::new(Self { stream }))
    }

    /// Build a [`TransportFactory`] that connects to `url` every time it is
    /// invoked.
    pub fn factory(url: url::Url) -> TransportFactory {
        Arc::new(move || {
            let url = url.clone();
            Box::pin(Self::connect(url))
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                msg = self.stream.next() => {
                    return match msg {
                        None => Ok(None),
                        Some(Ok(Message::Binary(bytes))) => Ok(Some(bytes.to_vec())),
                        Some(Ok(Message::Close(_))) => Ok(None),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => Err(StreamError::Transport(e)),
                    };
                }
            }
        }
    }

    async fn write(&mut self, data: Vec<u8>, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(StreamError::Cancelled),
            res = self.stream.send(Message::Binary(data.into())) => {
                res.map_err(StreamError::Transport)
            }
        }
    }

    async fn ping(&mut self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(StreamError::Cancelled),
            res = self.stream.send(Message::Ping(Vec::new().into())) => {
                res.map_err(StreamError::Transport)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await.map_err(StreamError::Transport)
    }
}
