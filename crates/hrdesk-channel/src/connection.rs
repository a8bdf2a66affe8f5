//! Single socket connection management.
//!
//! One connection is shared by every subscriber in a client session; it is
//! owned by the [`SubscriptionManager`](crate::SubscriptionManager) and never
//! closed by individual subscribers.

use crate::error::{ChannelError, Result};
use crate::frame::{encode_join, encode_leave, parse_socket_frame};
use crate::registry::SubscriptionRegistry;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Socket connection configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub connect_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// A websocket connection that feeds decoded frames into the shared
/// subscription registry.
pub struct SocketConnection {
    url: Url,
    config: SocketConfig,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    registry: Arc<SubscriptionRegistry>,
    recv_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    closed: Arc<Notify>,
}

impl SocketConnection {
    /// Create a new connection bound to `registry` with default config.
    pub fn new(url: &str, registry: Arc<SubscriptionRegistry>) -> Result<Self> {
        Self::with_config(url, SocketConfig::default(), registry)
    }

    /// Create a new connection with custom config.
    pub fn with_config(
        url: &str,
        config: SocketConfig,
        registry: Arc<SubscriptionRegistry>,
    ) -> Result<Self> {
        let parsed_url = Url::parse(url)?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ChannelError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }

        Ok(Self {
            url: parsed_url,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            registry,
            recv_task: Arc::new(Mutex::new(None)),
            closed: Arc::new(Notify::new()),
        })
    }

    /// Socket URL as string.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Resolves once the connection has dropped (reader task exited or an
    /// explicit disconnect). A drop that already happened resolves
    /// immediately.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }

    /// Connect and start the background receive loop.
    ///
    /// Refused unless the connection is fully disconnected: a second caller
    /// arriving while a handshake is still in flight would otherwise race it
    /// into two live sockets.
    pub async fn connect(&self) -> Result<()> {
        let mut state_guard = self.state.write().await;
        if *state_guard != ConnectionState::Disconnected {
            return Err(ChannelError::AlreadyConnected);
        }
        *state_guard = ConnectionState::Connecting;
        drop(state_guard);

        let connect_result = timeout(
            self.config.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| {
            ChannelError::Timeout(format!(
                "connection timeout after {:?}",
                self.config.connect_timeout
            ))
        });

        let connect_result = match connect_result {
            Ok(inner) => inner.map_err(|error| ChannelError::WebSocket(error.to_string())),
            Err(error) => Err(error),
        };

        let (stream, _response) = match connect_result {
            Ok(pair) => pair,
            Err(error) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(error);
            }
        };

        let (writer, mut reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.state.write().await = ConnectionState::Connected;

        let registry = Arc::clone(&self.registry);
        let state = Arc::clone(&self.state);
        let closed = Arc::clone(&self.closed);
        let socket_url = self.url.to_string();

        let task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match parse_socket_frame(text.as_str()) {
                        Ok(Some(frame)) => {
                            let invoked = registry.dispatch(frame.channel(), frame.payload());
                            debug!(
                                "dispatched event on {} to {} handler(s)",
                                frame.channel(),
                                invoked
                            );
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!("frame decode error on {}: {}", socket_url, error);
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        debug!("received ping from {} ({} bytes)", socket_url, payload.len());
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Frame(_)) => {}
                    Err(error) => {
                        warn!("websocket read error on {}: {}", socket_url, error);
                        break;
                    }
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            closed.notify_one();
        });

        *self.recv_task.lock().await = Some(task);
        Ok(())
    }

    /// Disconnect and stop the background task.
    ///
    /// Always lands in `Disconnected` with the reader stopped; a failed
    /// close handshake is reported only after the teardown is complete.
    pub async fn disconnect(&self) -> Result<()> {
        let close_result = match self.writer.lock().await.take() {
            Some(mut writer) => writer
                .send(Message::Close(None))
                .await
                .map_err(|error| ChannelError::WebSocket(error.to_string())),
            None => Ok(()),
        };

        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }

        *self.state.write().await = ConnectionState::Disconnected;
        self.closed.notify_one();
        close_result
    }

    /// Send the transport-level join for a channel name.
    pub async fn join(&self, channel: &str) -> Result<()> {
        self.send_json(&encode_join(channel)).await
    }

    /// Send the transport-level leave for a channel name.
    pub async fn leave(&self, channel: &str) -> Result<()> {
        self.send_json(&encode_leave(channel)).await
    }

    async fn send_json(&self, value: &Value) -> Result<()> {
        if self.state().await != ConnectionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        let text = serde_json::to_string(value)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ChannelError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ChannelError::WebSocket(error.to_string()))
    }
}
