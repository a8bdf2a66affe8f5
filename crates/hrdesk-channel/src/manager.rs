//! Reference-counted channel subscriptions over one shared connection.

use crate::connection::{ConnectionState, SocketConfig, SocketConnection};
use crate::error::Result;
use crate::registry::{EventHandler, SubscriptionHandle, SubscriptionRegistry};
use hrdesk_protocol::ChannelName;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Subscription manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
}

impl ManagerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            reconnect_base: Duration::from_millis(500),
            reconnect_cap: Duration::from_secs(30),
        }
    }
}

/// State whose transitions must be serialized: the refcount-to-transport
/// edge (join/leave/connect/disconnect) and supervisor liveness. Everything
/// that moves the transport between states runs under the one lock holding
/// this, so a refcount decision and its transport call are atomic with
/// respect to every other transition, including supervisor reconnects.
#[derive(Default)]
struct ManagerState {
    supervisor_active: bool,
}

/// Owns the session's single socket connection and hands out per-handler
/// subscriptions.
///
/// The transport-level subscription for a channel name is opened by the
/// first handler and torn down when the handler set becomes empty; the
/// connection itself is established on the first subscriber and released
/// when the last one unsubscribes.
pub struct SubscriptionManager {
    connection: Arc<SocketConnection>,
    registry: Arc<SubscriptionRegistry>,
    config: ManagerConfig,
    ops: Arc<Mutex<ManagerState>>,
}

impl SubscriptionManager {
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let connection = Arc::new(SocketConnection::with_config(
            &config.url,
            SocketConfig {
                connect_timeout: config.connect_timeout,
            },
            Arc::clone(&registry),
        )?);
        Ok(Self {
            connection,
            registry,
            config,
            ops: Arc::new(Mutex::new(ManagerState::default())),
        })
    }

    /// Current transport state, for surfacing degraded connectivity.
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Register `handler` for `channel`.
    ///
    /// Idempotent at the connection level: subscribing to an already-active
    /// channel name registers the handler without opening a second
    /// transport subscription.
    pub async fn subscribe(
        &self,
        channel: ChannelName,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle> {
        let mut state = self.ops.lock().await;
        let (handle, first) = self.registry.register(&channel, handler);

        if let Err(error) = self.ensure_joined(&mut state, &channel, first).await {
            self.registry.remove(&handle);
            return Err(error);
        }

        debug!("subscribed to {} (transport join: {})", channel, first);
        Ok(handle)
    }

    /// Remove the handler behind `handle`.
    ///
    /// Safe to call at any time, including during an in-flight connect; once
    /// this returns the handler is never invoked again. The transport-level
    /// subscription is closed only when the channel's handler set is empty,
    /// and the connection itself only when no channels remain.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        let _state = self.ops.lock().await;
        let channel_empty = self.registry.remove(handle);

        if channel_empty && self.connection.state().await == ConnectionState::Connected {
            if let Err(error) = self.connection.leave(handle.channel().as_str()).await {
                warn!("leave failed for {}: {}", handle.channel(), error);
            }
        }

        if self.registry.is_empty()
            && self.connection.state().await != ConnectionState::Disconnected
        {
            self.connection.disconnect().await?;
        }

        Ok(())
    }

    async fn ensure_joined(
        &self,
        state: &mut ManagerState,
        channel: &ChannelName,
        first: bool,
    ) -> Result<()> {
        self.ensure_connected(state).await?;
        if first {
            self.connection.join(channel.as_str()).await?;
        }
        Ok(())
    }

    async fn ensure_connected(&self, state: &mut ManagerState) -> Result<()> {
        if self.connection.state().await == ConnectionState::Connected {
            return Ok(());
        }
        self.connection.connect().await?;

        if !state.supervisor_active {
            state.supervisor_active = true;
            let connection = Arc::clone(&self.connection);
            let registry = Arc::clone(&self.registry);
            let ops = Arc::clone(&self.ops);
            let base = self.config.reconnect_base;
            let cap = self.config.reconnect_cap;
            tokio::spawn(async move {
                run_supervisor(connection, registry, ops, base, cap).await;
            });
        }
        Ok(())
    }
}

/// Reconnect loop: waits for the connection to drop, then retries with
/// capped exponential backoff and rejoins every active channel. Connect and
/// rejoin run under the manager lock, so the supervisor can never race a
/// concurrent subscribe or unsubscribe into a second live connection; the
/// `supervisor_active` flag flips under the same lock as the exit decision.
async fn run_supervisor(
    connection: Arc<SocketConnection>,
    registry: Arc<SubscriptionRegistry>,
    ops: Arc<Mutex<ManagerState>>,
    base: Duration,
    cap: Duration,
) {
    loop {
        connection.closed().await;
        {
            let mut state = ops.lock().await;
            if registry.is_empty() {
                debug!("socket closed with no subscribers; supervisor exiting");
                state.supervisor_active = false;
                return;
            }
            if connection.state().await == ConnectionState::Connected {
                // A subscriber already reconnected while we waited for the
                // lock; nothing to do this round.
                continue;
            }
        }

        let mut attempt: u32 = 0;
        'reconnect: loop {
            let delay = reconnect_backoff(base, cap, attempt);
            debug!("reconnect attempt {} in {:?}", attempt, delay);
            sleep(delay).await;

            let mut state = ops.lock().await;
            if registry.is_empty() {
                debug!("subscribers gone during backoff; supervisor exiting");
                state.supervisor_active = false;
                return;
            }
            if connection.state().await == ConnectionState::Connected {
                break 'reconnect;
            }

            match connection.connect().await {
                Ok(()) => {
                    for name in registry.channel_names() {
                        if let Err(error) = connection.join(&name).await {
                            warn!("rejoin failed for {}: {}", name, error);
                        }
                    }
                    break 'reconnect;
                }
                Err(error) => {
                    warn!("reconnect attempt {} failed: {}", attempt, error);
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

/// Backoff schedule: `base * 2^attempt`, clamped to `cap`.
pub fn reconnect_backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use hrdesk_protocol::{HitlEventPayload, HitlTask, TicketDetails};
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::sync::Notify;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    fn sample_payload() -> HitlEventPayload {
        HitlEventPayload {
            task: HitlTask::TicketCreation {
                details: TicketDetails::default(),
            },
            conversation_id: None,
            user_id: None,
        }
    }

    /// What the in-process endpoint has observed on the wire.
    struct WireLog {
        connections: usize,
        joins: usize,
        joined: HashSet<String>,
    }

    struct TestServer {
        url: String,
        log: Arc<StdMutex<WireLog>>,
        /// Hard-drops every live socket without a close handshake.
        drop_connections: Arc<Notify>,
    }

    impl TestServer {
        fn log(&self) -> std::sync::MutexGuard<'_, WireLog> {
            self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    async fn spawn_server() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let log = Arc::new(StdMutex::new(WireLog {
            connections: 0,
            joins: 0,
            joined: HashSet::new(),
        }));
        let drop_connections = Arc::new(Notify::new());

        let accept_log = Arc::clone(&log);
        let accept_drop = Arc::clone(&drop_connections);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&accept_log);
                let drop_signal = Arc::clone(&accept_drop);
                tokio::spawn(async move {
                    let Ok(mut socket) = accept_async(stream).await else {
                        return;
                    };
                    log.lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .connections += 1;
                    loop {
                        tokio::select! {
                            frame = socket.next() => {
                                match frame {
                                    Some(Ok(Message::Text(text))) => record_frame(&log, text.as_str()),
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            () = drop_signal.notified() => break,
                        }
                    }
                });
            }
        });

        TestServer {
            url: format!("ws://{addr}/socket"),
            log,
            drop_connections,
        }
    }

    fn record_frame(log: &StdMutex<WireLog>, text: &str) {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let Some(frame) = value.as_array() else {
            return;
        };
        let kind = frame.first().and_then(Value::as_str);
        let channel = frame.get(1).and_then(Value::as_str);
        let mut log = log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match (kind, channel) {
            (Some("join_room"), Some(name)) => {
                log.joins += 1;
                log.joined.insert(name.to_string());
            }
            (Some("leave_room"), Some(name)) => {
                log.joined.remove(name);
            }
            _ => {}
        }
    }

    #[test]
    fn backoff_is_monotone_and_capped() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(30);

        let mut previous = Duration::ZERO;
        for attempt in 0..12 {
            let delay = reconnect_backoff(base, cap, attempt);
            assert!(delay >= previous, "attempt {attempt} decreased");
            assert!(delay <= cap, "attempt {attempt} exceeded cap");
            previous = delay;
        }

        assert_eq!(reconnect_backoff(base, cap, 0), Duration::from_millis(500));
        assert_eq!(reconnect_backoff(base, cap, 1), Duration::from_secs(1));
        assert_eq!(reconnect_backoff(base, cap, 63), cap);
    }

    #[tokio::test]
    async fn unsubscribed_handler_receives_no_further_events() {
        // Dispatch goes through the shared registry, so transport delivery
        // after unsubscribe is equivalent to a direct dispatch call.
        let manager = SubscriptionManager::new(ManagerConfig::new("wss://example.com/socket"))
            .expect("manager");
        let channel = ChannelName::raw("CH");
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let (handle, _) = manager.registry.register(
            &channel,
            Arc::new(move |_payload| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        manager.registry.dispatch("CH", &sample_payload());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        manager.unsubscribe(&handle).await.expect("unsubscribe");
        manager.registry.dispatch("CH", &sample_payload());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_failure_rolls_back_registration() {
        // ws:// to a reserved port with a tiny timeout fails fast.
        let mut config = ManagerConfig::new("ws://127.0.0.1:9/socket");
        config.connect_timeout = Duration::from_millis(200);
        let manager = SubscriptionManager::new(config).expect("manager");

        let channel = ChannelName::raw("CH");
        let result = manager
            .subscribe(channel, Arc::new(|_payload| Ok(())))
            .await;
        assert!(result.is_err());
        assert!(manager.registry.is_empty());
    }

    #[tokio::test]
    async fn concurrent_subscribers_share_one_connection() {
        let server = spawn_server().await;
        let manager =
            Arc::new(SubscriptionManager::new(ManagerConfig::new(&server.url)).expect("manager"));

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .subscribe(ChannelName::raw("CH-A"), Arc::new(|_payload| Ok(())))
                    .await
            })
        };
        let second = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .subscribe(ChannelName::raw("CH-B"), Arc::new(|_payload| Ok(())))
                    .await
            })
        };
        first.await.expect("task").expect("subscribe CH-A");
        second.await.expect("task").expect("subscribe CH-B");

        sleep(Duration::from_millis(100)).await;
        let log = server.log();
        assert_eq!(log.connections, 1, "one connection for the whole session");
        assert!(log.joined.contains("CH-A"));
        assert!(log.joined.contains("CH-B"));
    }

    #[tokio::test]
    async fn dropped_connection_reconnects_once_and_rejoins() {
        let server = spawn_server().await;
        let mut config = ManagerConfig::new(&server.url);
        config.reconnect_base = Duration::from_millis(20);
        config.reconnect_cap = Duration::from_millis(100);
        let manager = SubscriptionManager::new(config).expect("manager");

        let handle = manager
            .subscribe(ChannelName::raw("CH"), Arc::new(|_payload| Ok(())))
            .await
            .expect("subscribe");
        sleep(Duration::from_millis(100)).await;

        server.drop_connections.notify_waiters();
        sleep(Duration::from_millis(500)).await;

        {
            let log = server.log();
            assert_eq!(log.connections, 2, "exactly one reconnect, no duplicates");
            assert_eq!(log.joins, 2, "channel rejoined after the reconnect");
            assert!(log.joined.contains("CH"));
        }
        assert_eq!(manager.connection_state().await, ConnectionState::Connected);
        manager.unsubscribe(&handle).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn membership_survives_racing_unsubscribe_and_resubscribe() {
        // The refcount decision and its transport call are one atomic
        // transition: whichever order the two tasks land in, a channel with
        // a live handler ends up joined on the wire.
        let server = spawn_server().await;
        let manager =
            Arc::new(SubscriptionManager::new(ManagerConfig::new(&server.url)).expect("manager"));
        let channel = ChannelName::raw("CH");
        let first = manager
            .subscribe(channel.clone(), Arc::new(|_payload| Ok(())))
            .await
            .expect("subscribe");

        let unsubscribe = {
            let manager = Arc::clone(&manager);
            let handle = first.clone();
            tokio::spawn(async move { manager.unsubscribe(&handle).await })
        };
        let resubscribe = {
            let manager = Arc::clone(&manager);
            let channel = channel.clone();
            tokio::spawn(
                async move { manager.subscribe(channel, Arc::new(|_payload| Ok(()))).await },
            )
        };
        unsubscribe.await.expect("task").expect("unsubscribe");
        let second = resubscribe.await.expect("task").expect("resubscribe");

        sleep(Duration::from_millis(100)).await;
        {
            let log = server.log();
            assert!(
                log.joined.contains("CH"),
                "live handler must have wire membership"
            );
        }
        manager.unsubscribe(&second).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn released_connection_is_reusable() {
        let server = spawn_server().await;
        let manager = SubscriptionManager::new(ManagerConfig::new(&server.url)).expect("manager");
        let channel = ChannelName::raw("CH");

        let handle = manager
            .subscribe(channel.clone(), Arc::new(|_payload| Ok(())))
            .await
            .expect("subscribe");
        manager.unsubscribe(&handle).await.expect("unsubscribe");
        assert_eq!(
            manager.connection_state().await,
            ConnectionState::Disconnected
        );

        let handle = manager
            .subscribe(channel, Arc::new(|_payload| Ok(())))
            .await
            .expect("resubscribe");
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.log().connections, 2);
        manager.unsubscribe(&handle).await.expect("unsubscribe");
    }
}
