//! Long-lived push session with heartbeat and bounded reconnect.
//!
//! # State Machine
//! ```text
//! Disconnected → Connecting → Connected → Registered → Subscribed
//!                    ▲                                      │
//!                    │          failure / server drop       │
//!                    └──── Reconnecting ◀───────────────────┘
//!                               │ attempts exhausted
//!                               ▼
//!                             Failed (terminal)
//! ```
//!
//! # Design Decisions
//! - One task owns the socket, the heartbeat interval and the backoff sleep;
//!   cancelling it stops both timers at once
//! - After every successful subscribe the session pulls the served
//!   configuration over HTTP, so pushes missed while offline are recovered
//! - The failure counter resets only when a registration succeeds
//! - Pushes are version-checked; HTTP pulls adopt whatever the server serves,
//!   so a restore to an older version still reaches the client
//! - With `cache_file` set, the last applied state is saved after every
//!   change and loaded by `ClientSession::new`
//! - With `poll_interval` set, the session polls the HTTP endpoint while it
//!   waits to reconnect

use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::cache::ConfigCache;
use crate::client::ConfigClient;
use crate::error::{SdkError, SdkResult};
use crate::protocol::{session_topics, ClientMessage, ServerMessage};
use crate::store::{ConfigState, LocalConfigStore};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Counts consecutive failures against the policy ceiling.
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    failures: u32,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    pub fn record_failure(&mut self) -> ReconnectDecision {
        self.failures = self.failures.saturating_add(1);
        if self.failures < self.policy.max_attempts {
            ReconnectDecision::Retry {
                attempt: self.failures,
                delay: self.policy.delay,
            }
        } else {
            ReconnectDecision::GiveUp {
                attempts: self.failures,
            }
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Registered,
    Subscribed,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The local store now holds this version.
    ConfigReplaced { version_number: Option<u64> },
    ChangeNotified { version_number: u64 },
    Broadcast(String),
    /// The session stopped. `error` is `None` after a deliberate disconnect.
    Terminated { error: Option<String> },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP base url of the config center, e.g. `http://localhost:8080`.
    pub server_url: String,
    pub application_id: String,
    pub environment_id: String,
    pub instance_id: String,
    pub instance_ip: String,
    pub client_version: String,
    pub reconnect: ReconnectPolicy,
    /// Overrides the interval announced by the server.
    pub heartbeat_interval: Option<Duration>,
    /// Where to keep the last applied configuration between runs.
    pub cache_file: Option<PathBuf>,
    /// Poll over HTTP at this period while reconnecting.
    pub poll_interval: Option<Duration>,
}

impl SessionConfig {
    pub fn new(server_url: &str, application_id: &str, environment_id: &str, instance_id: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            application_id: application_id.to_string(),
            environment_id: environment_id.to_string(),
            instance_id: instance_id.to_string(),
            instance_ip: "127.0.0.1".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: None,
            cache_file: None,
            poll_interval: None,
        }
    }
}

/// `http(s)://host/...` → `ws(s)://host/ws`.
pub fn websocket_url(server_url: &str) -> SdkResult<String> {
    let mut url = Url::parse(server_url)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| SdkError::Protocol(format!("unsupported scheme in {server_url}")))?;
    url.set_path("/ws");
    url.set_query(None);
    Ok(url.to_string())
}

pub struct ClientSession {
    config: SessionConfig,
    http: ConfigClient,
    store: LocalConfigStore,
    cache: Option<ConfigCache>,
}

impl ClientSession {
    /// Reads the cache file, if configured, so values are available before
    /// the first connection succeeds.
    pub fn new(config: SessionConfig) -> Self {
        let http = ConfigClient::new(&config.server_url);
        let cache = config
            .cache_file
            .as_ref()
            .map(|path| ConfigCache::new(path.clone(), &config.application_id, &config.environment_id));

        let store = match cache.as_ref().map(ConfigCache::load) {
            Some(Ok(Some(state))) => {
                tracing::info!(version = ?state.version_number, keys = state.values.len(), "Loaded cached configuration");
                LocalConfigStore::with_state(state)
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Unreadable config cache, starting empty");
                LocalConfigStore::new()
            }
            _ => LocalConfigStore::new(),
        };

        Self {
            config,
            http,
            store,
            cache,
        }
    }

    pub fn config(&self) -> &LocalConfigStore {
        &self.store
    }

    /// Spawn the session task. Must be called inside a Tokio runtime.
    pub fn start(self) -> SessionHandle {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let store = self.store.clone();

        let runner = Runner {
            tracker: ReconnectTracker::new(self.config.reconnect),
            session: self,
            state: state_tx,
            events: event_tx,
        };
        let task = tokio::spawn(runner.run(cancel_rx));

        SessionHandle {
            state: state_rx,
            events: event_rx,
            store,
            cancel: cancel_tx,
            task,
        }
    }
}

pub struct SessionHandle {
    state: watch::Receiver<SessionState>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    store: LocalConfigStore,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn config(&self) -> &LocalConfigStore {
        &self.store
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Resolves once the session reaches `target`, or `false` if the task ended first.
    pub async fn wait_for_state(&mut self, target: SessionState) -> bool {
        self.state.wait_for(|s| *s == target).await.is_ok()
    }

    /// Stop the session: heartbeat and reconnect timers end with the task.
    pub async fn disconnect(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Session task failed");
        }
    }
}

enum Exit {
    Cancelled,
    Dropped(String),
}

struct Runner {
    session: ClientSession,
    tracker: ReconnectTracker,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Runner {
    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            let _ = self.events.send(SessionEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        let error = match websocket_url(&self.session.config.server_url) {
            Ok(ws_url) => self.reconnect_loop(&ws_url, &mut cancel).await,
            Err(e) => {
                self.set_state(SessionState::Failed);
                Some(e.to_string())
            }
        };

        if error.is_none() {
            self.set_state(SessionState::Disconnected);
        }
        self.emit(SessionEvent::Terminated { error });
    }

    async fn reconnect_loop(&mut self, ws_url: &str, cancel: &mut watch::Receiver<bool>) -> Option<String> {
        loop {
            self.set_state(SessionState::Connecting);
            let reason = match self.connect_once(ws_url, cancel).await {
                Ok(Exit::Cancelled) => return None,
                Ok(Exit::Dropped(reason)) => reason,
                Err(e) => e.to_string(),
            };

            match self.tracker.record_failure() {
                ReconnectDecision::Retry { attempt, delay } => {
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, reason = %reason, "Connection lost, reconnecting");
                    self.set_state(SessionState::Reconnecting);
                    if self.backoff(delay, cancel).await {
                        return None;
                    }
                }
                ReconnectDecision::GiveUp { attempts } => {
                    tracing::error!(attempts, reason = %reason, "Giving up on config center connection");
                    self.set_state(SessionState::Failed);
                    return Some(reason);
                }
            }
        }
    }

    /// Wait out the reconnect delay, polling if configured. Returns `true`
    /// when cancelled.
    async fn backoff(&self, delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);

        let Some(period) = self.session.config.poll_interval else {
            return tokio::select! {
                _ = &mut sleep => false,
                _ = cancel.changed() => true,
            };
        };

        let mut poll = time::interval(period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                _ = cancel.changed() => return true,
                _ = poll.tick() => self.pull().await,
            }
        }
    }

    async fn connect_once(&mut self, ws_url: &str, cancel: &mut watch::Receiver<bool>) -> SdkResult<Exit> {
        let (mut ws, _) = tokio::select! {
            result = connect_async(ws_url) => result?,
            _ = cancel.changed() => return Ok(Exit::Cancelled),
        };
        self.set_state(SessionState::Connected);

        let config = &self.session.config;
        send(
            &mut ws,
            &ClientMessage::ClientRegistration {
                application_id: config.application_id.clone(),
                instance_id: config.instance_id.clone(),
                instance_ip: config.instance_ip.clone(),
                client_version: config.client_version.clone(),
            },
        )
        .await?;

        let (connection_id, announced) = tokio::select! {
            result = time::timeout(HANDSHAKE_TIMEOUT, await_welcome(&mut ws)) => result
                .map_err(|_| SdkError::Protocol("no CONNECT_SUCCESS within handshake timeout".into()))??,
            _ = cancel.changed() => return Ok(Exit::Cancelled),
        };
        self.tracker.record_success();
        self.set_state(SessionState::Registered);
        tracing::info!(connection_id = %connection_id, "Registered with config center");

        let topics = session_topics(&config.application_id, &config.environment_id, &config.instance_id);
        for topic in &topics {
            send(&mut ws, &ClientMessage::Subscribe { topic: topic.clone() }).await?;
        }
        let mut pending_acks = topics.len();

        let period = config
            .heartbeat_interval
            .unwrap_or(Duration::from_secs(announced.max(1)));
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => send(&mut ws, &ClientMessage::Heartbeat).await?,
                _ = cancel.changed() => {
                    let _ = send(&mut ws, &ClientMessage::Disconnect).await;
                    let _ = ws.close(None).await;
                    return Ok(Exit::Cancelled);
                }
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message: ServerMessage = match serde_json::from_str(text.as_str()) {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::warn!(error = %e, "Ignoring unreadable frame");
                                continue;
                            }
                        };
                        if let Some(exit) = self.handle(message, &mut pending_acks).await {
                            return Ok(exit);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(Exit::Dropped("server closed the connection".into())),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }

    async fn handle(&self, message: ServerMessage, pending_acks: &mut usize) -> Option<Exit> {
        let config = &self.session.config;
        match message {
            ServerMessage::Subscribed { topic } => {
                tracing::debug!(topic = %topic, "Subscribed");
                *pending_acks = pending_acks.saturating_sub(1);
                if *pending_acks == 0 {
                    self.set_state(SessionState::Subscribed);
                    self.pull().await;
                }
            }
            ServerMessage::ConfigUpdate {
                application_id,
                environment_id,
                snapshot_id,
                version_number,
                config: values,
            } => {
                if application_id == config.application_id && environment_id == config.environment_id {
                    let replaced = self.session.store.replace(ConfigState {
                        snapshot_id: Some(snapshot_id),
                        version_number: Some(version_number),
                        values,
                    });
                    if replaced {
                        self.applied(Some(version_number)).await;
                    }
                }
            }
            ServerMessage::ConfigChangeNotification {
                application_id,
                environment_id,
                version_number,
            } => {
                if application_id == config.application_id && environment_id == config.environment_id {
                    self.emit(SessionEvent::ChangeNotified { version_number });
                    if self.session.store.version() != Some(version_number) {
                        self.pull().await;
                    }
                }
            }
            ServerMessage::Broadcast { message } => self.emit(SessionEvent::Broadcast(message)),
            ServerMessage::Disconnect { reason } => {
                tracing::info!(reason = %reason, "Server closed the session");
                return Some(Exit::Dropped(reason));
            }
            ServerMessage::Error { message } => tracing::warn!(message = %message, "Server reported an error"),
            ServerMessage::HeartbeatAck => tracing::trace!("Heartbeat acknowledged"),
            ServerMessage::ConnectSuccess { .. } => {}
        }
        None
    }

    /// Reconcile with the served configuration. Failures are logged only.
    async fn pull(&self) {
        let config = &self.session.config;
        match self.session.http.fetch(&config.application_id, &config.environment_id).await {
            Ok(response) => {
                let state = ConfigState::from(response);
                let version_number = state.version_number;
                if self.session.store.force_replace(state) {
                    self.applied(version_number).await;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to pull configuration"),
        }
    }

    async fn applied(&self, version_number: Option<u64>) {
        self.persist().await;
        self.emit(SessionEvent::ConfigReplaced { version_number });
    }

    async fn persist(&self) {
        let Some(cache) = self.session.cache.clone() else {
            return;
        };
        let state = self.session.store.snapshot();
        match tokio::task::spawn_blocking(move || cache.save(&state)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to write config cache"),
            Err(e) => tracing::warn!(error = %e, "Config cache writer panicked"),
        }
    }
}

async fn send(ws: &mut Socket, message: &ClientMessage) -> SdkResult<()> {
    let text = serde_json::to_string(message)?;
    ws.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn await_welcome(ws: &mut Socket) -> SdkResult<(String, u64)> {
    while let Some(frame) = ws.next().await {
        if let Message::Text(text) = frame? {
            match serde_json::from_str::<ServerMessage>(text.as_str())? {
                ServerMessage::ConnectSuccess {
                    connection_id,
                    heartbeat_interval_secs,
                } => return Ok((connection_id, heartbeat_interval_secs)),
                ServerMessage::Error { message } => return Err(SdkError::Protocol(message)),
                _ => continue,
            }
        }
    }
    Err(SdkError::Closed("closed before CONNECT_SUCCESS".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_gives_up_at_ceiling_and_resets_on_success() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::default());
        for attempt in 1..5 {
            assert_eq!(
                tracker.record_failure(),
                ReconnectDecision::Retry {
                    attempt,
                    delay: Duration::from_secs(5)
                }
            );
        }
        assert_eq!(tracker.record_failure(), ReconnectDecision::GiveUp { attempts: 5 });

        tracker.record_success();
        assert_eq!(tracker.failures(), 0);
        assert!(matches!(tracker.record_failure(), ReconnectDecision::Retry { attempt: 1, .. }));
    }

    #[test]
    fn websocket_url_from_http_base() {
        assert_eq!(websocket_url("http://localhost:8080").unwrap(), "ws://localhost:8080/ws");
        assert_eq!(websocket_url("https://cfg.example.com/api").unwrap(), "wss://cfg.example.com/ws");
        assert!(websocket_url("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_server_fails_after_policy_attempts() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = SessionConfig::new(&format!("http://{addr}"), "shop", "prod", "i-1");
        config.reconnect = ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(10),
        };
        let mut handle = ClientSession::new(config).start();

        let terminated = loop {
            match handle.next_event().await {
                Some(SessionEvent::Terminated { error }) => break error,
                Some(_) => continue,
                None => panic!("event stream ended without termination"),
            }
        };
        assert!(terminated.is_some());
        assert_eq!(handle.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn disconnect_during_backoff_stops_the_task() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = SessionConfig::new(&format!("http://{addr}"), "shop", "prod", "i-1");
        config.reconnect = ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(60),
        };
        let mut handle = ClientSession::new(config).start();
        assert!(handle.wait_for_state(SessionState::Reconnecting).await);

        time::timeout(Duration::from_secs(5), handle.disconnect())
            .await
            .expect("disconnect must not wait for the backoff timer");
    }

    #[tokio::test]
    async fn cached_values_are_served_while_offline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let path = std::env::temp_dir().join(format!("config-center-session-{}.json", std::process::id()));
        ConfigCache::new(&path, "shop", "prod")
            .save(&ConfigState {
                snapshot_id: Some(4),
                version_number: Some(4),
                values: [("timeout".to_string(), "45".to_string())].into_iter().collect(),
            })
            .unwrap();

        let mut config = SessionConfig::new(&format!("http://{addr}"), "shop", "prod", "i-1");
        config.cache_file = Some(path.clone());
        config.reconnect = ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(60),
        };
        let session = ClientSession::new(config);
        assert_eq!(session.config().get("timeout").as_deref(), Some("45"));
        assert_eq!(session.config().get_or("retries", "3"), "3");

        let mut handle = session.start();
        assert!(handle.wait_for_state(SessionState::Reconnecting).await);
        assert_eq!(handle.config().version(), Some(4));
        handle.disconnect().await;
        let _ = std::fs::remove_file(&path);
    }
}
