//! The OneBot instance: lifecycle, event emission and heartbeat.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use onebot_runtime::OneBot;
//!
//! // Loads onebot.toml, initializes logging and validates the config
//! let onebot = OneBot::builder("my_platform").build()?;
//!
//! onebot.router().register("get_version", get_version)?;
//! onebot.run().await?;
//! ```

use std::sync::Arc;

use onebot_core::{
    ActionMux, BoxedComm, CommContext, Config, Event, EventBus, HeartbeatEvent, HttpConfig,
    HttpWebhookConfig, PushedEvent, TransportResult, WsConfig, WsReverseConfig,
};
use parking_lot::{Mutex, RwLock};
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::heartbeat::Heartbeat;
use crate::logging;

/// Lifecycle state of a [`OneBot`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// State shared with the heartbeat task.
struct Core {
    platform: Arc<str>,
    bus: Arc<EventBus>,
    self_id: RwLock<Option<String>>,
}

impl Core {
    fn push<E: Event>(&self, mut event: E) -> bool {
        if !event.try_fix_up(&self.platform) {
            warn!(
                event = %event.name(),
                self_id = %event.base().self_id,
                "Dropping event with blank self_id, type or detail_type"
            );
            return false;
        }

        let name = event.name();
        let pushed = match PushedEvent::new(name.as_str(), &event) {
            Ok(pushed) => pushed,
            Err(e) => {
                warn!(event = %name, error = %e, "Dropping event that failed to serialize");
                return false;
            }
        };

        let delivered = self.bus.broadcast(Arc::new(pushed));
        info!(event = %name, subscribers = delivered, "Event pushed");
        true
    }

    fn beat(&self, interval: u64) {
        let self_id = self.self_id.read().clone();
        match self_id {
            Some(self_id) => {
                self.push(HeartbeatEvent::new(self_id, interval));
            }
            None => debug!("Heartbeat skipped, self_id not set"),
        }
    }
}

/// What `start` created and `stop` tears down.
#[derive(Default)]
struct Running {
    comms: Vec<BoxedComm>,
    heartbeat: Option<Heartbeat>,
}

/// A OneBot implementation instance.
///
/// Owns the action router, which outlives transport restarts, and the
/// transports started from its [`Config`].
pub struct OneBot {
    core: Arc<Core>,
    config: Config,
    router: Arc<ActionMux>,
    state: Mutex<InstanceState>,
    lifecycle: tokio::sync::Mutex<Running>,
}

impl OneBot {
    /// Creates a stopped instance.
    ///
    /// `platform` names the implementation; it is stamped on every event
    /// and sent as `X-Impl`. It must not be blank.
    pub fn new(platform: impl Into<String>, config: Config) -> RuntimeResult<Self> {
        let platform = platform.into();
        if platform.trim().is_empty() {
            return Err(RuntimeError::InvalidPlatform(platform));
        }

        Ok(Self {
            core: Arc::new(Core {
                platform: Arc::from(platform),
                bus: Arc::new(EventBus::new()),
                self_id: RwLock::new(None),
            }),
            config,
            router: Arc::new(ActionMux::new()),
            state: Mutex::new(InstanceState::Stopped),
            lifecycle: tokio::sync::Mutex::new(Running::default()),
        })
    }

    /// Creates a builder that loads the configuration from files and
    /// environment variables.
    pub fn builder(platform: impl Into<String>) -> OneBotBuilder {
        OneBotBuilder::new(platform)
    }

    /// Creates an instance from a loaded configuration, initializing
    /// logging from it.
    pub fn from_config(platform: impl Into<String>, config: &AppConfig) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);
        validate_config(config)?;
        Self::new(platform, config.onebot.clone())
    }

    pub fn platform(&self) -> &str {
        &self.core.platform
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The action router. Handlers may be registered at any time.
    pub fn router(&self) -> &Arc<ActionMux> {
        &self.router
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.core.bus
    }

    pub fn state(&self) -> InstanceState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == InstanceState::Running
    }

    /// Sets the bot's own ID, used by the heartbeat.
    pub fn set_self_id(&self, self_id: impl Into<String>) {
        *self.core.self_id.write() = Some(self_id.into());
    }

    pub fn self_id(&self) -> Option<String> {
        self.core.self_id.read().clone()
    }

    /// Validates, stamps and broadcasts an event to every running transport.
    ///
    /// Returns `false` if the event was dropped: `self_id`, `type` or
    /// `detail_type` is blank, or it could not be serialized.
    pub fn push<E: Event>(&self, event: E) -> bool {
        self.core.push(event)
    }

    /// `(kind, endpoint)` of every running transport.
    pub async fn endpoints(&self) -> Vec<(&'static str, String)> {
        let running = self.lifecycle.lock().await;
        running
            .comms
            .iter()
            .map(|comm| (comm.kind(), comm.endpoint()))
            .collect()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts every configured transport and the heartbeat.
    ///
    /// Transports are started in the order http, http_webhook, ws,
    /// ws_reverse. A transport that fails to start is logged and left out;
    /// the instance still runs.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut running = self.lifecycle.lock().await;
        {
            let mut state = self.state.lock();
            if *state != InstanceState::Stopped {
                return Err(RuntimeError::AlreadyRunning);
            }
            *state = InstanceState::Starting;
        }

        info!(
            platform = %self.core.platform,
            transports = self.config.comm_methods.len(),
            "Starting OneBot instance"
        );

        running.comms = self.start_comms().await;

        if self.config.heartbeat.enabled && self.config.heartbeat.interval == 0 {
            warn!("Heartbeat enabled with a zero interval, not starting it");
        } else if self.config.heartbeat.enabled {
            let core = Arc::clone(&self.core);
            let interval = self.config.heartbeat.interval;
            running.heartbeat = Some(Heartbeat::spawn(self.config.heartbeat.interval(), move || {
                core.beat(interval)
            }));
        }

        *self.state.lock() = InstanceState::Running;
        info!(
            platform = %self.core.platform,
            transports = running.comms.len(),
            "OneBot instance started"
        );
        Ok(())
    }

    /// Stops every running transport and the heartbeat. No-op when stopped.
    pub async fn stop(&self) {
        let mut running = self.lifecycle.lock().await;
        {
            let mut state = self.state.lock();
            if *state == InstanceState::Stopped {
                debug!("OneBot instance is not running");
                return;
            }
            *state = InstanceState::Stopping;
        }

        info!(platform = %self.core.platform, "Stopping OneBot instance");

        if let Some(heartbeat) = running.heartbeat.take() {
            heartbeat.stop().await;
        }
        for comm in running.comms.drain(..) {
            comm.stop().await;
            debug!(kind = comm.kind(), endpoint = %comm.endpoint(), "Transport stopped");
        }

        *self.state.lock() = InstanceState::Stopped;
        info!(platform = %self.core.platform, "OneBot instance stopped");
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("OneBot instance is now running. Press Ctrl+C to stop.");

        let result = wait_for_shutdown().await;
        self.stop().await;
        result
    }

    /// Starts, waits for `shutdown`, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }

    fn comm_context(&self) -> CommContext {
        CommContext::new(
            Arc::clone(&self.core.platform),
            Arc::clone(&self.router),
            Arc::clone(&self.core.bus),
        )
        .with_access_token(self.config.auth.token())
    }

    async fn start_comms(&self) -> Vec<BoxedComm> {
        let methods = &self.config.comm_methods;
        let ctx = self.comm_context();
        let mut comms = Vec::with_capacity(methods.len());

        for config in &methods.http {
            let endpoint = config.bind_addr();
            collect(&mut comms, "http", &endpoint, start_http(config.clone(), ctx.clone()).await);
        }
        for config in &methods.http_webhook {
            collect(
                &mut comms,
                "http_webhook",
                &config.url,
                start_http_webhook(config.clone(), ctx.clone()).await,
            );
        }
        for config in &methods.ws {
            let endpoint = config.bind_addr();
            collect(&mut comms, "ws", &endpoint, start_ws(config.clone(), ctx.clone()).await);
        }
        for config in &methods.ws_reverse {
            collect(
                &mut comms,
                "ws_reverse",
                &config.url,
                start_ws_reverse(config.clone(), ctx.clone()).await,
            );
        }

        comms
    }
}

impl std::fmt::Debug for OneBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneBot")
            .field("platform", &self.core.platform)
            .field("state", &self.state())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

fn collect(comms: &mut Vec<BoxedComm>, kind: &str, endpoint: &str, result: TransportResult<BoxedComm>) {
    match result {
        Ok(comm) => {
            info!(kind, endpoint = %comm.endpoint(), "Transport started");
            comms.push(comm);
        }
        Err(e) => error!(kind, endpoint, error = %e, "Failed to start transport"),
    }
}

#[cfg(feature = "http-server")]
async fn start_http(config: HttpConfig, ctx: CommContext) -> TransportResult<BoxedComm> {
    let comm = onebot_transport::HttpComm::create_and_start(config, ctx).await?;
    Ok(Box::new(comm))
}

#[cfg(not(feature = "http-server"))]
async fn start_http(_config: HttpConfig, _ctx: CommContext) -> TransportResult<BoxedComm> {
    Err(onebot_core::TransportError::NotAvailable { transport: "http" })
}

#[cfg(feature = "http-webhook")]
async fn start_http_webhook(config: HttpWebhookConfig, ctx: CommContext) -> TransportResult<BoxedComm> {
    let comm = onebot_transport::HttpWebhookComm::create_and_start(config, ctx).await?;
    Ok(Box::new(comm))
}

#[cfg(not(feature = "http-webhook"))]
async fn start_http_webhook(_config: HttpWebhookConfig, _ctx: CommContext) -> TransportResult<BoxedComm> {
    Err(onebot_core::TransportError::NotAvailable { transport: "http_webhook" })
}

#[cfg(feature = "ws-server")]
async fn start_ws(config: WsConfig, ctx: CommContext) -> TransportResult<BoxedComm> {
    let comm = onebot_transport::WsComm::create_and_start(config, ctx).await?;
    Ok(Box::new(comm))
}

#[cfg(not(feature = "ws-server"))]
async fn start_ws(_config: WsConfig, _ctx: CommContext) -> TransportResult<BoxedComm> {
    Err(onebot_core::TransportError::NotAvailable { transport: "ws" })
}

#[cfg(feature = "ws-reverse")]
async fn start_ws_reverse(config: WsReverseConfig, ctx: CommContext) -> TransportResult<BoxedComm> {
    let comm = onebot_transport::WsReverseComm::create_and_start(config, ctx).await?;
    Ok(Box::new(comm))
}

#[cfg(not(feature = "ws-reverse"))]
async fn start_ws_reverse(_config: WsReverseConfig, _ctx: CommContext) -> TransportResult<BoxedComm> {
    Err(onebot_core::TransportError::NotAvailable { transport: "ws_reverse" })
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// OneBotBuilder
// =============================================================================

/// Builder for a [`OneBot`] whose configuration comes from a
/// [`ConfigLoader`].
///
/// ```rust,ignore
/// let onebot = OneBot::builder("my_platform")
///     .config_file("config/onebot.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct OneBotBuilder {
    platform: String,
    config_loader: ConfigLoader,
}

impl OneBotBuilder {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Base configuration that files and environment variables override.
    pub fn merge(mut self, config: AppConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, initializes logging and
    /// creates the instance.
    pub fn build(self) -> RuntimeResult<OneBot> {
        let config = self.config_loader.load()?;
        OneBot::from_config(self.platform, &config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onebot_core::{ActionResult, EventBase, EventSubscriber, Message, PrivateMessageEvent, Request};
    use serde_json::{Value, json};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Value>>,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&self, event: &Arc<PushedEvent>) {
            self.events.lock().push(event.value().clone());
        }
    }

    fn recorded(onebot: &OneBot) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        onebot.event_bus().subscribe(recorder.clone());
        recorder
    }

    #[test]
    fn test_rejects_blank_platform() {
        assert!(matches!(
            OneBot::new("  ", Config::default()),
            Err(RuntimeError::InvalidPlatform(_))
        ));
    }

    #[test]
    fn test_invalid_events_are_dropped() {
        let onebot = OneBot::new("test", Config::default()).unwrap();
        let recorder = recorded(&onebot);

        assert!(!onebot.push(EventBase::new("meta", "connect", "")));
        assert!(!onebot.push(EventBase::new("", "connect", "bot")));
        assert!(!onebot.push(EventBase::new("meta", " ", "bot")));
        assert!(recorder.events.lock().is_empty());

        assert!(onebot.push(EventBase::new("meta", "connect", "bot")));
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_push_stamps_platform_and_time() {
        let onebot = OneBot::new("qq", Config::default()).unwrap();
        let recorder = recorded(&onebot);

        let event = PrivateMessageEvent::new("bot", "m1", "u1", Message::from("hi"));
        assert!(onebot.push(event));

        let mut fixed = PrivateMessageEvent::new("bot", "m2", "u1", Message::from("hi"));
        fixed.time = Some(1_600_000_000);
        assert!(onebot.push(fixed));

        let events = recorder.events.lock();
        assert_eq!(events[0]["platform"], "qq");
        assert!(events[0]["time"].as_i64().unwrap() > 1_600_000_000);
        assert_eq!(events[0]["detail_type"], "private");
        assert_eq!(events[1]["time"], 1_600_000_000);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let onebot = OneBot::new("test", Config::default()).unwrap();
        assert_eq!(onebot.state(), InstanceState::Stopped);

        // Stopping a stopped instance is a no-op.
        onebot.stop().await;
        assert_eq!(onebot.state(), InstanceState::Stopped);

        onebot.start().await.unwrap();
        assert!(onebot.is_running());
        assert!(matches!(onebot.start().await, Err(RuntimeError::AlreadyRunning)));

        onebot.stop().await;
        assert_eq!(onebot.state(), InstanceState::Stopped);

        // Restartable.
        onebot.start().await.unwrap();
        onebot.stop().await;
    }

    #[tokio::test]
    async fn test_failed_transports_are_omitted() {
        let mut config = Config::default();
        config.comm_methods.http.push(HttpConfig::new("127.0.0.1", 0));
        config.comm_methods.http_webhook.push(HttpWebhookConfig::new("ftp://x"));
        config.comm_methods.ws_reverse.push(WsReverseConfig::new("http://x"));

        let onebot = OneBot::new("test", config).unwrap();
        onebot.start().await.unwrap();

        let endpoints = onebot.endpoints().await;
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].0, "http");

        onebot.stop().await;
        assert!(onebot.endpoints().await.is_empty());
        assert_eq!(onebot.event_bus().subscriber_count(), 0);
    }

    async fn get_version(_request: Request<()>) -> ActionResult<Value> {
        Ok(json!({"impl": "test", "version": "0.1.0", "onebot_version": "12"}))
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        let mut config = Config::default().with_access_token("secret");
        config.comm_methods.http.push(HttpConfig::new("127.0.0.1", 0));

        let onebot = OneBot::new("test", config).unwrap();
        onebot.router().register("get_version", get_version).unwrap();
        onebot.start().await.unwrap();

        let (_, endpoint) = onebot.endpoints().await.remove(0);
        let url = format!("http://{endpoint}/");
        let client = reqwest::Client::new();

        let response: Value = client
            .post(&url)
            .bearer_auth("secret")
            .json(&json!({"action": "get_version", "echo": "e"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["status"], "ok");
        assert_eq!(response["data"]["impl"], "test");
        assert_eq!(response["echo"], "e");

        assert!(onebot.push(EventBase::new("meta", "connect", "bot")));
        let response: Value = client
            .post(&url)
            .bearer_auth("secret")
            .json(&json!({"action": "get_latest_events", "params": {"limit": 0, "timeout": 0}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["data"].as_array().unwrap().len(), 1);
        assert_eq!(response["data"][0]["platform"], "test");

        onebot.stop().await;
    }

    #[tokio::test]
    async fn test_heartbeat_uses_self_id() {
        let onebot = OneBot::new("test", Config::default().with_heartbeat(20)).unwrap();
        let recorder = recorded(&onebot);
        onebot.start().await.unwrap();

        // No self_id yet, nothing is pushed.
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(recorder.events.lock().is_empty());

        onebot.set_self_id("bot");
        assert_eq!(onebot.self_id().as_deref(), Some("bot"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        onebot.stop().await;

        let events = recorder.events.lock();
        assert!(!events.is_empty());
        assert_eq!(events[0]["type"], "meta");
        assert_eq!(events[0]["detail_type"], "heartbeat");
        assert_eq!(events[0]["self_id"], "bot");
        assert_eq!(events[0]["interval"], 20);
    }
}
