//! Echo Implementation Example
//!
//! A OneBot implementation for an imaginary platform: every message a
//! consumer sends with `send_message` comes straight back as a message
//! event, as if the recipient had replied with the same content.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-impl -- --self-id echo_bot
//! ```
//!
//! Without a configuration file the WebSocket server listens on
//! `127.0.0.1:6700` and the HTTP server on `127.0.0.1:5700`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Parser;
use onebot::core::{HttpConfig, WsConfig};
use onebot::prelude::*;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file; `onebot.toml` is searched for when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Platform name stamped on events.
    #[arg(long, default_value = "echo")]
    platform: String,

    /// The bot's own user ID.
    #[arg(long, default_value = "echo_bot")]
    self_id: String,
}

// ============================================================================
// Action Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct SendMessage {
    detail_type: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    message: Message,
}

/// State behind the action handlers.
struct Echo {
    onebot: Weak<OneBot>,
    self_id: String,
    next_message_id: AtomicU64,
}

impl Echo {
    fn version(&self) -> Value {
        let platform = self.onebot.upgrade().map(|ob| ob.platform().to_string());
        json!({
            "impl": platform,
            "version": env!("CARGO_PKG_VERSION"),
            "onebot_version": "12",
        })
    }

    fn status(&self) -> Value {
        let (platform, online) = match self.onebot.upgrade() {
            Some(ob) => (ob.platform().to_string(), ob.is_running()),
            None => (String::new(), false),
        };
        json!({
            "good": online,
            "bots": [{
                "self": {"platform": platform, "user_id": self.self_id},
                "online": online,
            }],
        })
    }

    fn self_info(&self) -> Value {
        json!({
            "user_id": self.self_id,
            "user_name": "echo",
            "user_displayname": "Echo",
        })
    }

    fn send_message(&self, params: SendMessage) -> ActionResult<Value> {
        let onebot = self
            .onebot
            .upgrade()
            .ok_or_else(|| ActionError::platform("implementation is shutting down"))?;

        let message = params.message.reduced();
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed).to_string();

        let pushed = match params.detail_type.as_str() {
            "private" => {
                let user_id = params
                    .user_id
                    .ok_or_else(|| ActionError::bad_param("user_id is required"))?;
                onebot.push(PrivateMessageEvent::new(
                    self.self_id.as_str(),
                    message_id.as_str(),
                    user_id,
                    message,
                ))
            }
            "group" => {
                let group_id = params
                    .group_id
                    .ok_or_else(|| ActionError::bad_param("group_id is required"))?;
                onebot.push(GroupMessageEvent::new(
                    self.self_id.as_str(),
                    message_id.as_str(),
                    group_id,
                    self.self_id.as_str(),
                    message,
                ))
            }
            other => {
                return Err(ActionError::bad_param(format!(
                    "unsupported detail_type: {other}"
                )));
            }
        };

        if !pushed {
            return Err(ActionError::logic("echo event was dropped"));
        }

        Ok(json!({ "message_id": message_id, "time": unix_now() }))
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn register_actions(onebot: &Arc<OneBot>, self_id: &str) -> Result<()> {
    let echo = Arc::new(Echo {
        onebot: Arc::downgrade(onebot),
        self_id: self_id.to_string(),
        next_message_id: AtomicU64::new(1),
    });
    let router = onebot.router();

    let e = echo.clone();
    router.register(names::GET_VERSION, move |_: Request<()>| {
        let data = e.version();
        async move { Ok::<_, ActionError>(data) }
    })?;

    let e = echo.clone();
    router.register(names::GET_STATUS, move |_: Request<()>| {
        let data = e.status();
        async move { Ok::<_, ActionError>(data) }
    })?;

    let e = echo.clone();
    router.register(names::GET_SELF_INFO, move |_: Request<()>| {
        let data = e.self_info();
        async move { Ok::<_, ActionError>(data) }
    })?;

    let e = echo;
    router.register(names::SEND_MESSAGE, move |req: Request<SendMessage>| {
        let result = e.send_message(req.params);
        async move { result }
    })?;

    // Extended action, named `<platform>_<name>`
    let ping = ActionName::extended(onebot.platform(), "ping");
    router.register(ping, |_: Request<()>| async {
        Ok::<_, ActionError>(json!("pong"))
    })?;

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn default_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.onebot = Config::default().with_heartbeat(5000);
    config.onebot.comm_methods.http.push(HttpConfig::default());
    config.onebot.comm_methods.ws.push(WsConfig::default());
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = OneBot::builder(&args.platform).merge(default_config());
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let onebot = Arc::new(builder.build()?);

    onebot.set_self_id(&args.self_id);
    register_actions(&onebot, &args.self_id)?;

    info!(
        platform = %onebot.platform(),
        actions = ?onebot.router().supported_actions(),
        "Echo implementation ready"
    );

    onebot.run().await?;
    Ok(())
}
