//! # OneBot
//!
//! A toolkit for building OneBot 12 implementations: expose a platform's
//! actions to consumers and push its events to them over HTTP, HTTP
//! webhooks, WebSocket and reverse WebSocket.
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────────────────────┐
//!  consumer ◀──────────▶│ transports (onebot-transport)│
//!                       └──────┬───────────────▲───────┘
//!                   Request    │               │ PushedEvent
//!                       ┌──────▼──────┐  ┌─────┴──────┐
//!                       │  ActionMux  │  │  EventBus  │◀── OneBot::push
//!                       └──────┬──────┘  └────────────┘
//!                              ▼
//!                           handlers
//! ```
//!
//! - **OneBot**: instance lifecycle, event emission, heartbeat
//! - **ActionMux**: typed action handlers behind a name-keyed registry
//! - **Transports**: one adapter per configured communication method
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use onebot::prelude::*;
//!
//! #[derive(Deserialize)]
//! struct SendMessage {
//!     user_id: String,
//!     message: Message,
//! }
//!
//! async fn send_message(req: Request<SendMessage>) -> ActionResult<serde_json::Value> {
//!     let text = req.params.message.extract_text();
//!     // deliver `text` to `req.params.user_id` on the platform ...
//!     Ok(serde_json::json!({ "message_id": "1", "time": 0 }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let onebot = OneBot::builder("my_platform").build()?;
//!     onebot.router().register(names::SEND_MESSAGE, send_message)?;
//!     onebot.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default), `yaml-config`: configuration file formats
//! - `json-log`: JSON log output
//! - `http-server`, `http-webhook`, `ws-server`, `ws-reverse`: transports,
//!   all enabled by `full-transport` (default)

pub use onebot_core as core;
pub use onebot_runtime as runtime;
pub use onebot_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use onebot::prelude::*;
/// ```
pub mod prelude {
    // Instance - main entry point
    pub use onebot_runtime::{OneBot, RuntimeError, RuntimeResult};

    // Actions - for writing handlers
    pub use onebot_core::{
        ActionError, ActionMux, ActionName, ActionResult, Request, Response, RetCode, names,
    };

    // Events and messages - for pushing events
    pub use onebot_core::{
        Event, EventBase, GroupMessageEvent, HeartbeatEvent, Message, MessageEvent, MetaEvent,
        NoticeEvent, PrivateMessageEvent, RequestEvent, Segment,
    };

    // Configuration
    pub use onebot_core::Config;
    pub use onebot_runtime::{AppConfig, ConfigLoader};

    pub use serde::{Deserialize, Serialize};
}
