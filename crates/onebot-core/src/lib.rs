//! # OneBot Core
//!
//! Protocol model and routing for building OneBot implementations.
//!
//! An implementation exposes *actions* (request/response calls made by a
//! consumer) and emits *events* (messages, notices, requests and meta
//! events). This crate holds everything that does not touch the network:
//!
//! - **Action protocol**: request/response envelopes, return codes and the
//!   JSON/MessagePack codec ([`Request`], [`Response`], [`RetCode`], [`codec`])
//! - **Action router**: typed handler registry with type-erased dispatch
//!   ([`ActionMux`])
//! - **Event model**: parent-in-child event structs ([`Event`], [`EventBase`])
//! - **Event bus**: fan-out to every running transport ([`EventBus`])
//! - **Message model**: segments and messages ([`Segment`], [`Message`])
//! - **Transport contract**: [`Comm`], [`CommContext`] and per-transport config
//!
//! ## Data Flow
//!
//! ```text
//!              ┌───────────┐   Request<Value>   ┌───────────┐
//! consumer ───▶│ transport │───────────────────▶│ ActionMux │──▶ handler
//!          ◀───│ (Comm)    │◀───────────────────│           │
//!              └───────────┘   Response<Value>  └───────────┘
//!                    ▲
//!                    │ PushedEvent
//!              ┌───────────┐
//!              │ EventBus  │◀── OneBot::push(event)
//!              └───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use onebot_core::{ActionMux, ActionResult, Request};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct GetUserInfo {
//!     user_id: String,
//! }
//!
//! async fn get_user_info(req: Request<GetUserInfo>) -> ActionResult<serde_json::Value> {
//!     Ok(serde_json::json!({ "user_id": req.params.user_id, "nickname": "alice" }))
//! }
//!
//! let mux = ActionMux::new();
//! mux.register("get_user_info", get_user_info)?;
//! ```

pub mod action;
pub mod comm;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod segment;

pub use action::{
    ActionHandler, ActionMux, ActionName, RawRequest, RawResponse, Request, Response, RetCode,
    RetCodeBand, Status, codec, names,
};
pub use comm::{BoxedComm, Comm, CommContext, Subscription};
pub use config::{
    AuthConfig, CommMethods, Config, HeartbeatConfig, HttpConfig, HttpWebhookConfig, WsConfig,
    WsReverseConfig,
};
pub use error::{
    ActionError, ActionResult, CodecError, CodecResult, RouterError, TransportError,
    TransportResult,
};
pub use event::{
    Event, EventBase, EventBus, EventSubscriber, GroupMessageEvent, HeartbeatEvent, MessageEvent,
    MetaEvent, NoticeEvent, PrivateMessageEvent, PushedEvent, RequestEvent, SubscriptionId,
};
pub use message::Message;
pub use segment::Segment;

/// Protocol version implemented by this crate.
pub const ONEBOT_VERSION: &str = "12";

// Re-export async_trait for implementing [`Comm`].
pub use async_trait::async_trait;
