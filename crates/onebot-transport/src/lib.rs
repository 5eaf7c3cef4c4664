//! # OneBot Transport
//!
//! The four OneBot 12 communication methods, each implementing
//! [`onebot_core::Comm`].
//!
//! ## Features
//!
//! - `http-server`: HTTP server, actions in and events polled
//! - `http-webhook`: HTTP webhook, events pushed to the consumer
//! - `ws-server`: WebSocket server
//! - `ws-reverse`: reverse WebSocket client with reconnection
//! - `full` (default): all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  onebot-runtime     │  (lifecycle, starts adapters from config)
//! ├─────────────────────┤
//! │  onebot-transport   │  <- This crate (adapters)
//! ├─────────────────────┤
//! │  onebot-core        │  (router, event bus, Comm trait)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! | Adapter | Actions | Events |
//! |---------|---------|--------|
//! | `HttpComm` | `POST` JSON or MessagePack | `get_latest_events` long-poll |
//! | `HttpWebhookComm` | quick actions in the reply | `POST` to the consumer |
//! | `WsComm` | text or binary frames | text frames to the latest connection |
//! | `WsReverseComm` | text or binary frames | text frames while connected |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use onebot_core::{ActionMux, CommContext, EventBus, WsConfig};
//! use onebot_transport::WsComm;
//!
//! let ctx = CommContext::new("my_platform", Arc::new(ActionMux::new()), Arc::new(EventBus::new()));
//! let comm = WsComm::create_and_start(WsConfig::default(), ctx).await?;
//! // ...
//! comm.stop().await;
//! ```

pub mod auth;
pub mod frame;
mod task;
pub mod validate;

#[cfg(any(feature = "http-server", feature = "http-webhook"))]
pub mod http;

#[cfg(any(feature = "ws-server", feature = "ws-reverse"))]
pub mod websocket;

#[cfg(feature = "http-server")]
pub use http::HttpComm;

#[cfg(feature = "http-webhook")]
pub use http::HttpWebhookComm;

#[cfg(feature = "ws-server")]
pub use websocket::WsComm;

#[cfg(feature = "ws-reverse")]
pub use websocket::WsReverseComm;
