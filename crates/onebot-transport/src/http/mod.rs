//! HTTP transports.
//!
//! This module provides the HTTP server (actions in, events polled) and the
//! HTTP webhook client (events pushed).

#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::HttpComm;

#[cfg(feature = "http-webhook")]
mod webhook;
#[cfg(feature = "http-webhook")]
pub use webhook::HttpWebhookComm;
