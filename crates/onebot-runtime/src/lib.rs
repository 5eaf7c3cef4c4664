//! OneBot Runtime - lifecycle layer for OneBot implementations.
//!
//! This crate provides:
//! - The instance core ([`OneBot`]): starts the configured transports,
//!   pushes events to them and sends heartbeats
//! - Configuration loading and validation ([`config`])
//! - Logging setup ([`logging`])
//!
//! # Transports
//!
//! Which transports can be started depends on the enabled cargo features
//! (all by default): `http-server`, `http-webhook`, `ws-server`,
//! `ws-reverse`. A configured transport whose feature is disabled is
//! logged and skipped.
//!
//! ```ignore
//! use onebot_runtime::OneBot;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let onebot = OneBot::builder("my_platform").build()?;
//!     onebot.router().register("get_version", get_version)?;
//!
//!     // Run until Ctrl+C
//!     onebot.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
mod heartbeat;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{AppConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{InstanceState, OneBot, OneBotBuilder};

// Re-export tracing for use by implementations
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
