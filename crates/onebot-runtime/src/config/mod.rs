//! Configuration for OneBot implementations.
//!
//! This module provides layered loading (defaults, TOML/YAML files,
//! environment variables, programmatic overrides) and validation of the
//! instance and logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{AppConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig};
pub use validation::validate_config;
