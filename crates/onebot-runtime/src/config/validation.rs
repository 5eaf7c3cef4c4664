//! Configuration validation utilities.

use onebot_core::{CommMethods, Config};
use onebot_transport::validate::{is_valid_http_url, is_valid_ws_url};

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &AppConfig) -> ConfigResult<()> {
    validate_onebot_config(&config.onebot)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_onebot_config(config: &Config) -> ConfigResult<()> {
    if config.heartbeat.enabled && config.heartbeat.interval == 0 {
        return Err(ConfigError::validation(
            "Heartbeat interval must be greater than 0",
        ));
    }

    validate_comm_methods(&config.comm_methods)
}

fn validate_comm_methods(methods: &CommMethods) -> ConfigResult<()> {
    for http in &methods.http {
        validate_port(http.port)?;
    }
    for webhook in &methods.http_webhook {
        validate_url(&webhook.url, is_valid_http_url, "http or https")?;
    }
    for ws in &methods.ws {
        validate_port(ws.port)?;
    }
    for reverse in &methods.ws_reverse {
        validate_url(&reverse.url, is_valid_ws_url, "ws or wss")?;
        if reverse.reconnect_interval == 0 {
            return Err(ConfigError::validation(
                "Reverse WebSocket reconnect interval must be greater than 0",
            ));
        }
    }
    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when output is \"file\"",
        ));
    }
    Ok(())
}

fn validate_url(url: &str, is_valid: fn(&str) -> bool, schemes: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::invalid_url(url, "URL is empty"));
    }
    if !is_valid(url) {
        return Err(ConfigError::invalid_url(
            url,
            format!("must be an absolute {schemes} URL with a host"),
        ));
    }
    Ok(())
}

fn validate_port(port: u16) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(())
}
