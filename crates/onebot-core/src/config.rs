//! Instance configuration types.
//!
//! These are plain serde structs; loading and validation live in the
//! runtime crate.
//!
//! # Example Configuration
//!
//! ```toml
//! [onebot.heartbeat]
//! enabled = true
//! interval = 5000
//!
//! [onebot.auth]
//! access_token = "secret"
//!
//! [[onebot.comm_methods.http]]
//! host = "127.0.0.1"
//! port = 5700
//!
//! [[onebot.comm_methods.http_webhook]]
//! url = "http://127.0.0.1:8080/onebot"
//! timeout = 5000
//!
//! [[onebot.comm_methods.ws]]
//! host = "127.0.0.1"
//! port = 6700
//!
//! [[onebot.comm_methods.ws_reverse]]
//! url = "ws://127.0.0.1:8080/onebot"
//! reconnect_interval = 5000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of one OneBot instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Heartbeat meta events.
    pub heartbeat: HeartbeatConfig,
    /// Access control.
    pub auth: AuthConfig,
    /// Transports to start.
    pub comm_methods: CommMethods,
}

impl Config {
    /// Sets the access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.auth.access_token = Some(token.into());
        self
    }

    /// Enables the heartbeat with an interval in milliseconds.
    pub fn with_heartbeat(mut self, interval: u64) -> Self {
        self.heartbeat = HeartbeatConfig {
            enabled: true,
            interval,
        };
        self
    }
}

// =============================================================================
// Heartbeat / Auth
// =============================================================================

/// Heartbeat configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Interval in milliseconds.
    pub interval: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 5000,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token required from consumers and sent to consumers.
    ///
    /// `None` or an empty string disables the check.
    pub access_token: Option<String>,
}

impl AuthConfig {
    /// Returns the token if one is set and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

// =============================================================================
// Transports
// =============================================================================

/// All configured transports, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommMethods {
    pub http: Vec<HttpConfig>,
    pub http_webhook: Vec<HttpWebhookConfig>,
    pub ws: Vec<WsConfig>,
    pub ws_reverse: Vec<WsReverseConfig>,
}

impl CommMethods {
    /// Total number of configured transports.
    pub fn len(&self) -> usize {
        self.http.len() + self.http_webhook.len() + self.ws.len() + self.ws_reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// HTTP server transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 5700)
    }
}

impl HttpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP webhook transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpWebhookConfig {
    /// Consumer URL events are POSTed to.
    pub url: String,
    /// Request timeout in milliseconds; 0 disables it.
    pub timeout: u64,
    /// Signing secret.
    pub secret: String,
}

impl Default for HttpWebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: 5000,
            secret: String::new(),
        }
    }
}

impl HttpWebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the request timeout in milliseconds.
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// The request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(self.timeout))
    }
}

/// WebSocket server transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 6700)
    }
}

impl WsConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reverse WebSocket transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsReverseConfig {
    /// Consumer URL to connect to.
    pub url: String,
    /// Delay before reconnecting, in milliseconds.
    pub reconnect_interval: u64,
}

impl Default for WsReverseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_interval: 5000,
        }
    }
}

impl WsReverseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the reconnect interval in milliseconds.
    pub fn with_reconnect_interval(mut self, interval: u64) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = serde_json::from_value(json!({
            "auth": {"access_token": "t"},
            "comm_methods": {
                "http": [{"port": 8080}],
                "ws_reverse": [{"url": "ws://127.0.0.1:9000"}],
            }
        }))
        .unwrap();

        assert!(!config.heartbeat.enabled);
        assert_eq!(config.auth.token(), Some("t"));
        assert_eq!(config.comm_methods.http[0].bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.comm_methods.ws_reverse[0].reconnect_interval, 5000);
        assert_eq!(config.comm_methods.len(), 2);
    }

    #[test]
    fn test_empty_token_disables_auth() {
        let auth = AuthConfig {
            access_token: Some(String::new()),
        };
        assert_eq!(auth.token(), None);
    }

    #[test]
    fn test_webhook_timeout() {
        assert_eq!(HttpWebhookConfig::new("http://x").timeout(), Some(Duration::from_secs(5)));
        assert_eq!(HttpWebhookConfig::new("http://x").with_timeout(0).timeout(), None);
    }
}
