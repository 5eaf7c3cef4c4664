//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML configuration files (`onebot.toml`, `config.toml`)
//! - `yaml-config`: enables YAML configuration files (`onebot.yaml`, `onebot.yml`)
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Configuration passed to [`ConfigLoader::merge`]
//! 3. Main config file (`onebot.toml` / `onebot.yaml`)
//! 4. Profile-specific config file next to it (`onebot.{profile}.toml`)
//! 5. Environment variables (`ONEBOT_*`)
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `ONEBOT_` prefix with `__` as separator:
//!
//! - `ONEBOT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `ONEBOT_ONEBOT__HEARTBEAT__ENABLED=true` → `onebot.heartbeat.enabled = true`
//! - `ONEBOT_ONEBOT__AUTH__ACCESS_TOKEN=xxx` → `onebot.auth.access_token = "xxx"`
//!
//! # Example
//!
//! ```rust,ignore
//! use onebot_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/onebot.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AppConfig;

/// Default prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "ONEBOT_";

/// Environment variable selecting the profile.
pub const PROFILE_ENV: &str = "ONEBOT_PROFILE";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `dev` and `prod` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `ONEBOT_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    env_prefix: String,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            env_prefix: ENV_PREFIX.to_string(),
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    ///
    /// Without any search path the current directory and the user config
    /// directory (`~/.config/onebot` on Linux) are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("onebot"))
        } else {
            self
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Reads environment variables with another prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Uses `config` as the base that files and environment variables
    /// override.
    pub fn merge(mut self, config: AppConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<AppConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: AppConfig = figment.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            transports = config.onebot.comm_methods.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = self.config_file.as_deref() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = %self.env_prefix, "Loading environment variables");
            figment = figment.merge(Env::prefixed(&self.env_prefix).split("__"));
        }

        Ok(figment)
    }

    /// Merges a single config file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("onebot"));
        }
        paths
    }

    /// Searches `search_paths × base_names` for the first base file, then
    /// layers its profile variant on top.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let base_path = search_path.join(base_name);
                if !base_path.exists() {
                    continue;
                }
                info!(path = %base_path.display(), "Loading configuration file");
                figment = merge_fn(figment, &base_path);

                if let Some((stem, ext)) = base_name.rsplit_once('.') {
                    let profile_path =
                        search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                    if profile_path.exists() {
                        debug!(path = %profile_path.display(), "Loading profile-specific config");
                        figment = merge_fn(figment, &profile_path);
                    }
                }
                return (figment, true);
            }
        }
        (figment, false)
    }

    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["onebot.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["onebot.yaml", "onebot.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<AppConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from one file plus environment variables.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<AppConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new()
            .file("/nonexistent/onebot.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onebot.ini");
        std::fs::write(&path, "").unwrap();

        let result = ConfigLoader::new().file(&path).without_env().load();
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[onebot.heartbeat]
enabled = true
interval = 1000

[[onebot.comm_methods.http]]
port = 8080

[[onebot.comm_methods.ws_reverse]]
url = "ws://127.0.0.1:9000/onebot"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = ConfigLoader::new().file(&path).without_env().load().unwrap();
        assert!(config.onebot.heartbeat.enabled);
        assert_eq!(config.onebot.heartbeat.interval, 1000);
        assert_eq!(config.onebot.comm_methods.http[0].port, 8080);
        assert_eq!(config.onebot.comm_methods.http[0].host, "127.0.0.1");
        assert_eq!(config.onebot.comm_methods.ws_reverse[0].reconnect_interval, 5000);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("onebot.toml"),
            "[logging]\nlevel = \"debug\"\n\n[onebot.auth]\naccess_token = \"base\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("onebot.production.toml"),
            "[onebot.auth]\naccess_token = \"prod\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .search_path(dir.path())
            .profile("prod")
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.onebot.auth.token(), Some("prod"));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_overrides_merged_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("onebot.toml"), "[logging]\nlevel = \"warn\"\n").unwrap();

        let mut base = AppConfig::default();
        base.onebot.heartbeat.enabled = true;
        base.logging.level = LogLevel::Trace;

        let config = ConfigLoader::new()
            .merge(base)
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();
        assert!(config.onebot.heartbeat.enabled);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        // SAFETY: the variable names are unique to this test.
        unsafe {
            std::env::set_var("ONEBOT_LOADER_TEST_LOGGING__LEVEL", "error");
            std::env::set_var("ONEBOT_LOADER_TEST_ONEBOT__AUTH__ACCESS_TOKEN", "from-env");
        }

        let config = ConfigLoader::new()
            .search_path(dir.path())
            .env_prefix("ONEBOT_LOADER_TEST_")
            .load()
            .unwrap();

        unsafe {
            std::env::remove_var("ONEBOT_LOADER_TEST_LOGGING__LEVEL");
            std::env::remove_var("ONEBOT_LOADER_TEST_ONEBOT__AUTH__ACCESS_TOKEN");
        }

        assert_eq!(config.logging.level, LogLevel::Error);
        assert_eq!(config.onebot.auth.token(), Some("from-env"));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
        assert_eq!(Profile::parse("staging").to_string(), "staging");
    }
}
