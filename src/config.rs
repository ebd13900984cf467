//! Runtime configuration for the offline worker
//!
//! A single `Config` is built at startup and shared by the fetch strategy, the
//! lifecycle hooks and the reminder service. It is read from a JSON file; every
//! field has a default so a missing file yields a working configuration.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "offline-worker.json";

/// Errors raised while loading or validating the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for `Config`
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the worker cannot run with
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version token appended to partition names
    pub version: String,
    /// The application's own origin (scheme, host, port)
    pub origin: String,
    /// URL substrings that are always forwarded live, never cached
    pub bypass_patterns: Vec<String>,
    /// Cross-origin hosts whose responses may be cached
    pub cacheable_hosts: Vec<String>,
    /// Path of the root document served when a navigation fails offline
    pub fallback_path: String,
    /// Paths (relative to `origin`) or absolute URLs precached on install
    pub static_assets: Vec<String>,
    /// Store root; defaults to the XDG cache directory
    pub store_dir: Option<PathBuf>,
    /// Network requests slower than this count as failures
    pub network_timeout_secs: u64,
    pub reminders: ReminderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            origin: "http://localhost:8080".to_string(),
            bypass_patterns: vec!["script.google.com".to_string()],
            cacheable_hosts: vec![
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
            ],
            fallback_path: "/".to_string(),
            static_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
            ],
            store_dir: None,
            network_timeout_secs: 10,
            reminders: ReminderConfig::default(),
        }
    }
}

/// Settings for the reminder wake-up loop and the notifications it raises
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Seconds between wake-ups; must stay below one minute
    pub wake_interval_secs: u64,
    /// Notification title
    pub title: String,
    /// Keep the notification on screen until the user acts on it
    pub require_interaction: bool,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            wake_interval_secs: 30,
            title: "Daily log".to_string(),
            require_interaction: true,
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, falling back to defaults if the
    /// file does not exist
    ///
    /// # Returns
    /// * `Ok(Config)` - validated configuration
    /// * `Err(ConfigError)` - unreadable, unparseable or invalid file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path.as_ref()) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::from_json(&contents)
    }

    /// Parses and validates a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the rest of the crate relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.is_empty() {
            return Err(ConfigError::Invalid {
                field: "version",
                reason: "must not be empty".to_string(),
            });
        }
        if !self
            .version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(ConfigError::Invalid {
                field: "version",
                reason: format!("'{}' may only contain [A-Za-z0-9._-]", self.version),
            });
        }

        self.origin_url()?;

        if !self.fallback_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "fallback_path",
                reason: "must start with '/'".to_string(),
            });
        }

        // Wake-ups must be finer than the one-minute rule granularity
        if !(1..=59).contains(&self.reminders.wake_interval_secs) {
            return Err(ConfigError::Invalid {
                field: "reminders.wake_interval_secs",
                reason: format!("{} is outside 1..=59", self.reminders.wake_interval_secs),
            });
        }

        Ok(())
    }

    /// Parsed application origin
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin).map_err(|e| ConfigError::Invalid {
            field: "origin",
            reason: e.to_string(),
        })?;
        if !url.has_host() {
            return Err(ConfigError::Invalid {
                field: "origin",
                reason: format!("'{}' has no host", self.origin),
            });
        }
        Ok(url)
    }

    /// Resolves a configured asset path against the origin
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, ConfigError> {
        let origin = self.origin_url()?;
        origin.join(path_or_url).map_err(|e| ConfigError::Invalid {
            field: "static_assets",
            reason: format!("'{}': {}", path_or_url, e),
        })
    }

    /// URL of the root document used as the navigation fallback
    pub fn fallback_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.fallback_path)
    }

    /// Directory the disk store lives in
    ///
    /// Uses `store_dir` if set, otherwise `~/.cache/offline-worker/` on Linux
    /// or the platform equivalent. Returns `None` if no home directory exists.
    pub fn store_root(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Some(dir.clone());
        }
        let project_dirs = ProjectDirs::from("", "", "offline-worker")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.reminders.wake_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.version, "v1");
        assert_eq!(config.reminders.wake_interval_secs, 30);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config::load(temp_dir.path().join("absent.json")).expect("Should load defaults");
        assert_eq!(config.origin, Config::default().origin);
    }

    #[test]
    fn test_partial_json_keeps_defaults_for_missing_fields() {
        let config = Config::from_json(r#"{ "version": "v7", "origin": "https://app.example" }"#)
            .expect("Should parse");
        assert_eq!(config.version, "v7");
        assert_eq!(config.origin, "https://app.example");
        assert_eq!(config.fallback_path, "/");
        assert!(!config.cacheable_hosts.is_empty());
    }

    #[test]
    fn test_load_reads_file_from_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cfg.json");
        fs::write(&path, r#"{ "version": "2024.1", "reminders": { "wake_interval_secs": 15 } }"#)
            .expect("Should write config");

        let config = Config::load(&path).expect("Should load config");
        assert_eq!(config.version, "2024.1");
        assert_eq!(config.reminders.wake_interval_secs, 15);
        assert_eq!(config.reminders.title, "Daily log");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let result = Config::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_version_with_path_separator_is_rejected() {
        let result = Config::from_json(r#"{ "version": "../v1" }"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_empty_version_is_rejected() {
        assert!(Config::from_json(r#"{ "version": "" }"#).is_err());
    }

    #[test]
    fn test_relative_origin_is_rejected() {
        let result = Config::from_json(r#"{ "origin": "/just/a/path" }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "origin", .. })));
    }

    #[test]
    fn test_wake_interval_of_a_minute_or_more_is_rejected() {
        let result = Config::from_json(r#"{ "reminders": { "wake_interval_secs": 60 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_joins_paths_and_keeps_absolute_urls() {
        let config = Config::default();
        assert_eq!(
            config.resolve("/app.js").unwrap().as_str(),
            "http://localhost:8080/app.js"
        );
        assert_eq!(
            config
                .resolve("https://fonts.googleapis.com/css?family=Inter")
                .unwrap()
                .as_str(),
            "https://fonts.googleapis.com/css?family=Inter"
        );
    }

    #[test]
    fn test_store_root_prefers_explicit_dir() {
        let config = Config {
            store_dir: Some(PathBuf::from("/tmp/ow-store")),
            ..Default::default()
        };
        assert_eq!(config.store_root(), Some(PathBuf::from("/tmp/ow-store")));
    }
}
