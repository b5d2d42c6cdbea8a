//! Relay Config - settings for the gateway and runner
//!
//! Defaults, then an optional JSON file, then `TASKRELAY_*` environment
//! overrides. CLI flags are applied last by the binary.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default config file name
pub const RELAY_CONFIG_FILE: &str = "taskrelay.json";

const ENV_HOST: &str = "TASKRELAY_HOST";
const ENV_PORT: &str = "TASKRELAY_PORT";
const ENV_LOG_LEVEL: &str = "TASKRELAY_LOG_LEVEL";
const ENV_AGENT: &str = "TASKRELAY_AGENT";

/// taskrelay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    /// Address the HTTP gateway binds to
    pub host: String,

    /// Port the HTTP gateway listens on
    pub port: u16,

    /// Upper bound between two log snapshots copied into a status record
    pub publish_interval_ms: u64,

    /// Completed records older than this are evicted
    pub retention_ttl_secs: u64,

    /// Maximum number of records kept in the status store
    pub max_entries: usize,

    /// How often the retention sweep runs
    pub cleanup_interval_secs: u64,

    /// Cap for long-poll waits requested by clients
    pub max_wait_ms: u64,

    /// Console log level (EnvFilter directive)
    pub log_level: String,

    /// Built-in agent used by the binary (`echo` or `shell`)
    pub agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            publish_interval_ms: 100,
            retention_ttl_secs: 3600,
            max_entries: 1000,
            cleanup_interval_secs: 60,
            max_wait_ms: 30_000,
            log_level: "info".to_string(),
            agent: "echo".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Load from an explicit file, or `taskrelay.json` in the working
    /// directory when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(RELAY_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `TASKRELAY_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.is_empty()) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.is_empty()) {
            self.port = port
                .parse()
                .map_err(|_| Error::Config(format!("{} is not a valid port: {}", ENV_PORT, port)))?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        if let Some(agent) = lookup(ENV_AGENT).filter(|v| !v.is_empty()) {
            self.agent = agent;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.publish_interval_ms == 0 {
            return Err(Error::Config("publishIntervalMs must be greater than 0".into()));
        }
        if self.max_entries == 0 {
            return Err(Error::Config("maxEntries must be greater than 0".into()));
        }
        if self.max_wait_ms == 0 {
            return Err(Error::Config("maxWaitMs must be greater than 0".into()));
        }
        Ok(())
    }

    // ========================================================================
    // Derived values
    // ========================================================================

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `host` only accepts local connections
    pub fn is_loopback(&self) -> bool {
        self.host.eq_ignore_ascii_case("localhost")
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn retention_ttl(&self) -> Duration {
        Duration::from_secs(self.retention_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 5001);
        assert_eq!(config.publish_interval(), Duration::from_millis(100));
        assert_eq!(config.bind_addr(), "127.0.0.1:5001");
        assert!(config.is_loopback());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 8080, "maxEntries": 5}}"#).unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_entries, 5);
        assert_eq!(config.publish_interval_ms, 100);
        assert_eq!(config.agent, "echo");
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = RelayConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TASKRELAY_PORT", "9000"),
            ("TASKRELAY_AGENT", "shell"),
            ("TASKRELAY_HOST", ""),
        ]
        .into_iter()
        .collect();

        let mut config = RelayConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.agent, "shell");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_env_port() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_env(|key| (key == "TASKRELAY_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = RelayConfig {
            publish_interval_ms: 0,
            ..RelayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_wait() {
        let config = RelayConfig {
            max_wait_ms: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_is_loopback() {
        for host in ["127.0.0.1", "::1", "localhost"] {
            let config = RelayConfig {
                host: host.to_string(),
                ..RelayConfig::default()
            };
            assert!(config.is_loopback(), "{}", host);
        }
        for host in ["0.0.0.0", "192.168.1.10", "example.com"] {
            let config = RelayConfig {
                host: host.to_string(),
                ..RelayConfig::default()
            };
            assert!(!config.is_loopback(), "{}", host);
        }
    }
}
