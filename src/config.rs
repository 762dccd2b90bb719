//! Service configuration.
//!
//! Read from `$CONTACT_IDENTITY_CONFIG` or `~/.contact-identity/config.json`.
//! Every field has a default, so a missing file is not an error. Two
//! environment variables override the file: `CONTACT_IDENTITY_DB` (database
//! path) and `PORT` (port of the bind address).

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::{OpenOptions, DEFAULT_BUSY_TIMEOUT_MS};
use crate::identity::RetryPolicy;

pub const CONFIG_ENV: &str = "CONTACT_IDENTITY_CONFIG";
pub const DATABASE_ENV: &str = "CONTACT_IDENTITY_DB";
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// SQLite file. `None` means `~/.contact-identity/contacts.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pooled database connections.
    #[serde(default = "default_connections")]
    pub connections: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_max_attempts() -> u32 {
    3
}

fn default_connections() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            bind_address: default_bind_address(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_attempts: default_max_attempts(),
            connections: default_connections(),
        }
    }
}

impl Config {
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }

    /// Apply `CONTACT_IDENTITY_DB` / `PORT` style overrides.
    pub fn apply_overrides(&mut self, database: Option<String>, port: Option<String>) {
        if let Some(path) = database.filter(|p| !p.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(port) = port.and_then(|p| p.trim().parse::<u16>().ok()) {
            let host = self
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.bind_address = format!("{host}:{port}");
        }
    }
}

/// Default config location: `~/.contact-identity/config.json`.
fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".contact-identity").join("config.json"))
}

/// Load configuration from disk plus environment overrides.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;

    let mut config = if path.exists() {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
        Config::from_json_str(&content)?
    } else {
        log::info!("No config at {}; using defaults", path.display());
        Config::default()
    };

    config.apply_overrides(std::env::var(DATABASE_ENV).ok(), std::env::var(PORT_ENV).ok());

    if config.connections == 0 {
        return Err("connections must be at least 1".to_string());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_camel_case_fields() {
        let config = Config::from_json_str(
            r#"{"databasePath": "/tmp/c.db", "bindAddress": "127.0.0.1:8080",
                "busyTimeoutMs": 250, "maxAttempts": 5, "connections": 2}"#,
        )
        .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/c.db")));
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.open_options().busy_timeout, Duration::from_millis(250));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.connections, 2);
    }

    #[test]
    fn test_malformed_json_is_error() {
        let err = Config::from_json_str("{not json").unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn test_port_override_keeps_host() {
        let mut config = Config {
            bind_address: "127.0.0.1:8080".to_string(),
            ..Config::default()
        };
        config.apply_overrides(None, Some("4000".to_string()));
        assert_eq!(config.bind_address, "127.0.0.1:4000");
    }

    #[test]
    fn test_bad_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(Some("  ".to_string()), Some("not-a-port".to_string()));
        assert_eq!(config, Config::default());

        config.apply_overrides(Some("/data/contacts.db".to_string()), None);
        assert_eq!(config.database_path, Some(PathBuf::from("/data/contacts.db")));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let config = Config {
            max_attempts: 0,
            ..Config::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
