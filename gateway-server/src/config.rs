//! # Configuration management
//!
//! Settings are resolved in two layers: an optional TOML file, then
//! `BACKEND_*` environment variable overrides (case-insensitive), matching
//! the original service's `core/config.py` resolution order. The result is
//! validated once at startup (`main.rs`) before the server is built.
//!
//! ## Environment variables
//!
//! - `BACKEND_DATABASE_URL` — persistence DSN (SQLite default).
//! - `BACKEND_API_KEY_SECRET` — seed for provider-credential encryption.
//! - `BACKEND_BACKUP_FILE` — snapshot path.
//! - `BACKEND_REQUEST_TIMEOUT_SECONDS` — default adapter timeout (float ≥ 0.1).
//! - `BACKEND_HEALTH_CHECK_ENABLED` — bool.
//! - `BACKEND_HEALTH_CHECK_INTERVAL_SECONDS` — float ≥ 1.0.
//! - `BACKEND_HEALTH_CHECK_TIMEOUT_SECONDS` — float ≥ 0.1.
//! - `BACKEND_HEALTH_CHECK_FAILURE_THRESHOLD` — integer ≥ 1.

use serde::{Deserialize, Serialize};
use std::env;

fn default_database_url() -> String {
    "sqlite://gateway.db?mode=rwc".to_string()
}

fn default_api_key_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_backup_file() -> String {
    "backup.json".to_string()
}

fn default_request_timeout_seconds() -> f64 {
    30.0
}

fn default_health_check_interval_seconds() -> f64 {
    60.0
}

fn default_health_check_timeout_seconds() -> f64 {
    5.0
}

fn default_health_check_failure_threshold() -> u32 {
    3
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Resolved gateway settings (§6 Configuration surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_api_key_secret")]
    pub api_key_secret: String,
    #[serde(default = "default_backup_file")]
    pub backup_file: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: f64,

    #[serde(default)]
    pub health_check_enabled: bool,
    #[serde(default = "default_health_check_interval_seconds")]
    pub health_check_interval_seconds: f64,
    #[serde(default = "default_health_check_timeout_seconds")]
    pub health_check_timeout_seconds: f64,
    #[serde(default = "default_health_check_failure_threshold")]
    pub health_check_failure_threshold: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            api_key_secret: default_api_key_secret(),
            backup_file: default_backup_file(),
            request_timeout_seconds: default_request_timeout_seconds(),
            health_check_enabled: true,
            health_check_interval_seconds: default_health_check_interval_seconds(),
            health_check_timeout_seconds: default_health_check_timeout_seconds(),
            health_check_failure_threshold: default_health_check_failure_threshold(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file (defaults are used for any
    /// field the file omits or if the file doesn't exist), then applies
    /// `BACKEND_*` environment overrides.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) if std::path::Path::new(path).exists() => {
                let body = std::fs::read_to_string(path)?;
                toml::from_str(&body)?
            }
            _ => Settings::default(),
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Overlays `BACKEND_*` environment variables onto the current settings.
    /// Unset variables leave the existing value untouched.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = env::var("BACKEND_HOST") {
            self.host = v;
        }
        if let Ok(v) = env::var("BACKEND_PORT") {
            self.port = v.parse()?;
        }
        if let Ok(v) = env::var("BACKEND_DATABASE_URL") {
            self.database_url = v;
        }
        if let Ok(v) = env::var("BACKEND_API_KEY_SECRET") {
            self.api_key_secret = v;
        }
        if let Ok(v) = env::var("BACKEND_BACKUP_FILE") {
            self.backup_file = v;
        }
        if let Ok(v) = env::var("BACKEND_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = v.parse()?;
        }
        if let Ok(v) = env::var("BACKEND_HEALTH_CHECK_ENABLED") {
            self.health_check_enabled = parse_bool(&v)?;
        }
        if let Ok(v) = env::var("BACKEND_HEALTH_CHECK_INTERVAL_SECONDS") {
            self.health_check_interval_seconds = v.parse()?;
        }
        if let Ok(v) = env::var("BACKEND_HEALTH_CHECK_TIMEOUT_SECONDS") {
            self.health_check_timeout_seconds = v.parse()?;
        }
        if let Ok(v) = env::var("BACKEND_HEALTH_CHECK_FAILURE_THRESHOLD") {
            self.health_check_failure_threshold = v.parse()?;
        }
        Ok(())
    }

    /// Validates range constraints from §6; called once at startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be nonzero");
        }
        if self.request_timeout_seconds < 0.1 {
            anyhow::bail!("request_timeout_seconds must be >= 0.1");
        }
        if self.health_check_interval_seconds < 1.0 {
            anyhow::bail!("health_check_interval_seconds must be >= 1.0");
        }
        if self.health_check_timeout_seconds < 0.1 {
            anyhow::bail!("health_check_timeout_seconds must be >= 0.1");
        }
        if self.health_check_failure_threshold < 1 {
            anyhow::bail!("health_check_failure_threshold must be >= 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.request_timeout_seconds)
    }

    pub fn health_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.health_check_interval_seconds)
    }

    pub fn health_check_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.health_check_timeout_seconds)
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean value '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut settings = Settings::default();
        settings.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_sub_minimum_timeout() {
        let mut settings = Settings::default();
        settings.request_timeout_seconds = 0.01;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn env_overrides_take_precedence_over_file_defaults() {
        std::env::set_var("BACKEND_HEALTH_CHECK_FAILURE_THRESHOLD", "7");
        let mut settings = Settings::default();
        settings.apply_env_overrides().unwrap();
        assert_eq!(settings.health_check_failure_threshold, 7);
        std::env::remove_var("BACKEND_HEALTH_CHECK_FAILURE_THRESHOLD");
    }
}
