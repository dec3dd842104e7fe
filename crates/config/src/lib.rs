#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for pkgd
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (/etc/pkgd/pkgd.toml)
//! - Environment variables
//! - CLI flags (applied by the daemon)

use pkgd_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Default location of the system configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pkgd/pkgd.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub transaction: TransactionConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Service front-end configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Exit after this long with no clients and no work; 0 disables
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Exit after this long with clients connected but no work; 0 disables
    #[serde(default = "default_locked_idle_timeout")]
    pub locked_idle_timeout_secs: u64,
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

/// Transaction pipeline deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    /// How long finished operations stay attachable
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

/// Package database lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
}

/// Grant an action requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grant {
    /// Any known caller
    None,
    /// Superuser, an elevated uid, or an answered challenge
    Elevated,
    /// Nobody
    Forbidden,
}

/// Authorization policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Challenge non-elevated callers instead of denying them
    #[serde(default = "default_interactive")]
    pub interactive: bool,
    #[serde(default = "default_elevated_uids")]
    pub elevated_uids: Vec<u32>,
    #[serde(default = "default_actions")]
    pub actions: BTreeMap<String, Grant>,
}

/// Reference engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// JSON catalog holding repositories and packages
    pub catalog: Option<PathBuf>,
    /// Packages that may never be removed
    #[serde(default)]
    pub protected: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

// Default implementations

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            idle_timeout_secs: default_idle_timeout(),
            locked_idle_timeout_secs: default_locked_idle_timeout(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            auth_timeout_secs: default_auth_timeout(),
            lock_timeout_secs: default_lock_timeout(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            retention_secs: default_retention(),
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            audit_capacity: default_audit_capacity(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            interactive: default_interactive(),
            elevated_uids: default_elevated_uids(),
            actions: default_actions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions for serde
fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/pkgd.sock")
}

fn default_idle_timeout() -> u64 {
    20
}

fn default_locked_idle_timeout() -> u64 {
    600 // 10 minutes
}

fn default_max_request_bytes() -> usize {
    1024 * 1024
}

fn default_auth_timeout() -> u64 {
    120
}

fn default_lock_timeout() -> u64 {
    600
}

fn default_backoff_initial() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    5_000
}

fn default_retention() -> u64 {
    300
}

fn default_reaper_interval() -> u64 {
    30
}

fn default_audit_capacity() -> usize {
    256
}

fn default_interactive() -> bool {
    true
}

fn default_elevated_uids() -> Vec<u32> {
    vec![0]
}

fn default_actions() -> BTreeMap<String, Grant> {
    [
        ("query", Grant::None),
        ("install", Grant::Elevated),
        ("remove", Grant::Elevated),
        ("update", Grant::Elevated),
        ("reinstall", Grant::Elevated),
        ("downgrade", Grant::Elevated),
        ("undo", Grant::Elevated),
        ("repos", Grant::Elevated),
    ]
    .into_iter()
    .map(|(action, grant)| (action.to_string(), grant))
    .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TransactionConfig {
    #[must_use]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    #[must_use]
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    #[must_use]
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Path::new(DEFAULT_CONFIG_PATH);

        if config_path.exists() {
            Self::load_from_file(config_path).await
        } else {
            tracing::debug!(path = DEFAULT_CONFIG_PATH, "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // PKGD_SOCKET
        if let Ok(socket) = std::env::var("PKGD_SOCKET") {
            if socket.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "PKGD_SOCKET".to_string(),
                    value: socket,
                }
                .into());
            }
            self.service.socket_path = PathBuf::from(socket);
        }

        // PKGD_LOCK_TIMEOUT
        if let Some(secs) = parse_env_u64("PKGD_LOCK_TIMEOUT")? {
            self.transaction.lock_timeout_secs = secs;
        }

        // PKGD_AUTH_TIMEOUT
        if let Some(secs) = parse_env_u64("PKGD_AUTH_TIMEOUT")? {
            self.transaction.auth_timeout_secs = secs;
        }

        // PKGD_IDLE_TIMEOUT
        if let Some(secs) = parse_env_u64("PKGD_IDLE_TIMEOUT")? {
            self.service.idle_timeout_secs = secs;
        }

        // PKGD_LOG_LEVEL
        if let Ok(level) = std::env::var("PKGD_LOG_LEVEL") {
            self.logging.level = level;
        }

        // PKGD_LOG_JSON
        if let Ok(json) = std::env::var("PKGD_LOG_JSON") {
            self.logging.json = match json.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "PKGD_LOG_JSON".to_string(),
                        value: json,
                    }
                    .into())
                }
            };
        }

        self.validate()
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when a deadline is zero or the backoff
    /// bounds are inverted.
    pub fn validate(&self) -> Result<(), Error> {
        let tx = &self.transaction;
        if tx.lock_timeout_secs == 0 {
            return Err(invalid("transaction.lock_timeout_secs must be greater than 0"));
        }
        if tx.auth_timeout_secs == 0 {
            return Err(invalid("transaction.auth_timeout_secs must be greater than 0"));
        }
        if tx.backoff_initial_ms == 0 || tx.backoff_initial_ms > tx.backoff_max_ms {
            return Err(invalid(
                "transaction.backoff_initial_ms must be in 1..=backoff_max_ms",
            ));
        }
        if self.lock.audit_capacity == 0 {
            return Err(invalid("lock.audit_capacity must be greater than 0"));
        }
        Ok(())
    }

    /// Grant required for an authorization action, if the action is known
    #[must_use]
    pub fn grant_for(&self, action: &str) -> Option<Grant> {
        self.auth.actions.get(action).copied()
    }
}

fn parse_env_u64(var: &str) -> Result<Option<u64>, Error> {
    match std::env::var(var) {
        Ok(value) => value.parse().map(Some).map_err(|_| {
            ConfigError::InvalidValue {
                field: var.to_string(),
                value,
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

fn invalid(message: &str) -> Error {
    ConfigError::Invalid {
        message: message.to_string(),
    }
    .into()
}
