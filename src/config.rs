//! Configuration module for the deimos engine

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration for a deimos server process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bind endpoint: a UNIX socket path or `tcp://host:port`
    pub bind: String,

    /// Directory holding the result store and model snapshots
    pub data_dir: PathBuf,

    /// Approved-alias whitelist file; built-in defaults when absent
    pub alias_file: Option<PathBuf>,

    /// Shared secret required in every request when set
    pub secret: Option<String>,

    /// Passphrase for result-store encryption
    pub encrypt_key: Option<String>,

    /// Key for the detached integrity signature
    pub integrity_key: Option<String>,

    /// Default probability threshold for module suggestions
    pub suggestion_threshold: f64,

    /// Maximum accepted request size in bytes
    pub max_request_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            bind: "/tmp/deimos.sock".to_string(),
            data_dir: home.join(".deimos").join("db"),
            alias_file: None,
            secret: None,
            encrypt_key: None,
            integrity_key: None,
            suggestion_threshold: 0.2,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            crate::EngineError::Config(format!("failed to read config file: {}", e))
        })?;

        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| crate::EngineError::Config(format!("failed to parse TOML: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the default location (`~/.deimos.toml`),
    /// falling back to defaults when no file exists
    pub fn load_default_config() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let path = home.join(".deimos.toml");

        if path.exists() {
            if let Ok(config) = Self::from_toml_file(&path) {
                log::info!("loaded config from {}", path.display());
                return config;
            }
        }

        Self::default()
    }

    /// Apply environment overrides.
    ///
    /// `DEIMOS_DB_SOCKET`, `DEIMOS_IPC_SECRET`, `DEIMOS_ENCRYPT_KEY` and
    /// `DEIMOS_HMAC_KEY` take precedence over file values, matching how
    /// short-lived per-request deployments inject their settings.
    pub fn apply_env(mut self) -> Self {
        if let Ok(bind) = std::env::var("DEIMOS_DB_SOCKET") {
            self.bind = bind;
        }
        if let Ok(secret) = std::env::var("DEIMOS_IPC_SECRET") {
            self.secret = Some(secret);
        }
        if let Ok(key) = std::env::var("DEIMOS_ENCRYPT_KEY") {
            self.encrypt_key = Some(key);
        }
        if let Ok(key) = std::env::var("DEIMOS_HMAC_KEY") {
            self.integrity_key = Some(key);
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.bind.is_empty() {
            return Err(crate::EngineError::Config(
                "bind endpoint cannot be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.suggestion_threshold) {
            return Err(crate::EngineError::Config(format!(
                "suggestion threshold {} outside [0, 1]",
                self.suggestion_threshold
            )));
        }

        if self.max_request_bytes == 0 {
            return Err(crate::EngineError::Config(
                "max request size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
