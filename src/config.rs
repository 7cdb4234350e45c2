//! Persistent application configuration
//!
//! Stores probe target, cadence, and logging options in a JSON file at
//! `<data_dir>/udptester/config.json`. Raw values from disk (or CLI
//! overrides) are validated into [`SessionSettings`] before any socket
//! is opened.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use udptester_core::IdentityPolicy;

/// Interval bounds in milliseconds
pub const MIN_INTERVAL_MS: u64 = 50;
pub const MAX_INTERVAL_MS: u64 = 1000;

/// Payload ceiling keeps the probe inside a single ethernet frame
pub const MAX_PAYLOAD_BYTES: usize = 1400;

fn default_target() -> String {
    "192.168.0.255".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_payload() -> String {
    "FTEST".to_string()
}

fn default_broadcast() -> bool {
    true
}

fn default_identity() -> IdentityPolicy {
    IdentityPolicy::Mac
}

/// Persistent application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Probe target host (broadcast or unicast IP)
    #[serde(default = "default_target")]
    pub target: String,
    /// Probe target UDP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Probe interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Payload text echoed by devices
    #[serde(default = "default_payload")]
    pub payload: String,
    /// Number of probes per run; 0 means continuous
    #[serde(default)]
    pub iterations: u32,
    /// Send probes as broadcast datagrams
    #[serde(default = "default_broadcast")]
    pub broadcast: bool,
    /// How responding devices are keyed: "mac" or "ip"
    #[serde(default = "default_identity")]
    pub identity: IdentityPolicy,
    /// Directory for CSV session logs (None = logging off)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            port: default_port(),
            interval_ms: default_interval_ms(),
            payload: default_payload(),
            iterations: 0,
            broadcast: default_broadcast(),
            identity: default_identity(),
            log_dir: None,
        }
    }
}

/// Validation failure for a configuration value
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid target address '{0}'")]
    InvalidTarget(String),
    #[error("target port must be nonzero")]
    ZeroPort,
    #[error("interval {0} ms outside {MIN_INTERVAL_MS}-{MAX_INTERVAL_MS} ms")]
    IntervalOutOfRange(u64),
    #[error("payload is empty")]
    EmptyPayload,
    #[error("payload exceeds {MAX_PAYLOAD_BYTES} bytes")]
    PayloadTooLarge,
}

/// Validated settings for one probing session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub target: SocketAddr,
    pub interval: Duration,
    pub payload: String,
    /// None = continuous run
    pub iteration_limit: Option<u32>,
    pub broadcast: bool,
    pub identity: IdentityPolicy,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Config file path: `<data_dir>/udptester/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("udptester")
            .join("config.json")
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load() -> Self {
        let path = Self::path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Validate raw values into session settings
    pub fn validate(&self) -> Result<SessionSettings, ConfigError> {
        let ip: IpAddr = self
            .target
            .parse()
            .map_err(|_| ConfigError::InvalidTarget(self.target.clone()))?;
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&self.interval_ms) {
            return Err(ConfigError::IntervalOutOfRange(self.interval_ms));
        }
        if self.payload.is_empty() {
            return Err(ConfigError::EmptyPayload);
        }
        if self.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(ConfigError::PayloadTooLarge);
        }
        Ok(SessionSettings {
            target: SocketAddr::new(ip, self.port),
            interval: Duration::from_millis(self.interval_ms),
            payload: self.payload.clone(),
            iteration_limit: (self.iterations > 0).then_some(self.iterations),
            broadcast: self.broadcast,
            identity: self.identity,
            log_dir: self.log_dir.clone(),
        })
    }
}
