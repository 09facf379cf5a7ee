//! Configuration system for Waypost.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $WAYPOST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/waypost/config.toml
//!   3. ~/.config/waypost/config.toml

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::PROTOCOL_VERSION;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the listening socket on.
    pub listen_addr: String,
    /// TCP port for endpoint connections. 0 = OS-assigned.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Minimum protocol version accepted in an Advertise.
    pub min_version: u32,
    /// How long a first-arriving endpoint waits for its peer.
    pub rendezvous_timeout_ms: u64,
    /// If true, the challenge proof must echo the issued nonce.
    pub verify_proof: bool,
    /// If true, a correlation entry is removed once its peer consumes it.
    pub evict_on_consume: bool,
}

impl ProtocolConfig {
    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_millis(self.rendezvous_timeout_ms)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_version: PROTOCOL_VERSION,
            rendezvous_timeout_ms: 2000,
            verify_proof: false,
            evict_on_consume: false,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("waypost")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MediatorConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MediatorConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("WAYPOST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MediatorConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply WAYPOST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override resolution proper, split from the process-environment
    /// reader so it can be driven with an arbitrary lookup. Unparseable
    /// values leave the existing setting untouched.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("WAYPOST_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(v) = lookup("WAYPOST_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Some(v) = lookup("WAYPOST_PROTOCOL__MIN_VERSION") {
            if let Ok(n) = v.parse() {
                self.protocol.min_version = n;
            }
        }
        if let Some(v) = lookup("WAYPOST_PROTOCOL__RENDEZVOUS_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.protocol.rendezvous_timeout_ms = ms;
            }
        }
        if let Some(v) = lookup("WAYPOST_PROTOCOL__VERIFY_PROOF") {
            self.protocol.verify_proof = v == "true" || v == "1";
        }
        if let Some(v) = lookup("WAYPOST_PROTOCOL__EVICT_ON_CONSUME") {
            self.protocol.evict_on_consume = v == "true" || v == "1";
        }
    }
}
