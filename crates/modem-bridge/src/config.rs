//! Bridge configuration.
//!
//! Loaded from a YAML file; every field has a default except the bridge host.
//!
//! ```yaml
//! ssh:
//!   host: 192.168.1.20
//!   username: pi
//!   identity_file: /home/pi/.ssh/id_ed25519
//! device:
//!   interface: usb0
//! api_key: change-me
//! sensitive_logs: false
//! ```
//!
//! Secrets may be supplied through the environment instead of the file:
//! `MODEM_BRIDGE_API_KEY` and `MODEM_BRIDGE_SSH_PASSWORD` win over file values.

use crate::channel::{ChannelOptions, DeviceHop};
use crate::ssh::SshTarget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable overriding [`BridgeConfig::api_key`].
pub const API_KEY_ENV: &str = "MODEM_BRIDGE_API_KEY";
/// Environment variable overriding [`SshConfig::password`].
pub const SSH_PASSWORD_ENV: &str = "MODEM_BRIDGE_SSH_PASSWORD";

/// Errors loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for this schema.
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A value is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge host session.
    pub ssh: SshConfig,
    /// Modem location behind the bridge host.
    pub device: DeviceConfig,
    /// Key push subscribers must present. Unset disables authentication.
    pub api_key: Option<String>,
    /// Log phone numbers and message bodies.
    pub sensitive_logs: bool,
}

/// Shell session to the bridge host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Bridge host name or address.
    pub host: String,
    /// SSH port of the bridge host.
    pub port: u16,
    /// Login user on the bridge host.
    pub username: String,
    /// Password, passed to ssh through `sshpass`.
    pub password: Option<String>,
    /// Private key for key-based login.
    pub identity_file: Option<PathBuf>,
    /// Handshake timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            host: String::new(),
            port: 22,
            username: "root".to_string(),
            password: None,
            identity_file: None,
            connect_timeout_secs: 10,
        }
    }
}

/// Modem side of the second hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Interface on the bridge host facing the modem.
    pub interface: String,
    /// File on the bridge host holding the modem address.
    pub address_file: String,
    /// Path of `cm` on the modem.
    pub cm_path: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let hop = DeviceHop::default();
        DeviceConfig {
            interface: "usb0".to_string(),
            address_file: hop.address_file,
            cm_path: hop.cm_path,
        }
    }
}

impl BridgeConfig {
    /// Load a YAML config file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env();
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse YAML text without touching the environment.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Apply `MODEM_BRIDGE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(SSH_PASSWORD_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, api_key: Option<String>, password: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.ssh.password = Some(password);
        }
    }

    /// Check required fields and log security-relevant settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh.host.is_empty() {
            return Err(ConfigError::Invalid("ssh.host is required".to_string()));
        }
        if self.ssh.username.is_empty() {
            return Err(ConfigError::Invalid("ssh.username must not be empty".to_string()));
        }
        if self.device.interface.is_empty() {
            return Err(ConfigError::Invalid("device.interface must not be empty".to_string()));
        }

        if self.api_key.as_deref().map_or(true, str::is_empty) {
            warn!("No API key configured: push subscribers are not authenticated");
        }
        if self.sensitive_logs {
            warn!("Sensitive logging is enabled: phone numbers and message bodies will be logged");
        }
        Ok(())
    }

    /// Connection parameters for the SSH transport.
    pub fn ssh_target(&self) -> SshTarget {
        SshTarget {
            host: self.ssh.host.clone(),
            port: self.ssh.port,
            username: self.ssh.username.clone(),
            password: self.ssh.password.clone(),
            identity_file: self.ssh.identity_file.clone(),
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
        }
    }

    /// Options for connecting the command channel.
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            interface: self.device.interface.clone(),
            hop: DeviceHop {
                address_file: self.device.address_file.clone(),
                cm_path: self.device.cm_path.clone(),
            },
            sensitive_logs: self.sensitive_logs,
        }
    }

    /// API key for push subscribers; an empty key counts as none.
    pub fn push_api_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.is_empty())
    }
}
