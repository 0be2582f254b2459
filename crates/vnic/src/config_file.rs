//! Configuration file support for vnicd
//!
//! Loads and validates the daemon configuration from TOML files.
//! Default location: /etc/vnic/vnicd.toml

use crate::controller::{DEFAULT_DEVICE_PREFIX, DEFAULT_MTU, JoinParams, MAX_MTU, MIN_MTU};
use crate::error::{Result, VnicError};
use crate::lifecycle::LifecycleConfig;
use crate::stack::FrameHandler;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use vnic_types::{InterfaceAddress, MacAddress, NetworkId};

/// Default configuration path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vnic/vnicd.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Background thread and driver timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSection {
    /// Sleep between background thread ticks, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Bounded wait on the shutdown signal at the top of each tick
    #[serde(default = "default_signal_check_timeout")]
    pub signal_check_timeout_ms: u64,

    /// How often vnicd samples interface state and rescans multicast groups
    #[serde(default = "default_node_tick")]
    pub node_tick_ms: u64,
}

/// Defaults applied to every joined interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSection {
    #[serde(default = "default_mtu")]
    pub default_mtu: u32,

    #[serde(default)]
    pub metric: u32,

    /// Device names are this prefix followed by the network id in hex
    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A network to join at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub id: NetworkId,
    pub mac: MacAddress,

    #[serde(default)]
    pub addresses: Vec<InterfaceAddress>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Overrides `interface.default_mtu`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// Complete vnicd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnicConfig {
    #[serde(default)]
    pub lifecycle: LifecycleSection,

    #[serde(default)]
    pub interface: InterfaceSection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

fn default_poll_interval() -> u64 {
    50
}

fn default_signal_check_timeout() -> u64 {
    0
}

fn default_node_tick() -> u64 {
    500
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

fn default_device_prefix() -> String {
    DEFAULT_DEVICE_PREFIX.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            signal_check_timeout_ms: default_signal_check_timeout(),
            node_tick_ms: default_node_tick(),
        }
    }
}

impl Default for InterfaceSection {
    fn default() -> Self {
        Self {
            default_mtu: default_mtu(),
            metric: 0,
            device_prefix: default_device_prefix(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl VnicConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    VnicError::Config(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(VnicError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VnicError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.lifecycle.poll_interval_ms)
    }

    pub fn signal_check_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle.signal_check_timeout_ms)
    }

    pub fn node_tick(&self) -> Duration {
        Duration::from_millis(self.lifecycle.node_tick_ms)
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            signal_check_timeout: self.signal_check_timeout(),
            poll_interval: self.poll_interval(),
        }
    }

    /// Join parameters for `network`, with the interface defaults applied
    pub fn join_params(&self, network: &NetworkConfig, frame_handler: FrameHandler) -> JoinParams {
        let mut params = JoinParams::new(network.id, network.mac, frame_handler);
        params.mtu = network.mtu.unwrap_or(self.interface.default_mtu);
        params.metric = self.interface.metric;
        params.device_prefix = self.interface.device_prefix.clone();
        params.friendly_name = network.friendly_name.clone();
        params.lifecycle = self.lifecycle_config();
        params
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.lifecycle.poll_interval_ms == 0 {
            return Err(VnicError::Config("poll_interval_ms must be > 0".to_string()));
        }

        if self.lifecycle.node_tick_ms == 0 {
            return Err(VnicError::Config("node_tick_ms must be > 0".to_string()));
        }

        check_mtu("default_mtu", self.interface.default_mtu)?;

        if self.interface.device_prefix.is_empty() {
            return Err(VnicError::Config("device_prefix cannot be empty".to_string()));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(VnicError::Config(format!(
                "logging level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.logging.level
            )));
        }

        let mut seen = BTreeSet::new();
        for network in &self.networks {
            if !seen.insert(network.id) {
                return Err(VnicError::Config(format!(
                    "network {} listed more than once",
                    network.id
                )));
            }
            if let Some(mtu) = network.mtu {
                check_mtu("network mtu", mtu)?;
            }
            if !network.mac.is_assignable() {
                return Err(VnicError::Config(format!(
                    "network {} has non-unicast mac {}",
                    network.id, network.mac
                )));
            }
        }

        Ok(())
    }
}

fn check_mtu(field: &str, mtu: u32) -> Result<()> {
    if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(VnicError::Config(format!(
            "{} must be {}-{}, got {}",
            field, MIN_MTU, MAX_MTU, mtu
        )));
    }
    Ok(())
}
