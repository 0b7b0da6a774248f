//! Session configuration

use config::{Config, ConfigError, Environment, File};
use obd_protocol::{ObdProtocol, PortConfiguration};
use serde::{Deserialize, Serialize};

/// Base name of the optional configuration file (`obd.toml`, `obd.yaml`, ...)
pub const CONFIG_FILE: &str = "obd";

/// Prefix of environment overrides, e.g. `OBD_PORT__DEVICE=/dev/ttyUSB0`
pub const ENV_PREFIX: &str = "OBD";

/// Everything needed to open a diagnostic session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial device and per-command timeout
    pub port: PortConfiguration,

    /// Bus protocol to pin; automatic detection when unset
    pub protocol: Option<ObdProtocol>,

    /// Maximum log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: PortConfiguration::default(),
            protocol: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl SessionConfig {
    /// Load from `obd.*` in the working directory, then `OBD_*` variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from the named file (extension optional), then `OBD_*` variables
    pub fn load_from(name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
