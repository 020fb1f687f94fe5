//! Controller settings loaded from an optional TOML file
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! timeout_ms = 1000
//! wait_ready = true
//!
//! [blink]
//! count = 10
//! delay_ms = 1000
//! ```
//!
//! Every key is optional. The file is only read, never written.

use crate::error::ConfigError;
use crate::serial::{DEFAULT_BAUD, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Port to connect to when none is given on the command line
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
    /// Wait for the firmware's ready byte after connecting
    pub wait_ready: bool,
    pub blink: BlinkSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlinkSettings {
    pub count: u32,
    pub delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            wait_ready: false,
            blink: BlinkSettings::default(),
        }
    }
}

impl Default for BlinkSettings {
    fn default() -> Self {
        Self {
            count: 10,
            delay_ms: 1000,
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the contents of `path` when given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BlinkSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
