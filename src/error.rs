//! Error types for the transport, protocol and configuration layers
//!
//! None of these are fatal. `ConnectError` is handed back to the caller of
//! `connect`; `TransportError` is logged and then collapsed into a `false`
//! or `None` result by the transport.

use std::path::PathBuf;
use thiserror::Error;

/// Opening a serial port failed (bad name, busy, permission denied)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to open serial port {port}: {message}")]
pub struct ConnectError {
    /// Port identifier that was requested
    pub port: String,
    /// Message reported by the OS or driver
    pub message: String,
}

impl ConnectError {
    pub fn new(port: &str, message: impl Into<String>) -> Self {
        Self {
            port: port.to_string(),
            message: message.into(),
        }
    }
}

/// I/O failure on a link that was believed to be open
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("write to {port} failed: {source}")]
    Write {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read from {port} failed: {source}")]
    Read {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("closing {port} failed: {source}")]
    Close {
        port: String,
        #[source]
        source: std::io::Error,
    },
}

/// Loading a controller configuration file failed
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}
