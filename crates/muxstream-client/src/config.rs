use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::DEFAULT_CONNECT_TIMEOUT;
use crate::client::DEFAULT_REQUEST_TIMEOUT;

/// Errors loading a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    /// The selected transport was compiled out.
    #[error("transport {0} is not available in this build")]
    Unsupported(&'static str),
}

/// Which transport to dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Length-framed TCP.
    Tcp { host: String, port: u16 },
    /// Message-framed WebSocket.
    WebSocket { url: String },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Tcp {
            host: muxstream_transport::tcp::DEFAULT_HOST.to_string(),
            port: muxstream_transport::tcp::DEFAULT_PORT,
        }
    }
}

/// Serializable client settings.
///
/// ```json
/// { "transport": { "kind": "tcp", "host": "10.0.0.5", "port": 9000 },
///   "connect_timeout_ms": 5000, "request_timeout_ms": 10000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
