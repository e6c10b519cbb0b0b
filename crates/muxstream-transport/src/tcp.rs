use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{BoxedIo, StreamConnector};

/// Default host used when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port used when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Connects to a TCP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn open(&self) -> Result<BoxedIo> {
        if self.host.is_empty() {
            return Err(TransportError::InvalidAddress {
                addr: self.peer(),
                reason: "host must not be empty".to_string(),
            });
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: self.peer(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!(peer = %self.peer(), "tcp connected");
        Ok(Box::new(stream))
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl StreamConnector for TcpConnector {
    fn connect(&self) -> BoxFuture<'_, Result<BoxedIo>> {
        Box::pin(self.open())
    }

    fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
