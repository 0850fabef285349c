use std::time::Duration;

use serde::Deserialize;
use wirecall_common::protocol::{Result, WirecallError};
use wirecall_common::transport::DEFAULT_MAX_MESSAGE_SIZE;

/// Client configuration.
///
/// Controls pooling, timeouts and batch concurrency.
///
/// # Default Configuration
///
/// - `max_connections`: 10
/// - `acquire_timeout_ms`: 30000 (30 seconds)
/// - `connect_timeout_ms`: 5000
/// - `io_timeout_ms`: 5000
/// - `batch_connections`: 4
/// - `pipeline_depth`: 8
/// - `max_message_size`: 100 MB
///
/// # Example
///
/// ```rust
/// use wirecall_client::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_max_connections(20)
///     .with_acquire_timeout_ms(60_000);
/// assert_eq!(config.max_connections, 20);
///
/// let from_json: ClientConfig = serde_json::from_str(r#"{"pipeline_depth": 2}"#).unwrap();
/// assert_eq!(from_json.pipeline_depth, 2);
/// assert_eq!(from_json.max_connections, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum number of pooled connections, leased and idle together
    pub max_connections: usize,
    /// Maximum time to wait for a free connection in milliseconds
    pub acquire_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Read/write timeout on established connections
    pub io_timeout_ms: u64,
    /// Connections a batch may use at once
    pub batch_connections: usize,
    /// Requests a batch worker sends before reading the first response
    pub pipeline_depth: usize,
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 30000,
            connect_timeout_ms: 5000,
            io_timeout_ms: 5000,
            batch_connections: 4,
            pipeline_depth: 8,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| WirecallError::Usage(format!("invalid client configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout_ms(mut self, acquire_timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = acquire_timeout_ms;
        self
    }

    pub fn with_connect_timeout_ms(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    pub fn with_io_timeout_ms(mut self, io_timeout_ms: u64) -> Self {
        self.io_timeout_ms = io_timeout_ms;
        self
    }

    pub fn with_batch_connections(mut self, batch_connections: usize) -> Self {
        self.batch_connections = batch_connections;
        self
    }

    pub fn with_pipeline_depth(mut self, pipeline_depth: usize) -> Self {
        self.pipeline_depth = pipeline_depth;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Rejects settings that would leave the client unable to make progress.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(WirecallError::Usage(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.batch_connections == 0 {
            return Err(WirecallError::Usage(
                "batch_connections must be at least 1".to_string(),
            ));
        }
        if self.pipeline_depth == 0 {
            return Err(WirecallError::Usage(
                "pipeline_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
