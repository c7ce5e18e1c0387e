//! Client configuration
//!
//! Connection settings with sensible defaults and a consuming builder.

use crate::protocol::{DEFAULT_BUFFER_SIZE, MAX_REPLY_SIZE};
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// Default timeout for each send and each receive readiness wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Settings for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host name or IP address of the server
    pub host: String,

    /// TCP port of the server
    pub port: u16,

    /// Bound on connecting and on every send/receive wait
    pub timeout: Duration,

    /// Fixed size of the command send buffer
    pub send_buffer_capacity: usize,

    /// Initial size of the receive buffer (it grows as replies require)
    pub receive_buffer_capacity: usize,

    /// Largest reply the receive buffer may grow to hold
    pub max_reply_size: usize,

    /// Enable TCP keep-alive probes
    pub keepalive: bool,

    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            send_buffer_capacity: DEFAULT_BUFFER_SIZE,
            receive_buffer_capacity: DEFAULT_BUFFER_SIZE,
            max_reply_size: MAX_REPLY_SIZE,
            keepalive: true,
            nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Config for `host:port` with every other setting at its default.
    ///
    /// An empty host or a zero port falls back to the default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::builder().host(host).port(port).build()
    }

    /// Returns the server address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server host (empty keeps the default)
    pub fn host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if !host.is_empty() {
            self.config.host = host;
        }
        self
    }

    /// Set the server port (zero keeps the default)
    pub fn port(mut self, port: u16) -> Self {
        if port != 0 {
            self.config.port = port;
        }
        self
    }

    /// Set the send/receive timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the send/receive timeout in milliseconds
    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    /// Set the send buffer capacity (in bytes)
    pub fn send_buffer_capacity(mut self, size: usize) -> Self {
        self.config.send_buffer_capacity = size;
        self
    }

    /// Set the initial receive buffer capacity (in bytes)
    pub fn receive_buffer_capacity(mut self, size: usize) -> Self {
        self.config.receive_buffer_capacity = size;
        self
    }

    /// Set the maximum reply size (in bytes)
    pub fn max_reply_size(mut self, size: usize) -> Self {
        self.config.max_reply_size = size;
        self
    }

    pub fn keepalive(mut self, enabled: bool) -> Self {
        self.config.keepalive = enabled;
        self
    }

    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
