//! Configuration types for endpoints and servers.

use std::time::Duration;

/// Shortest accepted `on_manager` period.
pub const MIN_MANAGER_INTERVAL: Duration = Duration::from_millis(1);

/// Per-endpoint options shared by clients and sessions.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Period of the `on_manager` hook while connected.
    pub manager_interval: Duration,
    /// Read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Enable TCP_NODELAY (disable Nagle's algorithm).
    pub no_delay: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            manager_interval: Duration::from_secs(2),
            read_buffer_size: 8192,
            no_delay: false,
        }
    }
}

impl EndpointConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `on_manager` period. Periods below [`MIN_MANAGER_INTERVAL`]
    /// are raised to it.
    pub fn manager_interval(mut self, interval: Duration) -> Self {
        self.manager_interval = interval.max(MIN_MANAGER_INTERVAL);
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }
}

/// Configuration for a [`TcpServer`](crate::TcpServer).
#[derive(Clone, Debug)]
pub struct TcpServerConfig {
    /// Address to bind to.
    pub bind_address: String,
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
    /// Options applied to every accepted session.
    pub endpoint: EndpointConfig,
}

impl TcpServerConfig {
    /// Create a new server configuration.
    pub fn new(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
            endpoint: EndpointConfig::default(),
        }
    }

    /// Get the bind address as "address:port".
    pub fn bind_addr(&self) -> String {
        if self.bind_address.contains(':') {
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }

    /// Set the options applied to accepted sessions.
    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the `on_manager` period of accepted sessions.
    pub fn manager_interval(mut self, interval: Duration) -> Self {
        self.endpoint = self.endpoint.manager_interval(interval);
        self
    }

    /// Enable or disable TCP_NODELAY on accepted sessions.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.endpoint.no_delay = enabled;
        self
    }
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self::new("0.0.0.0", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        assert_eq!(TcpServerConfig::new("127.0.0.1", 9000).bind_addr(), "127.0.0.1:9000");
        assert_eq!(TcpServerConfig::new("::1", 9000).bind_addr(), "[::1]:9000");
    }

    #[test]
    fn test_zero_manager_interval_is_clamped() {
        let config = EndpointConfig::new().manager_interval(Duration::ZERO);
        assert_eq!(config.manager_interval, MIN_MANAGER_INTERVAL);

        let server = TcpServerConfig::default().manager_interval(Duration::ZERO);
        assert_eq!(server.endpoint.manager_interval, MIN_MANAGER_INTERVAL);
    }

    #[test]
    fn test_endpoint_defaults() {
        let config = EndpointConfig::default();
        assert_eq!(config.manager_interval, Duration::from_secs(2));
        assert_eq!(config.read_buffer_size, 8192);
        assert!(!config.no_delay);
    }
}
