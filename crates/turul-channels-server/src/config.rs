//! Server configuration

use std::net::SocketAddr;

/// Configuration for the JSON-RPC channels server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listen address, `None` disables the WebSocket transport
    pub websocket_address: Option<SocketAddr>,
    /// HTTP listen address, `None` disables the HTTP bridge
    pub http_address: Option<SocketAddr>,
    /// Path the HTTP bridge answers on
    pub http_path: String,
    /// Maximum HTTP request body size
    pub max_body_size: usize,
    /// Messages dispatched concurrently per WebSocket connection
    pub max_in_flight: usize,
    /// Dispatch WebSocket messages one at a time so responses keep
    /// request order
    pub ordered_dispatch: bool,
    /// Outbound queue length per WebSocket connection
    pub channel_buffer_size: usize,
    /// Groups every WebSocket connection joins for its lifetime
    pub connection_groups: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            websocket_address: Some(SocketAddr::from(([127, 0, 0, 1], 8000))),
            http_address: Some(SocketAddr::from(([127, 0, 0, 1], 8001))),
            http_path: "/".to_string(),
            max_body_size: 1024 * 1024, // 1MB
            max_in_flight: 64,
            ordered_dispatch: false,
            channel_buffer_size: 1000,
            connection_groups: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Reject settings the transports cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.websocket_address.is_none() && self.http_address.is_none() {
            return Err("at least one of the WebSocket or HTTP listeners must be enabled".into());
        }
        if !self.http_path.starts_with('/') {
            return Err(format!("http_path must start with '/': {}", self.http_path));
        }
        if self.max_in_flight == 0 {
            return Err("max_in_flight must be at least 1".into());
        }
        if self.channel_buffer_size == 0 {
            return Err("channel_buffer_size must be at least 1".into());
        }
        Ok(())
    }
}
