//! # JSON-RPC Channels Server
//!
//! Host networking layer for [`turul_channels_json_rpc`]: a WebSocket
//! transport for persistent connections, an HTTP POST bridge for one-shot
//! calls, and an in-memory channel layer for group notifications.
//!
//! ## Features
//! - One dispatcher shared by both transports, with per-method transport
//!   restrictions
//! - Bounded per-connection concurrency, optional in-order dispatch
//! - HTTP status codes derived from JSON-RPC error codes
//! - Group membership with automatic cleanup on disconnect

pub mod channel_layer;
pub mod config;
pub mod http;
pub mod server;
pub mod websocket;

// Re-export main types
pub use channel_layer::InMemoryChannelLayer;
pub use config::ServerConfig;
pub use http::JSON_RPC_CONTENT_TYPE;
pub use server::{JsonRpcServer, JsonRpcServerBuilder, RunningServer};

// Re-export foundational types
pub use turul_channels_json_rpc::{
    ChannelError, ChannelLayer, Dispatcher, MethodEntry, MethodKind, MethodRegistry, Notifier,
    ScopeId,
};

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
