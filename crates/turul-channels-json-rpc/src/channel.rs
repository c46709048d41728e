//! Delivery primitive consumed from the host networking layer.

use async_trait::async_trait;

/// Connection identifier assigned by the transport.
pub type ConnectionId = String;

/// Errors that can occur while delivering to connections or groups
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
    #[error("No channel layer attached to connection {0}")]
    NoChannelLayer(String),
}

/// Group membership plus raw text delivery, provided by the host.
///
/// Delivery is fire-and-forget: a successful return means the text was
/// queued for the connection, not that the peer received it.
#[async_trait]
pub trait ChannelLayer: Send + Sync {
    /// Add a connection to a group. Adding twice is a no-op.
    async fn group_add(&self, group: &str, connection_id: &str) -> Result<(), ChannelError>;

    /// Remove a connection from a group. Unknown groups are ignored.
    async fn group_discard(&self, group: &str, connection_id: &str) -> Result<(), ChannelError>;

    /// Connections currently in a group.
    async fn group_members(&self, group: &str) -> Vec<ConnectionId>;

    /// Queue text for one connection.
    async fn send(&self, connection_id: &str, text: String) -> Result<(), ChannelError>;

    /// Queue text for every member of a group, returning how many
    /// connections it was queued for. An empty group is not an error.
    async fn group_send(&self, group: &str, text: String) -> Result<usize, ChannelError>;
}
