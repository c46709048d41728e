//! In-process channel layer: group membership and per-connection outboxes.
//!
//! Every live WebSocket connection owns a bounded outbox. Responses and
//! pushed notifications for that connection are queued here and written by
//! the connection's single writer task.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use turul_channels_json_rpc::{ChannelError, ChannelLayer, ConnectionId};

pub type ConnectionsMap = HashMap<ConnectionId, mpsc::Sender<String>>;
pub type GroupsMap = HashMap<String, HashSet<ConnectionId>>;

/// [`ChannelLayer`] backed by tokio channels, for a single process.
#[derive(Debug)]
pub struct InMemoryChannelLayer {
    connections: RwLock<ConnectionsMap>,
    groups: RwLock<GroupsMap>,
    buffer_size: usize,
}

impl InMemoryChannelLayer {
    pub fn new() -> Self {
        Self::with_buffer_size(1000)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Create the outbox for a new connection. Registering an id again
    /// replaces its outbox.
    pub async fn register(&self, connection_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let mut connections = self.connections.write().await;
        if connections.insert(connection_id.to_string(), tx).is_some() {
            warn!(connection_id, "connection registered twice, replacing outbox");
        }
        debug!(connection_id, total = connections.len(), "registered connection");
        rx
    }

    /// Drop a connection's outbox and remove it from every group.
    pub async fn unregister(&self, connection_id: &str) {
        self.connections.write().await.remove(connection_id);

        let mut groups = self.groups.write().await;
        groups.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
        debug!(connection_id, "unregistered connection");
    }

    pub async fn is_connected(&self, connection_id: &str) -> bool {
        self.connections.read().await.contains_key(connection_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Groups a connection currently belongs to, sorted.
    pub async fn groups_of(&self, connection_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .read()
            .await
            .iter()
            .filter(|(_, members)| members.contains(connection_id))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    async fn sender(&self, connection_id: &str) -> Option<mpsc::Sender<String>> {
        self.connections.read().await.get(connection_id).cloned()
    }
}

impl Default for InMemoryChannelLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelLayer for InMemoryChannelLayer {
    async fn group_add(&self, group: &str, connection_id: &str) -> Result<(), ChannelError> {
        let mut groups = self.groups.write().await;
        if groups
            .entry(group.to_string())
            .or_default()
            .insert(connection_id.to_string())
        {
            debug!(group, connection_id, "joined group");
        }
        Ok(())
    }

    async fn group_discard(&self, group: &str, connection_id: &str) -> Result<(), ChannelError> {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            members.remove(connection_id);
            if members.is_empty() {
                groups.remove(group);
            }
            debug!(group, connection_id, "left group");
        }
        Ok(())
    }

    async fn group_members(&self, group: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .groups
            .read()
            .await
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    async fn send(&self, connection_id: &str, text: String) -> Result<(), ChannelError> {
        let sender = self
            .sender(connection_id)
            .await
            .ok_or_else(|| ChannelError::ConnectionNotFound(connection_id.to_string()))?;
        sender
            .send(text)
            .await
            .map_err(|_| ChannelError::ConnectionClosed(connection_id.to_string()))
    }

    async fn group_send(&self, group: &str, text: String) -> Result<usize, ChannelError> {
        let targets: Vec<(ConnectionId, mpsc::Sender<String>)> = {
            let groups = self.groups.read().await;
            let connections = self.connections.read().await;
            match groups.get(group) {
                Some(members) => members
                    .iter()
                    .filter_map(|id| connections.get(id).map(|tx| (id.clone(), tx.clone())))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut delivered = 0;
        for (connection_id, sender) in targets {
            match sender.send(text.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => debug!(group, connection_id, "skipping closed connection"),
            }
        }
        Ok(delivered)
    }
}
