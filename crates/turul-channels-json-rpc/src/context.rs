//! Per-message connection context.
//!
//! The transport owns the context. The dispatcher only borrows it for one
//! dispatch and hands a clone to handlers that registered with
//! `wants_context`; it never keeps a copy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::channel::{ChannelError, ChannelLayer, ConnectionId};
use crate::types::Transport;

/// Key/value state scoped to one connection.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.write().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().clone()
    }
}

/// Handle on the connection a message arrived on.
#[derive(Clone)]
pub struct ConnectionContext {
    connection_id: ConnectionId,
    transport: Transport,
    connected_at: DateTime<Utc>,
    session: SessionData,
    channel_layer: Option<Arc<dyn ChannelLayer>>,
}

impl ConnectionContext {
    /// New context with a fresh UUID v7 connection id.
    pub fn new(transport: Transport) -> Self {
        Self {
            connection_id: uuid::Uuid::now_v7().to_string(),
            transport,
            connected_at: Utc::now(),
            session: SessionData::new(),
            channel_layer: None,
        }
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<ConnectionId>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn with_session(mut self, session: SessionData) -> Self {
        self.session = session;
        self
    }

    pub fn with_channel_layer(mut self, layer: Arc<dyn ChannelLayer>) -> Self {
        self.channel_layer = Some(layer);
        self
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn session(&self) -> &SessionData {
        &self.session
    }

    pub fn channel_layer(&self) -> Option<&Arc<dyn ChannelLayer>> {
        self.channel_layer.as_ref()
    }

    /// Add this connection to a broadcast group.
    pub async fn join_group(&self, group: &str) -> Result<(), ChannelError> {
        self.layer()?.group_add(group, &self.connection_id).await
    }

    /// Remove this connection from a broadcast group.
    pub async fn leave_group(&self, group: &str) -> Result<(), ChannelError> {
        self.layer()?.group_discard(group, &self.connection_id).await
    }

    fn layer(&self) -> Result<&Arc<dyn ChannelLayer>, ChannelError> {
        self.channel_layer
            .as_ref()
            .ok_or_else(|| ChannelError::NoChannelLayer(self.connection_id.clone()))
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("connection_id", &self.connection_id)
            .field("transport", &self.transport)
            .field("connected_at", &self.connected_at)
            .field("session", &self.session)
            .field("has_channel_layer", &self.channel_layer.is_some())
            .finish()
    }
}
