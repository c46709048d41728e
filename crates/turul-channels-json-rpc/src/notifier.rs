//! Server-pushed notifications.
//!
//! Frames are encoded here and handed to the host [`ChannelLayer`]. Delivery
//! is fire-and-forget: ordering and retries belong to the host.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::channel::{ChannelError, ChannelLayer};
use crate::codec::{CodecError, FrameCodec};
use crate::notification::JsonRpcNotification;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to encode notification: {0}")]
    Codec(#[from] CodecError),

    #[error("Failed to deliver notification: {0}")]
    Channel(#[from] ChannelError),
}

/// Sends notification frames to groups or single connections.
#[derive(Clone)]
pub struct Notifier {
    channel_layer: Arc<dyn ChannelLayer>,
    codec: FrameCodec,
}

impl Notifier {
    pub fn new(channel_layer: Arc<dyn ChannelLayer>) -> Self {
        Self::with_codec(channel_layer, FrameCodec::new())
    }

    pub fn with_codec(channel_layer: Arc<dyn ChannelLayer>, codec: FrameCodec) -> Self {
        Self {
            channel_layer,
            codec,
        }
    }

    pub fn channel_layer(&self) -> &Arc<dyn ChannelLayer> {
        &self.channel_layer
    }

    /// Encode a notification frame. `params` is always written, `null`
    /// included.
    pub fn build_frame(&self, method: &str, params: Value) -> Result<String, CodecError> {
        self.codec
            .encode_notification(JsonRpcNotification::new(method, Some(params)))
    }

    /// Send to every connection currently in `group`. Returns how many
    /// connections the frame was queued for.
    pub async fn notify_group(&self, group: &str, method: &str, params: Value) -> Result<usize, NotifyError> {
        let frame = self.build_frame(method, params)?;
        let delivered = self.channel_layer.group_send(group, frame).await?;
        debug!(group, method, delivered, "sent group notification");
        Ok(delivered)
    }

    /// Send to one connection, regardless of its group membership.
    pub async fn notify_connection(
        &self,
        connection_id: &str,
        method: &str,
        params: Value,
    ) -> Result<(), NotifyError> {
        let frame = self.build_frame(method, params)?;
        self.channel_layer.send(connection_id, frame).await?;
        debug!(connection_id, method, "sent connection notification");
        Ok(())
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
