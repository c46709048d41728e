//! WebSocket transport.
//!
//! One task reads frames, one task writes them. Every text frame is
//! dispatched on its own task, bounded by `max_in_flight` per connection,
//! so responses may leave in a different order than requests arrived unless
//! `ordered_dispatch` is set.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use turul_channels_json_rpc::{ChannelError, ChannelLayer, ConnectionContext, Transport};

use crate::{InMemoryChannelLayer, Result};
use crate::server::TransportState;

/// Accept WebSocket connections until shutdown is signalled.
pub(crate) async fn serve(listener: TcpListener, state: TransportState, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("WebSocket listener shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("New WebSocket connection from {}", peer_addr);
                    let state = state.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, peer_addr, state, shutdown).await {
                            debug!(%peer_addr, error = %err, "WebSocket connection ended with error");
                        }
                    });
                }
                Err(err) => error!("Failed to accept WebSocket connection: {}", err),
            },
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: TransportState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;

    let connection_id = Uuid::now_v7().to_string();
    let layer = Arc::clone(&state.channel_layer);
    let shared_layer: Arc<dyn ChannelLayer> = layer.clone();
    let context = ConnectionContext::new(Transport::WebSocket)
        .with_connection_id(connection_id.clone())
        .with_channel_layer(shared_layer);
    let mut outbox = open_outbox(&layer, &context, &state.config.connection_groups).await?;
    info!(%peer_addr, connection_id, "WebSocket connection established");

    let (mut sink, mut source) = ws_stream.split();

    // Single writer: responses and pushed notifications share the outbox.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbox.recv().await {
            if let Err(err) = sink.send(Message::text(text)).await {
                debug!(error = %err, "WebSocket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let permits = Arc::new(Semaphore::new(state.config.max_in_flight));

    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => break,
            message = source.next() => message,
        };

        let payload = match message {
            Some(Ok(Message::Text(text))) => Some(text.as_str().to_owned()),
            // binary frames carry no text and are answered as empty input
            Some(Ok(Message::Binary(_))) => None,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                debug!(connection_id, error = %err, "WebSocket read failed");
                break;
            }
        };

        if state.config.ordered_dispatch {
            respond(&state, &context, payload).await;
            continue;
        }

        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let state = state.clone();
        let context = context.clone();
        tokio::spawn(async move {
            respond(&state, &context, payload).await;
            drop(permit);
        });
    }

    layer.unregister(&connection_id).await;
    if let Err(err) = writer.await {
        debug!(connection_id, error = %err, "WebSocket writer task failed");
    }
    info!(connection_id, "WebSocket connection closed");
    Ok(())
}

/// Register the connection's outbox and join its lifetime groups. Nothing
/// stays registered when a join fails.
async fn open_outbox(
    layer: &InMemoryChannelLayer,
    context: &ConnectionContext,
    groups: &[String],
) -> std::result::Result<mpsc::Receiver<String>, ChannelError> {
    let connection_id = context.connection_id();
    let outbox = layer.register(connection_id).await;
    for group in groups {
        if let Err(err) = context.join_group(group).await {
            warn!(connection_id, group, error = %err, "Failed to join connection group");
            layer.unregister(connection_id).await;
            return Err(err);
        }
    }
    Ok(outbox)
}

/// Dispatch one inbound frame and queue the response, if any.
async fn respond(state: &TransportState, context: &ConnectionContext, payload: Option<String>) {
    let connection_id = context.connection_id();
    match state
        .dispatcher
        .handle_text(Transport::WebSocket, payload.as_deref(), context)
        .await
    {
        Ok(Some(text)) => {
            if let Err(err) = state.channel_layer.send(connection_id, text).await {
                debug!(connection_id, error = %err, "Dropping response for closed connection");
            }
        }
        Ok(None) => {}
        Err(err) => error!(connection_id, error = %err, "Failed to encode response frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use turul_channels_json_rpc::ConnectionId;

    /// Layer whose group joins always fail.
    struct RejectingLayer;

    #[async_trait]
    impl ChannelLayer for RejectingLayer {
        async fn group_add(&self, _group: &str, connection_id: &str) -> std::result::Result<(), ChannelError> {
            Err(ChannelError::ConnectionClosed(connection_id.to_string()))
        }

        async fn group_discard(&self, _group: &str, _connection_id: &str) -> std::result::Result<(), ChannelError> {
            Ok(())
        }

        async fn group_members(&self, _group: &str) -> Vec<ConnectionId> {
            Vec::new()
        }

        async fn send(&self, connection_id: &str, _text: String) -> std::result::Result<(), ChannelError> {
            Err(ChannelError::ConnectionNotFound(connection_id.to_string()))
        }

        async fn group_send(&self, _group: &str, _text: String) -> std::result::Result<usize, ChannelError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_open_outbox_joins_groups() {
        let layer = Arc::new(InMemoryChannelLayer::new());
        let shared: Arc<dyn ChannelLayer> = layer.clone();
        let context = ConnectionContext::new(Transport::WebSocket)
            .with_connection_id("c1")
            .with_channel_layer(shared);

        let _outbox = open_outbox(&layer, &context, &["lobby".to_string()])
            .await
            .unwrap();
        assert!(layer.is_connected("c1").await);
        assert_eq!(layer.groups_of("c1").await, vec!["lobby"]);
    }

    #[tokio::test]
    async fn test_failed_group_join_releases_outbox() {
        let layer = InMemoryChannelLayer::new();
        let context = ConnectionContext::new(Transport::WebSocket)
            .with_connection_id("c1")
            .with_channel_layer(Arc::new(RejectingLayer));

        let err = open_outbox(&layer, &context, &["lobby".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionClosed(ref id) if id == "c1"));
        assert!(!layer.is_connected("c1").await);
        assert_eq!(layer.connection_count().await, 0);
    }
}
