//! JSON-RPC channels server
//!
//! Binds the WebSocket transport and the HTTP bridge to one dispatcher and
//! one in-memory channel layer.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use turul_channels_json_rpc::{
    Dispatcher, DispatcherConfig, FrameCodec, MethodEntry, MethodKind, MethodRegistry, Notifier,
    ScopeId,
};

use crate::{InMemoryChannelLayer, Result, ServerConfig, ServerError, http, websocket};

/// State shared by every connection of both transports.
#[derive(Clone)]
pub(crate) struct TransportState {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) channel_layer: Arc<InMemoryChannelLayer>,
    pub(crate) config: Arc<ServerConfig>,
}

/// Builder for [`JsonRpcServer`]
pub struct JsonRpcServerBuilder {
    config: ServerConfig,
    registry: Arc<MethodRegistry>,
    scope: ScopeId,
    dispatcher_config: DispatcherConfig,
}

impl JsonRpcServerBuilder {
    /// Create a builder with its own registry and scope
    pub fn new() -> Self {
        Self::with_registry(Arc::new(MethodRegistry::new()), ScopeId::new("JsonRpcServer"))
    }

    /// Serve the methods of `scope` from an existing registry
    pub fn with_registry(registry: Arc<MethodRegistry>, scope: ScopeId) -> Self {
        Self {
            config: ServerConfig::default(),
            registry,
            scope,
            dispatcher_config: DispatcherConfig::default(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the WebSocket listen address
    pub fn websocket_address(mut self, addr: SocketAddr) -> Self {
        self.config.websocket_address = Some(addr);
        self
    }

    /// Set the HTTP listen address
    pub fn http_address(mut self, addr: SocketAddr) -> Self {
        self.config.http_address = Some(addr);
        self
    }

    /// Disable the WebSocket transport
    pub fn without_websocket(mut self) -> Self {
        self.config.websocket_address = None;
        self
    }

    /// Disable the HTTP bridge
    pub fn without_http(mut self) -> Self {
        self.config.http_address = None;
        self
    }

    /// Set the HTTP endpoint path
    pub fn http_path(mut self, path: impl Into<String>) -> Self {
        self.config.http_path = path.into();
        self
    }

    /// Set maximum request body size
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set the per-connection dispatch concurrency
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max;
        self
    }

    /// Dispatch WebSocket messages inline, in arrival order
    pub fn ordered_dispatch(mut self, ordered: bool) -> Self {
        self.config.ordered_dispatch = ordered;
        self
    }

    /// Set the outbound queue length per connection
    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.config.channel_buffer_size = size;
        self
    }

    /// Add a group every WebSocket connection joins on connect
    pub fn connection_group(mut self, group: impl Into<String>) -> Self {
        self.config.connection_groups.push(group.into());
        self
    }

    /// Use a custom codec for responses and notifications
    pub fn codec(mut self, codec: FrameCodec) -> Self {
        self.dispatcher_config.codec = codec;
        self
    }

    /// Let handler panics unwind instead of answering `-32000`
    pub fn catch_panics(mut self, catch: bool) -> Self {
        self.dispatcher_config.catch_panics = catch;
        self
    }

    /// Register a call method
    pub fn call(self, entry: MethodEntry) -> Self {
        self.registry.register(&self.scope, MethodKind::Call, entry);
        self
    }

    /// Register a notification method
    pub fn notification(self, entry: MethodEntry) -> Self {
        self.registry.register(&self.scope, MethodKind::Notification, entry);
        self
    }

    /// Build the server
    pub fn build(self) -> Result<JsonRpcServer> {
        self.config.validate().map_err(ServerError::Config)?;

        let dispatcher = Dispatcher::with_config(self.registry, self.scope, self.dispatcher_config);
        let channel_layer = Arc::new(InMemoryChannelLayer::with_buffer_size(
            self.config.channel_buffer_size,
        ));

        Ok(JsonRpcServer {
            config: Arc::new(self.config),
            dispatcher,
            channel_layer,
        })
    }
}

impl Default for JsonRpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket + HTTP JSON-RPC server
#[derive(Clone)]
pub struct JsonRpcServer {
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher,
    channel_layer: Arc<InMemoryChannelLayer>,
}

impl JsonRpcServer {
    /// Create a new builder
    pub fn builder() -> JsonRpcServerBuilder {
        JsonRpcServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn channel_layer(&self) -> &Arc<InMemoryChannelLayer> {
        &self.channel_layer
    }

    /// Notifier bound to this server's channel layer and codec
    pub fn notifier(&self) -> Notifier {
        Notifier::with_codec(self.channel_layer.clone(), self.dispatcher.codec().clone())
    }

    pub(crate) fn transport_state(&self) -> TransportState {
        TransportState {
            dispatcher: self.dispatcher.clone(),
            channel_layer: Arc::clone(&self.channel_layer),
            config: Arc::clone(&self.config),
        }
    }

    /// Bind the configured listeners and start serving in the background
    pub async fn start(&self) -> Result<RunningServer> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let websocket_addr = match self.config.websocket_address {
            Some(address) => {
                let listener = bind(address).await?;
                let local = listener.local_addr()?;
                info!("WebSocket transport listening on ws://{}", local);
                tasks.push(tokio::spawn(websocket::serve(
                    listener,
                    self.transport_state(),
                    shutdown_rx.clone(),
                )));
                Some(local)
            }
            None => None,
        };

        let http_addr = match self.config.http_address {
            Some(address) => {
                let listener = bind(address).await?;
                let local = listener.local_addr()?;
                info!("HTTP bridge listening on http://{}{}", local, self.config.http_path);
                tasks.push(tokio::spawn(http::serve(
                    listener,
                    self.transport_state(),
                    shutdown_rx.clone(),
                )));
                Some(local)
            }
            None => None,
        };

        debug!(
            scope = %self.dispatcher.scope(),
            calls = ?self.dispatcher.scope_methods(MethodKind::Call),
            notifications = ?self.dispatcher.scope_methods(MethodKind::Notification),
            "serving methods"
        );

        Ok(RunningServer {
            websocket_addr,
            http_addr,
            notifier: self.notifier(),
            shutdown_tx,
            tasks,
        })
    }

    /// Start the server and serve until every listener stops
    pub async fn run(&self) -> Result<()> {
        self.start().await?.wait().await
    }
}

async fn bind(address: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(address)
        .await
        .map_err(|source| ServerError::Bind { address, source })
}

/// Handle on a started server.
///
/// Dropping the handle signals shutdown as well.
pub struct RunningServer {
    websocket_addr: Option<SocketAddr>,
    http_addr: Option<SocketAddr>,
    notifier: Notifier,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Bound WebSocket address, with the real port when bound to port 0
    pub fn websocket_addr(&self) -> Option<SocketAddr> {
        self.websocket_addr
    }

    /// Bound HTTP address, with the real port when bound to port 0
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Stop accepting, close open WebSocket connections and wait for the
    /// listeners to finish
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down JSON-RPC server");
        let _ = self.shutdown_tx.send(true);
        Self::join(self.tasks).await
    }

    /// Wait until the listeners stop
    pub async fn wait(self) -> Result<()> {
        let RunningServer {
            shutdown_tx, tasks, ..
        } = self;
        let result = Self::join(tasks).await;
        drop(shutdown_tx);
        result
    }

    async fn join(tasks: Vec<JoinHandle<()>>) -> Result<()> {
        for task in tasks {
            task.await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("websocket_addr", &self.websocket_addr)
            .field("http_addr", &self.http_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turul_channels_json_rpc::{CallArgs, sync_handler};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_builder_registers_methods() {
        let server = JsonRpcServer::builder()
            .call(MethodEntry::new("ping", sync_handler(|_args: CallArgs| Ok(json!("pong")))))
            .notification(MethodEntry::new("tick", sync_handler(|_args: CallArgs| Ok(json!(null)))))
            .build()
            .unwrap();

        assert_eq!(server.dispatcher().scope_methods(MethodKind::Call), vec!["ping"]);
        assert_eq!(
            server.dispatcher().scope_methods(MethodKind::Notification),
            vec!["tick"]
        );
    }

    #[test]
    fn test_builder_config() {
        let server = JsonRpcServer::builder()
            .websocket_address(loopback())
            .without_http()
            .http_path("/rpc")
            .max_body_size(2048)
            .max_in_flight(4)
            .ordered_dispatch(true)
            .connection_group("lobby")
            .build()
            .unwrap();

        let config = server.config();
        assert_eq!(config.websocket_address, Some(loopback()));
        assert!(config.http_address.is_none());
        assert_eq!(config.http_path, "/rpc");
        assert_eq!(config.max_body_size, 2048);
        assert_eq!(config.max_in_flight, 4);
        assert!(config.ordered_dispatch);
        assert_eq!(config.connection_groups, vec!["lobby"]);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = JsonRpcServer::builder().without_websocket().without_http().build();
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_and_shutdown_on_ephemeral_ports() {
        let server = JsonRpcServer::builder()
            .websocket_address(loopback())
            .http_address(loopback())
            .build()
            .unwrap();

        let running = server.start().await.unwrap();
        let ws = running.websocket_addr().unwrap();
        let http = running.http_addr().unwrap();
        assert_ne!(ws.port(), 0);
        assert_ne!(http.port(), 0);
        assert_ne!(ws, http);

        running.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind(loopback()).await.unwrap();
        let address = taken.local_addr().unwrap();

        let server = JsonRpcServer::builder()
            .websocket_address(address)
            .without_http()
            .build()
            .unwrap();
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { address: a, .. } if a == address));
    }
}
