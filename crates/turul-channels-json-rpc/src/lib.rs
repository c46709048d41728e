//! # JSON-RPC 2.0 dispatch for connection-oriented transports
//!
//! Transport-agnostic engine that turns inbound text frames into handler
//! invocations and handler outcomes into response frames. The same method
//! tables serve persistent WebSocket connections and one-shot HTTP POSTs;
//! each method can be restricted to either transport.
//!
//! ## Features
//! - Scope-keyed method registry with separate call and notification tables
//! - Strict envelope validation with canonical error frames
//! - Handler failures and panics are always converted into error frames
//! - Notifications never produce a frame
//! - Group and connection notifications through a host channel layer
//!
//! ```
//! use std::sync::Arc;
//! use turul_channels_json_rpc::prelude::*;
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let registry = Arc::new(MethodRegistry::new());
//! let scope = ScopeId::new("Echo");
//! registry.register_call(
//!     &scope,
//!     MethodEntry::new("ping", sync_handler(|_args| Ok(json!("pong")))),
//! );
//!
//! let dispatcher = Dispatcher::new(registry, scope);
//! let context = ConnectionContext::new(Transport::WebSocket);
//! let reply = dispatcher
//!     .handle_text(
//!         Transport::WebSocket,
//!         Some(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":[]}"#),
//!         &context,
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(reply.as_deref(), Some(r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#));
//! # });
//! ```

pub mod channel;
pub mod classify;
pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod notification;
pub mod notifier;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod response;
pub mod types;

// Re-export main types
pub use channel::{ChannelError, ChannelLayer, ConnectionId};
pub use classify::{IncomingMessage, ProtocolError, classify, classify_value};
pub use codec::{CodecError, FrameCodec, PassthroughEncoder, ValueEncoder};
pub use context::{ConnectionContext, SessionData};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{ApplicationError, ErrorCode, HandlerError, JsonRpcError, JsonRpcErrorObject};
pub use handler::{CallArgs, HandlerResult, RpcHandler, handler_fn, sync_handler};
pub use notification::JsonRpcNotification;
pub use notifier::{NotifyError, Notifier};
pub use registry::{MethodEntry, MethodKind, MethodRegistry, ScopeId};
pub use request::{JsonRpcRequest, RequestParams};
pub use response::{JsonRpcMessage, JsonRpcResponse};
pub use types::{JsonRpcVersion, RequestId, Transport, TransportSet};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const APPLICATION_ERROR: i64 = -32000;

    // Application error range: -32099 to -32000
    pub const APPLICATION_ERROR_START: i64 = -32099;
    pub const APPLICATION_ERROR_END: i64 = -32000;
}
