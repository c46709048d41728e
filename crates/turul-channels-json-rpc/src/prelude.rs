//! # JSON-RPC Channels Prelude
//!
//! Convenient re-exports of the types needed to register handlers and
//! dispatch messages.
//!
//! ```rust
//! use turul_channels_json_rpc::prelude::*;
//! ```

pub use crate::channel::{ChannelError, ChannelLayer};
pub use crate::context::{ConnectionContext, SessionData};
pub use crate::dispatcher::{Dispatcher, DispatcherConfig};
pub use crate::error::{ApplicationError, ErrorCode, HandlerError};
pub use crate::handler::{CallArgs, HandlerResult, RpcHandler, handler_fn, sync_handler};
pub use crate::notifier::{Notifier, NotifyError};
pub use crate::registry::{MethodEntry, MethodKind, MethodRegistry, ScopeId};
pub use crate::request::RequestParams;
pub use crate::response::JsonRpcMessage;
pub use crate::types::{RequestId, Transport, TransportSet};

pub use crate::error_codes::*;
