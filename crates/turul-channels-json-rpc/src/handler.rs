use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::ConnectionContext;
use crate::error::HandlerError;
use crate::request::RequestParams;

/// Result type for handler invocations
pub type HandlerResult = Result<Value, HandlerError>;

/// Trait for handling one JSON-RPC method
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handle a call or notification. For notifications the returned value
    /// is discarded and should be `Value::Null`.
    async fn call(&self, args: CallArgs) -> HandlerResult;
}

/// Arguments bound for one invocation.
///
/// Positional params arrive as a list, keyword params as an object. The
/// connection context is only present when the method was registered with
/// `wants_context`; it is kept apart from the JSON params.
#[derive(Debug, Clone)]
pub struct CallArgs {
    params: RequestParams,
    context: Option<ConnectionContext>,
}

impl CallArgs {
    pub fn new(params: RequestParams, context: Option<ConnectionContext>) -> Self {
        Self { params, context }
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub fn positional(&self) -> Option<&[Value]> {
        match &self.params {
            RequestParams::Array(items) => Some(items),
            RequestParams::Object(_) => None,
        }
    }

    pub fn named(&self) -> Option<&Map<String, Value>> {
        match &self.params {
            RequestParams::Object(map) => Some(map),
            RequestParams::Array(_) => None,
        }
    }

    pub fn context(&self) -> Option<&ConnectionContext> {
        self.context.as_ref()
    }

    /// Context for handlers registered with `wants_context`.
    pub fn require_context(&self) -> Result<&ConnectionContext, HandlerError> {
        self.context
            .as_ref()
            .ok_or_else(|| HandlerError::msg("connection context not available"))
    }

    /// Bind all params into `T`: tuples and sequences from positional
    /// params, structs and maps from keyword params.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_value(self.params.to_value())?)
    }

    /// Positional argument `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, HandlerError> {
        let value = self.params.get_index(index).ok_or_else(|| {
            HandlerError::msg(format!("missing positional argument {}", index))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Keyword argument `name`.
    pub fn param<T: DeserializeOwned>(&self, name: &str) -> Result<T, HandlerError> {
        let value = self
            .params
            .get(name)
            .ok_or_else(|| HandlerError::msg(format!("missing keyword argument '{}'", name)))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Fail unless the call carried no arguments.
    pub fn expect_no_params(&self) -> Result<(), HandlerError> {
        if self.params.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::msg(format!(
                "method takes no arguments ({} given)",
                self.params.len()
            )))
        }
    }

    pub fn into_parts(self) -> (RequestParams, Option<ConnectionContext>) {
        (self.params, self.context)
    }
}

/// A handler backed by an async closure
pub struct FunctionHandler<F> {
    handler_fn: F,
}

#[async_trait]
impl<F, Fut> RpcHandler for FunctionHandler<F>
where
    F: Fn(CallArgs) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, args: CallArgs) -> HandlerResult {
        (self.handler_fn)(args).await
    }
}

/// A handler backed by a blocking closure
pub struct SyncFunctionHandler<F> {
    handler_fn: F,
}

#[async_trait]
impl<F> RpcHandler for SyncFunctionHandler<F>
where
    F: Fn(CallArgs) -> HandlerResult + Send + Sync,
{
    async fn call(&self, args: CallArgs) -> HandlerResult {
        (self.handler_fn)(args)
    }
}

/// Wrap an async closure as a handler.
///
/// ```
/// use turul_channels_json_rpc::handler_fn;
/// use serde_json::json;
///
/// let ping = handler_fn(|_args| async { Ok(json!("pong")) });
/// # let _ = ping;
/// ```
pub fn handler_fn<F, Fut>(handler_fn: F) -> FunctionHandler<F>
where
    F: Fn(CallArgs) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FunctionHandler { handler_fn }
}

/// Wrap a synchronous closure as a handler.
pub fn sync_handler<F>(handler_fn: F) -> SyncFunctionHandler<F>
where
    F: Fn(CallArgs) -> HandlerResult + Send + Sync,
{
    SyncFunctionHandler { handler_fn }
}
