//! Method dispatch for one consumer scope.
//!
//! The dispatcher resolves a classified message against the registry,
//! invokes the handler and turns the outcome into at most one response
//! frame. Handler failures and panics never escape to the transport.
//! Notifications never produce a frame.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::classify::{IncomingMessage, classify};
use crate::codec::{CodecError, FrameCodec};
use crate::context::ConnectionContext;
use crate::error::{HandlerError, JsonRpcError};
use crate::handler::{CallArgs, HandlerResult};
use crate::registry::{MethodEntry, MethodKind, MethodRegistry, ScopeId};
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::JsonRpcMessage;
use crate::types::{RequestId, Transport};

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Codec used by [`Dispatcher::handle_text`].
    pub codec: FrameCodec,
    /// Convert handler panics into `-32000` frames instead of unwinding
    /// into the transport task.
    pub catch_panics: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            codec: FrameCodec::new(),
            catch_panics: true,
        }
    }
}

#[derive(Debug, Error)]
#[error("handler panicked: {0}")]
struct HandlerPanic(String);

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Routes messages to the handlers of one scope.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    scope: ScopeId,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<MethodRegistry>, scope: ScopeId) -> Self {
        Self::with_config(registry, scope, DispatcherConfig::default())
    }

    pub fn with_config(registry: Arc<MethodRegistry>, scope: ScopeId, config: DispatcherConfig) -> Self {
        Self {
            registry,
            scope,
            config,
        }
    }

    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.config.codec
    }

    /// Methods of this dispatcher's scope, sorted.
    pub fn scope_methods(&self, kind: MethodKind) -> Vec<String> {
        self.registry.list(&self.scope, kind)
    }

    /// Look up a method that is reachable on `transport`. A method that is
    /// registered but disabled for the transport resolves to nothing.
    pub fn resolve(&self, kind: MethodKind, name: &str, transport: Transport) -> Option<Arc<MethodEntry>> {
        self.registry
            .lookup(&self.scope, kind, name)
            .filter(|entry| entry.allows(transport))
    }

    /// Dispatch a classified message. Returns the response frame for a
    /// call and `None` for a notification.
    pub async fn dispatch(
        &self,
        transport: Transport,
        message: IncomingMessage,
        context: &ConnectionContext,
    ) -> Option<JsonRpcMessage> {
        debug!(
            scope = %self.scope,
            %transport,
            method = message.method(),
            notification = message.is_notification(),
            connection_id = context.connection_id(),
            "dispatching message"
        );
        match message {
            IncomingMessage::Call(request) => Some(self.dispatch_call(transport, request, context).await),
            IncomingMessage::Notification(request) => {
                self.dispatch_notification(transport, request, context).await;
                None
            }
        }
    }

    /// Classify a raw payload and dispatch it. Envelope errors are answered
    /// with an error frame.
    pub async fn handle_message(
        &self,
        transport: Transport,
        payload: Option<&str>,
        context: &ConnectionContext,
    ) -> Option<JsonRpcMessage> {
        match classify(payload) {
            Ok(message) => self.dispatch(transport, message, context).await,
            Err(rejected) => {
                debug!(code = rejected.code.code(), %transport, "rejected message");
                Some(JsonRpcMessage::error(rejected.into_frame()))
            }
        }
    }

    /// [`handle_message`](Self::handle_message) plus encoding of the frame.
    pub async fn handle_text(
        &self,
        transport: Transport,
        payload: Option<&str>,
        context: &ConnectionContext,
    ) -> Result<Option<String>, CodecError> {
        match self.handle_message(transport, payload, context).await {
            Some(frame) => self.config.codec.encode_response(frame).map(Some),
            None => Ok(None),
        }
    }

    async fn dispatch_call(
        &self,
        transport: Transport,
        request: JsonRpcRequest,
        context: &ConnectionContext,
    ) -> JsonRpcMessage {
        let JsonRpcRequest { id, method, params, .. } = request;

        let Some(entry) = self.resolve(MethodKind::Call, &method, transport) else {
            debug!(method = %method, %transport, "method not found");
            return JsonRpcMessage::error(JsonRpcError::method_not_found(id));
        };

        match self.invoke(&entry, params.unwrap_or_default(), context).await {
            Ok(result) => JsonRpcMessage::success(id.unwrap_or(RequestId::Null), result),
            Err(err) => {
                if err.is_application() {
                    debug!(method = %method, error = %err, "handler returned application error");
                } else {
                    error!(method = %method, error = %err, "Application error");
                }
                JsonRpcMessage::error(JsonRpcError::new(id, err.to_error_object()))
            }
        }
    }

    async fn dispatch_notification(
        &self,
        transport: Transport,
        request: JsonRpcRequest,
        context: &ConnectionContext,
    ) {
        let JsonRpcRequest { method, params, .. } = request;

        let Some(entry) = self.resolve(MethodKind::Notification, &method, transport) else {
            debug!(method = %method, %transport, "dropping notification for unknown method");
            return;
        };

        match self.invoke(&entry, params.unwrap_or_default(), context).await {
            Ok(Value::Null) => {}
            Ok(_) => warn!(method = %method, "notification handler returned a value, discarded"),
            Err(err) => warn!(method = %method, error = %err, "notification handler failed"),
        }
    }

    async fn invoke(
        &self,
        entry: &MethodEntry,
        params: RequestParams,
        context: &ConnectionContext,
    ) -> HandlerResult {
        let context = entry.wants_context().then(|| context.clone());
        let call = entry.handler().call(CallArgs::new(params, context));

        if !self.config.catch_panics {
            return call.await;
        }

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload);
                error!(method = entry.name(), panic = %message, "handler panicked");
                Err(HandlerError::from(HandlerPanic(message)))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("scope", &self.scope)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
