//! Request classification and envelope validation.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. empty input is `InvalidRequest`
//! 2. input that is not JSON is `ParseError`
//! 3. a top-level array is `InvalidRequest` (batches are never executed)
//! 4. any other non-object is `InvalidRequest`
//! 5. an `id` that is not a string, integer or `null` is `InvalidRequest`
//! 6. `jsonrpc` must be `"2.0"`, `method` must be a string
//! 7. a method starting with `_` is `MethodNotFound`
//! 8. `params`, when present, must be an array or object, else `InvalidParams`
//!
//! A message without an `id` member that carries both `method` and `params`
//! is a notification. Everything else is a call, so an id-less message
//! without `params` is answered like a call.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ErrorCode, JsonRpcError};
use crate::request::{JsonRpcRequest, RequestParams};
use crate::types::{JsonRpcVersion, RequestId};

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Call(JsonRpcRequest),
    Notification(JsonRpcRequest),
}

impl IncomingMessage {
    pub fn method(&self) -> &str {
        &self.request().method
    }

    pub fn request(&self) -> &JsonRpcRequest {
        match self {
            IncomingMessage::Call(req) | IncomingMessage::Notification(req) => req,
        }
    }

    pub fn into_request(self) -> JsonRpcRequest {
        match self {
            IncomingMessage::Call(req) | IncomingMessage::Notification(req) => req,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, IncomingMessage::Notification(_))
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request().id.as_ref()
    }
}

/// Envelope rejected before dispatch, with the best id known at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub id: Option<RequestId>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, id: Option<RequestId>) -> Self {
        Self { code, id }
    }

    pub fn into_frame(self) -> JsonRpcError {
        JsonRpcError::protocol(self.id, self.code)
    }
}

impl From<ProtocolError> for JsonRpcError {
    fn from(err: ProtocolError) -> Self {
        err.into_frame()
    }
}

/// Classify a raw text payload. `None` stands for a transport message that
/// carried no text at all.
pub fn classify(payload: Option<&str>) -> Result<IncomingMessage, ProtocolError> {
    let text = match payload {
        Some(text) if !text.is_empty() => text,
        _ => return Err(ProtocolError::new(ErrorCode::InvalidRequest, None)),
    };

    let value: Value = serde_json::from_str(text)
        .map_err(|_| ProtocolError::new(ErrorCode::ParseError, None))?;

    classify_value(value)
}

/// Classify an already decoded JSON value.
pub fn classify_value(value: Value) -> Result<IncomingMessage, ProtocolError> {
    match value {
        Value::Object(obj) => classify_object(obj),
        Value::Array(items) => {
            let all_objects = items.iter().all(|item| item.is_object());
            debug!(len = items.len(), all_objects, "rejecting batch request");
            Err(ProtocolError::new(ErrorCode::InvalidRequest, None))
        }
        _ => Err(ProtocolError::new(ErrorCode::InvalidRequest, None)),
    }
}

fn classify_object(mut obj: Map<String, Value>) -> Result<IncomingMessage, ProtocolError> {
    let has_id = obj.contains_key("id");
    let id = match obj.get("id") {
        None => None,
        Some(raw) => match RequestId::from_value(raw) {
            Some(id) => Some(id),
            None => return Err(ProtocolError::new(ErrorCode::InvalidRequest, None)),
        },
    };
    let reject = |code: ErrorCode| ProtocolError::new(code, id.clone());

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JsonRpcVersion::V2_0.as_str()) {
        return Err(reject(ErrorCode::InvalidRequest));
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(reject(ErrorCode::InvalidRequest)),
    };

    if method.starts_with('_') {
        return Err(reject(ErrorCode::MethodNotFound));
    }

    let params = match obj.remove("params") {
        None => None,
        Some(raw) => Some(RequestParams::from_value(raw).ok_or_else(|| reject(ErrorCode::InvalidParams))?),
    };

    let is_notification = !has_id && params.is_some();
    let request = JsonRpcRequest::new(id, method, params);

    if is_notification {
        Ok(IncomingMessage::Notification(request))
    } else {
        Ok(IncomingMessage::Call(request))
    }
}
