//! Frame encoding and decoding.
//!
//! Outbound values (results, error data, notification params) pass through a
//! pluggable [`ValueEncoder`] before serialization. An encoder failure is
//! returned as [`CodecError`] to the transport; it is never turned into a
//! JSON-RPC error frame because the response shape is already fixed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::notification::JsonRpcNotification;
use crate::response::JsonRpcMessage;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Value cannot be encoded: {0}")]
    Unencodable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Converts outbound values into JSON-legal values.
pub trait ValueEncoder: Send + Sync {
    fn encode(&self, value: Value) -> Result<Value, CodecError>;
}

/// Leaves every value untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEncoder;

impl ValueEncoder for PassthroughEncoder {
    fn encode(&self, value: Value) -> Result<Value, CodecError> {
        Ok(value)
    }
}

impl<F> ValueEncoder for F
where
    F: Fn(Value) -> Result<Value, CodecError> + Send + Sync,
{
    fn encode(&self, value: Value) -> Result<Value, CodecError> {
        self(value)
    }
}

#[derive(Clone)]
pub struct FrameCodec {
    encoder: Arc<dyn ValueEncoder>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_encoder(PassthroughEncoder)
    }

    pub fn with_encoder<E>(encoder: E) -> Self
    where
        E: ValueEncoder + 'static,
    {
        Self {
            encoder: Arc::new(encoder),
        }
    }

    /// Parse raw text into a JSON value. Anything that is not JSON at all
    /// is a parse error.
    pub fn decode_value(&self, text: &str) -> Result<Value, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Parse)
    }

    /// Parse raw text into a typed frame.
    pub fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Parse)
    }

    pub fn encode_response(&self, frame: JsonRpcMessage) -> Result<String, CodecError> {
        let frame = match frame {
            JsonRpcMessage::Response(mut response) => {
                response.result = self.encoder.encode(response.result)?;
                JsonRpcMessage::Response(response)
            }
            JsonRpcMessage::Error(mut error) => {
                if let Some(data) = error.error.data.take() {
                    error.error.data = Some(self.encoder.encode(data)?);
                }
                JsonRpcMessage::Error(error)
            }
        };
        self.to_text(&frame)
    }

    pub fn encode_notification(
        &self,
        mut notification: JsonRpcNotification,
    ) -> Result<String, CodecError> {
        if let Some(params) = notification.params.take() {
            notification.params = Some(self.encoder.encode(params)?);
        }
        self.to_text(&notification)
    }

    fn to_text<T: Serialize>(&self, frame: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec").finish_non_exhaustive()
    }
}
