use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::types::{JsonRpcVersion, RequestId};

/// Codes a handler may declare on an [`ApplicationError`].
pub const APPLICATION_ERROR_RANGE: RangeInclusive<i64> = -32099..=-32000;

/// JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Generic application failure (-32000).
    ApplicationError,
    /// Handler-declared code in -32099..=-32001.
    ServerError(i64),
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ApplicationError => -32000,
            ErrorCode::ServerError(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse Error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method Not Found",
            ErrorCode::InvalidParams => "Invalid Params",
            ErrorCode::InternalError => "Internal Error",
            ErrorCode::ApplicationError => "Application Error",
            ErrorCode::ServerError(_) => "Server Error",
        }
    }

    /// Map a raw code back onto the table. Codes outside the fixed table
    /// and the application range have no meaning here.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32600 => Some(ErrorCode::InvalidRequest),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::InternalError),
            -32000 => Some(ErrorCode::ApplicationError),
            c if APPLICATION_ERROR_RANGE.contains(&c) => Some(ErrorCode::ServerError(c)),
            _ => None,
        }
    }

    pub fn is_application(&self) -> bool {
        APPLICATION_ERROR_RANGE.contains(&self.code())
    }

    /// Status code used when this error is the body of an HTTP response.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::MethodNotFound => 404,
            ErrorCode::ParseError
            | ErrorCode::InvalidParams
            | ErrorCode::InternalError
            | ErrorCode::ApplicationError
            | ErrorCode::ServerError(_) => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// JSON-RPC Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: ErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    /// Canonical message, no data. Every engine-raised error looks like this.
    pub fn protocol(code: ErrorCode) -> Self {
        Self::new(code, None, None)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

/// JSON-RPC Error response
///
/// `id` is omitted from the wire when the request carried none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::types::deserialize_present_id"
    )]
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            error,
        }
    }

    pub fn protocol(id: Option<RequestId>, code: ErrorCode) -> Self {
        Self::new(id, JsonRpcErrorObject::protocol(code))
    }

    pub fn parse_error() -> Self {
        Self::protocol(None, ErrorCode::ParseError)
    }

    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::protocol(id, ErrorCode::InvalidRequest)
    }

    pub fn method_not_found(id: Option<RequestId>) -> Self {
        Self::protocol(id, ErrorCode::MethodNotFound)
    }

    pub fn invalid_params(id: Option<RequestId>) -> Self {
        Self::protocol(id, ErrorCode::InvalidParams)
    }

    /// HTTP status for this frame; unknown codes fall back to 500.
    pub fn http_status(&self) -> u16 {
        self.error
            .error_code()
            .map(|code| code.http_status())
            .unwrap_or(500)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JSON-RPC Error {}: {}",
            self.error.code, self.error.message
        )
    }
}

impl std::error::Error for JsonRpcError {}

/// Error a handler raises on purpose to hand the caller a stable code.
///
/// ```
/// use turul_channels_json_rpc::ApplicationError;
/// use serde_json::json;
///
/// let err = ApplicationError::new(-32010)
///     .with_message("quota exceeded")
///     .with_data(json!({"limit": 10}));
/// assert_eq!(err.code().code(), -32010);
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApplicationError {
    code: ErrorCode,
    message: String,
    data: Option<Value>,
}

impl ApplicationError {
    /// Declare an error with a code from -32099..=-32000. Any other code is
    /// replaced by the generic application code.
    pub fn new(code: i64) -> Self {
        let code = match ErrorCode::from_code(code) {
            Some(code) if code.is_application() => code,
            _ => {
                warn!(
                    code,
                    "application error code outside -32099..=-32000, using -32000"
                );
                ErrorCode::ApplicationError
            }
        };
        Self::with_code(code)
    }

    /// Declare an error with any code of the table, e.g. `InvalidParams`
    /// for arguments the handler itself rejected.
    pub fn with_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        JsonRpcErrorObject::new(self.code, Some(self.message.clone()), self.data.clone())
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure returned by a handler.
///
/// Converts from any error type so handlers can use `?` directly. At the
/// dispatch boundary a wrapped [`ApplicationError`] keeps its declared code;
/// everything else becomes `-32000` with the error text as `message` and the
/// error chain as `data`.
pub struct HandlerError {
    inner: BoxError,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

impl HandlerError {
    pub fn new(error: BoxError) -> Self {
        Self { inner: error }
    }

    pub fn msg(message: impl fmt::Display) -> Self {
        Self {
            inner: Box::new(MessageError(message.to_string())),
        }
    }

    pub fn as_application(&self) -> Option<&ApplicationError> {
        self.inner.downcast_ref::<ApplicationError>()
    }

    pub fn is_application(&self) -> bool {
        self.as_application().is_some()
    }

    /// Messages of this error and all of its sources, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self.inner.as_ref());
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }

    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self.as_application() {
            Some(declared) => declared.to_error_object(),
            None => JsonRpcErrorObject::new(
                ErrorCode::ApplicationError,
                Some(self.inner.to_string()),
                Some(Value::Array(
                    self.chain().into_iter().map(Value::String).collect(),
                )),
            ),
        }
    }

    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            inner: Box::new(error),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}
