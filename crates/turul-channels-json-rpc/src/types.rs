use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Identifier of a JSON-RPC call, echoed back on its response.
///
/// Strings and integers are the recommended forms, but any JSON number is
/// accepted and echoed as received. An explicit `"id": null` is legal on
/// the wire and is kept distinct from an absent id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(Number),
    Null,
}

impl RequestId {
    /// Read an id from a raw `id` member. Booleans, arrays and objects are
    /// not valid ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RequestId::String(s.clone())),
            Value::Number(n) => Some(RequestId::Number(n.clone())),
            Value::Null => Some(RequestId::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RequestId::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RequestId::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RequestId::Null)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// Keeps an explicit `"id": null` distinct from a missing id. Use together
/// with `#[serde(default)]`.
pub(crate) fn deserialize_present_id<'de, D>(deserializer: D) -> Result<Option<RequestId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    RequestId::deserialize(deserializer).map(Some)
}

/// JSON-RPC version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonRpcVersion {
    #[default]
    V2_0,
}

impl JsonRpcVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonRpcVersion::V2_0 => "2.0",
        }
    }
}

impl fmt::Display for JsonRpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "2.0" => Ok(JsonRpcVersion::V2_0),
            _ => Err(serde::de::Error::custom(format!(
                "Invalid JSON-RPC version: {}",
                s
            ))),
        }
    }
}

/// Channel a frame arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    WebSocket,
    Http,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::WebSocket => "websocket",
            Transport::Http => "http",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transports a registered method is reachable through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSet {
    pub websocket: bool,
    pub http: bool,
}

impl TransportSet {
    pub const fn all() -> Self {
        Self {
            websocket: true,
            http: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            websocket: false,
            http: false,
        }
    }

    pub fn only(transport: Transport) -> Self {
        Self::none().with(transport, true)
    }

    pub fn with(mut self, transport: Transport, enabled: bool) -> Self {
        match transport {
            Transport::WebSocket => self.websocket = enabled,
            Transport::Http => self.http = enabled,
        }
        self
    }

    pub fn contains(&self, transport: Transport) -> bool {
        match transport {
            Transport::WebSocket => self.websocket,
            Transport::Http => self.http,
        }
    }
}

impl Default for TransportSet {
    fn default() -> Self {
        Self::all()
    }
}
