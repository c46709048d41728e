use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{JsonRpcVersion, RequestId};

/// Parameters for a JSON-RPC request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RequestParams {
    /// Positional parameters as an array
    Array(Vec<Value>),
    /// Named parameters as an object
    Object(Map<String, Value>),
}

impl RequestParams {
    /// Accept only the two legal shapes of `params`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(RequestParams::Array(items)),
            Value::Object(map) => Some(RequestParams::Object(map)),
            _ => None,
        }
    }

    /// Get a parameter by name (object params only)
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            RequestParams::Object(map) => map.get(key),
            RequestParams::Array(_) => None,
        }
    }

    /// Get a parameter by index (array params only)
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            RequestParams::Array(vec) => vec.get(index),
            RequestParams::Object(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RequestParams::Object(map) => map.len(),
            RequestParams::Array(vec) => vec.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, RequestParams::Array(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestParams::Object(map) => Value::Object(map.clone()),
            RequestParams::Array(arr) => Value::Array(arr.clone()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            RequestParams::Object(map) => Value::Object(map),
            RequestParams::Array(arr) => Value::Array(arr),
        }
    }
}

/// A call without `params` binds like an empty positional list.
impl Default for RequestParams {
    fn default() -> Self {
        RequestParams::Array(Vec::new())
    }
}

impl From<Map<String, Value>> for RequestParams {
    fn from(map: Map<String, Value>) -> Self {
        RequestParams::Object(map)
    }
}

impl From<Vec<Value>> for RequestParams {
    fn from(vec: Vec<Value>) -> Self {
        RequestParams::Array(vec)
    }
}

/// An inbound JSON-RPC envelope.
///
/// Calls and notifications share this shape; which one it is depends on
/// the `id` member, see [`crate::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::types::deserialize_present_id"
    )]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcRequest {
    pub fn new(id: Option<RequestId>, method: impl Into<String>, params: Option<RequestParams>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            method: method.into(),
            params,
        }
    }

    /// A call with an id.
    pub fn call(id: impl Into<RequestId>, method: impl Into<String>, params: Option<RequestParams>) -> Self {
        Self::new(Some(id.into()), method, params)
    }

    /// An id-less envelope. Only classified as a notification when it also
    /// carries `params`.
    pub fn notification(method: impl Into<String>, params: RequestParams) -> Self {
        Self::new(None, method, Some(params))
    }

    /// Get a parameter by name (if params are an object)
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.get(name)
    }

    /// Get a parameter by index (if params are an array)
    pub fn get_param_index(&self, index: usize) -> Option<&Value> {
        self.params.as_ref()?.get_index(index)
    }
}
