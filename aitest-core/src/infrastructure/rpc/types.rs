use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Outgoing request or notification. Notifications carry no `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn call(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(Value::from(id)),
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    pub fn method_not_found(id: Option<Value>, method: &str) -> Self {
        Self::error(
            id,
            METHOD_NOT_FOUND,
            format!("client does not implement method '{method}'"),
        )
    }
}

/// A message received from a server, sorted by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response {
        id: Value,
        outcome: Result<Value, RpcError>,
    },
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl Inbound {
    /// Sort a decoded JSON value. Anything without `id` or `method` is `None`.
    pub fn classify(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let method = map
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let params = map.remove("params").unwrap_or(Value::Null);

        match (map.remove("id"), method) {
            (Some(id), Some(method)) if !id.is_null() => Some(Inbound::Request { id, method, params }),
            (_, Some(method)) => Some(Inbound::Notification { method, params }),
            (Some(id), None) => Some(Inbound::Response {
                id,
                outcome: response_outcome(map),
            }),
            (None, None) => None,
        }
    }
}

fn response_outcome(mut map: JsonMap<String, Value>) -> Result<Value, RpcError> {
    if let Some(error) = map.remove("error").filter(|value| !value.is_null()) {
        return Err(serde_json::from_value(error).unwrap_or_else(|_| RpcError {
            code: -32000,
            message: "missing error payload in response".to_string(),
            data: None,
        }));
    }
    Ok(map.remove("result").unwrap_or(Value::Null))
}

/// Extract the numeric request id used for correlation.
pub fn numeric_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
