//! JSON-RPC 2.0 wire types.

use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Incoming message. `id: None` means the field was absent (a notification);
/// an explicit `null` id is kept as `Some(Value::Null)` and still gets a reply.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: Option<String>,
    pub params: Value,
}

impl RpcRequest {
    /// Read the envelope fields from a parsed message. Returns `None` for non-objects.
    pub fn from_value(msg: &Value) -> Option<Self> {
        let obj = msg.as_object()?;
        Some(Self {
            jsonrpc: obj.get("jsonrpc").and_then(Value::as_str).map(str::to_string),
            id: obj.get("id").cloned(),
            method: obj.get("method").and_then(Value::as_str).map(str::to_string),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outgoing response: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
