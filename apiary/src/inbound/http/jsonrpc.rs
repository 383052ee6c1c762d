//! JSON-RPC 2.0 envelope for the read gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ports::StoreError;

/// Standard JSON-RPC error codes used by the gateway.
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;

/// Incoming request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Outgoing response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: error.code,
                message: error.message,
            }),
        }
    }
}

/// Method-level failure carried back to the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_REQUEST,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("unknown method {method:?}"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            code: SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StoreError> for RpcError {
    fn from(error: StoreError) -> Self {
        Self::server_error(error.to_string())
    }
}

/// Extract a required positional-or-named parameter.
///
/// Positional params index into the array; named params look up `name` in
/// the object, following the historical API's dual convention.
pub fn param<T: serde::de::DeserializeOwned>(
    params: &Value,
    index: usize,
    name: &str,
) -> Result<T, RpcError> {
    opt_param(params, index, name)?
        .ok_or_else(|| RpcError::invalid_params(format!("missing parameter {name:?}")))
}

/// Extract an optional positional-or-named parameter; JSON `null` counts as
/// absent.
pub fn opt_param<T: serde::de::DeserializeOwned>(
    params: &Value,
    index: usize,
    name: &str,
) -> Result<Option<T>, RpcError> {
    let slot = match params {
        Value::Array(items) => items.get(index),
        Value::Object(map) => map.get(name),
        Value::Null => None,
        _ => return Err(RpcError::invalid_params("params must be array or object")),
    };
    match slot {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|err| RpcError::invalid_params(format!("bad parameter {name:?}: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn positional_and_named_params_are_equivalent() {
        let positional = json!(["alice", 20]);
        let named = json!({"account": "alice", "limit": 20});
        for params in [positional, named] {
            let account: String = param(&params, 0, "account").expect("account");
            let limit: Option<u32> = opt_param(&params, 1, "limit").expect("limit");
            assert_eq!(account, "alice");
            assert_eq!(limit, Some(20));
        }
    }

    #[test]
    fn null_parameters_count_as_absent() {
        let params = json!(["alice", null]);
        let limit: Option<u32> = opt_param(&params, 1, "limit").expect("parses");
        assert_eq!(limit, None);
    }

    #[test]
    fn missing_required_parameter_is_invalid_params() {
        let error = param::<String>(&json!([]), 0, "account").expect_err("fails");
        assert_eq!(error.code, INVALID_PARAMS);
    }

    #[test]
    fn scalar_params_are_rejected() {
        let error = opt_param::<u32>(&json!(42), 0, "limit").expect_err("fails");
        assert_eq!(error.code, INVALID_PARAMS);
    }
}
