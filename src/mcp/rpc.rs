//! JSON-RPC envelope helpers
//!
//! Builds result and error envelopes and maps [`AppError`] and [`ResourceError`]
//! onto JSON-RPC error codes.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{AppError, ResourceError};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNAUTHORIZED: i32 = -32001;
pub const RESOURCE_NOT_FOUND: i32 = -32002;

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

fn error_data(code: &str, message: String, details: Value) -> Option<Value> {
    Some(json!({
        "code": code,
        "message": message,
        "details": details,
    }))
}

pub fn app_error_to_json_rpc(id: Option<Value>, err: AppError) -> Value {
    match err {
        AppError::BadRequest { code, message } => json_rpc_error_with_data(
            id,
            INVALID_PARAMS,
            "Invalid params",
            error_data(code, message, json!({})),
        ),
        AppError::NotFound { code, message } => json_rpc_error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            error_data(code, message, json!({})),
        ),
        AppError::Unauthorized { code, message } => json_rpc_error_with_data(
            id,
            UNAUTHORIZED,
            "Unauthorized",
            error_data(code, message.to_string(), json!({})),
        ),
        AppError::ServiceUnavailable { code, message } => json_rpc_error_with_data(
            id,
            INTERNAL_ERROR,
            "Internal error",
            error_data(code, message, json!({})),
        ),
        AppError::Internal { .. } => json_rpc_error(id, INTERNAL_ERROR, "Internal error"),
    }
}

/// Unknown or malformed URIs are terminal client errors. Anything a provider
/// reported, whatever its cause, is internal.
pub fn resource_error_to_json_rpc(id: Option<Value>, err: &ResourceError) -> Value {
    let mut details = serde_json::Map::new();
    if let Some(uri) = err.uri() {
        details.insert("uri".to_string(), json!(uri));
    }
    if let ResourceError::Provider { provider, .. } = err {
        details.insert("provider".to_string(), json!(provider));
    }
    let data = error_data(err.code(), err.to_string(), Value::Object(details));

    let provider_failure = matches!(err, ResourceError::Provider { .. });
    if !provider_failure && err.is_terminal() {
        json_rpc_error_with_data(id, RESOURCE_NOT_FOUND, "Resource not found", data)
    } else {
        json_rpc_error_with_data(id, INTERNAL_ERROR, "Internal error", data)
    }
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data: data.clone(),
            message: message.to_string(),
        },
        id.as_ref().and_then(value_to_request_id),
    );

    serde_json::to_value(response).unwrap_or_else(|_| {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message, "data": data },
        })
    })
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        if let Ok(value) = serde_json::to_value(response) {
            return value;
        }
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

/// Serializes a protocol result, answering with an internal error if that fails.
pub fn json_rpc_result_from<T: Serialize>(id: Option<Value>, result: &T) -> Value {
    match serde_json::to_value(result) {
        Ok(value) => json_rpc_result(id, value),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize result");
            json_rpc_error(id, INTERNAL_ERROR, "Internal error")
        }
    }
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}
