//! JSON-RPC method dispatch
//!
//! Decodes MCP messages, validates request shapes against the schema types, and
//! routes `initialize`, `ping`, `resources/*` and `tools/*` to the resource manager
//! and tool backend held in [`AppState`].

use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolRequestParams, Implementation, InitializeRequest, InitializeResult,
    JsonrpcMessage, JsonrpcRequest, ListResourcesRequest, ListResourcesResult, ListToolsRequest,
    ListToolsResult, PingRequest, ProtocolVersion, ReadResourceContent, ReadResourceRequest,
    ReadResourceRequestParams, ReadResourceResult, Resource, ServerCapabilities,
    ServerCapabilitiesResources, ServerCapabilitiesTools, TextResourceContents,
};
use serde_json::{json, Value};
use tracing::info;

use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
    json_rpc_result_from, request_id_to_value, resource_error_to_json_rpc, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::resources::ResourceInfo;
use crate::{errors::AppError, AppState};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Handles one raw transport message.
///
/// Returns `None` when nothing should be written back: a notification, or a
/// batch made only of notifications.
pub async fn handle_message_bytes(state: &AppState, bytes: &[u8]) -> Option<Value> {
    let payload: Value = match serde_json::from_slice(bytes) {
        Ok(payload) => payload,
        Err(_) => return Some(json_rpc_error(None, PARSE_ERROR, "Parse error")),
    };

    match payload {
        Value::Array(items) if items.is_empty() => {
            Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"))
        }
        Value::Array(items) => {
            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                if let Some(response) = handle_json_rpc_value(state, item).await {
                    responses.push(response);
                }
            }
            (!responses.is_empty()).then_some(Value::Array(responses))
        }
        payload => handle_json_rpc_value(state, payload).await,
    }
}

pub async fn handle_json_rpc_value(state: &AppState, payload: Value) -> Option<Value> {
    if !payload.is_object() {
        return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
    }

    let request_id = payload.get("id").cloned();
    let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")),
    };

    match parsed {
        JsonrpcMessage::Request(request) => {
            if let Err(error_response) = validate_request_shape(&request) {
                return Some(error_response);
            }

            let request_id = request_id_to_value(request.id);
            if request.method.trim().is_empty() {
                return Some(json_rpc_error(
                    Some(request_id),
                    INVALID_REQUEST,
                    "Invalid Request",
                ));
            }

            Some(
                handle_json_rpc_request(
                    state,
                    Some(request_id),
                    request.method,
                    request.params.map(Value::Object),
                )
                .await,
            )
        }
        JsonrpcMessage::Notification(notification) => {
            if notification.method.trim().is_empty() {
                return None;
            }

            let _ = handle_json_rpc_request(
                state,
                None,
                notification.method,
                notification.params.map(Value::Object),
            )
            .await;
            None
        }
        JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => Some(
            json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"),
        ),
    }
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let request_id = Some(request_id_to_value(request.id.clone()));
    let payload = serde_json::to_value(request)
        .map_err(|_| json_rpc_error(request_id.clone(), INVALID_REQUEST, "Invalid Request"))?;

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "resources/read" => serde_json::from_value::<ReadResourceRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "resources/list" => serde_json::from_value::<ListResourcesRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

pub async fn handle_json_rpc_request(
    state: &AppState,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
) -> Value {
    let audit_params = redact_audit_params(params.as_ref());

    let response = match method.as_str() {
        "initialize" => match negotiate_protocol_version(params.as_ref()) {
            Ok(protocol_version) => json_rpc_result_from(id, &initialize_result(protocol_version)),
            Err(err) => app_error_to_json_rpc(id, err),
        },
        "ping" => json_rpc_result(id, json!({})),
        "tools/list" => json_rpc_result_from(
            id,
            &ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: state.tools.list_tools(),
            },
        ),
        "tools/call" => handle_tools_call(state, id, params).await,
        "resources/list" => handle_resources_list(state, id, params.as_ref()).await,
        "resources/read" => handle_resources_read(state, id, params).await,
        _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
    };

    info!(
        method = %method,
        params = %audit_params,
        outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
        "mcp action audited"
    );

    response
}

fn initialize_result(protocol_version: ProtocolVersion) -> InitializeResult {
    InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: Some(ServerCapabilitiesResources {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            prompts: None,
            ..Default::default()
        },
        protocol_version: protocol_version.into(),
        instructions: None,
        meta: None,
    }
}

async fn handle_resources_list(state: &AppState, id: Option<Value>, params: Option<&Value>) -> Value {
    let cursor = params
        .and_then(|params| params.get("cursor"))
        .and_then(Value::as_str);
    let list = state.resources.list_resources(cursor).await;

    json_rpc_result_from(
        id,
        &ListResourcesResult {
            meta: None,
            next_cursor: list.next_cursor,
            resources: list.resources.into_iter().map(to_schema_resource).collect(),
        },
    )
}

async fn handle_resources_read(state: &AppState, id: Option<Value>, params: Option<Value>) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };
    let read: ReadResourceRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    match state.resources.get_resource(&read.uri).await {
        Ok(content) => json_rpc_result_from(
            id,
            &ReadResourceResult {
                contents: vec![ReadResourceContent::from(TextResourceContents {
                    meta: None,
                    mime_type: Some(content.mime_type.clone()),
                    text: content.text(),
                    uri: content.uri.clone(),
                })],
                meta: None,
            },
        ),
        Err(err) => resource_error_to_json_rpc(id, &err),
    }
}

async fn handle_tools_call(state: &AppState, id: Option<Value>, params: Option<Value>) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };
    let call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    match state.tools.call_tool(call).await {
        Ok(result) => json_rpc_result_from(id, &result),
        Err(err) => app_error_to_json_rpc(id, err),
    }
}

fn to_schema_resource(info: ResourceInfo) -> Resource {
    Resource {
        annotations: None,
        description: info.description,
        icons: vec![],
        meta: None,
        mime_type: Some(info.mime_type),
        name: info.name,
        size: info.size.and_then(|size| size.try_into().ok()),
        title: None,
        uri: info.uri,
    }
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        return Err(AppError::bad_request(
            "unsupported_protocol_version",
            "unsupported initialize protocolVersion",
        ));
    }

    Ok(ProtocolVersion::V2024_11_05)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || ["token", "secret", "password", "credential"]
        .iter()
        .any(|needle| normalized.contains(needle))
}
