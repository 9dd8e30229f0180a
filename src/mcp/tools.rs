//! Tool execution backends
//!
//! The protocol layer only moves `tools/list` and `tools/call` payloads to a
//! [`ToolBackend`]; tool semantics live behind it.

use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{errors::AppError, resources::ResourceManager};

#[async_trait]
pub trait ToolBackend: Send + Sync {
    fn list_tools(&self) -> Vec<Tool>;

    async fn call_tool(&self, params: CallToolRequestParams) -> Result<CallToolResult, AppError>;
}

/// Backend with no tools; every call is a `tool_not_found` error.
pub struct NoToolBackend;

#[async_trait]
impl ToolBackend for NoToolBackend {
    fn list_tools(&self) -> Vec<Tool> {
        Vec::new()
    }

    async fn call_tool(&self, params: CallToolRequestParams) -> Result<CallToolResult, AppError> {
        Err(unknown_tool(&params.name))
    }
}

#[macros::mcp_tool(
    name = "list_providers",
    description = "List registered resource providers and resource cache statistics"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct ListProvidersTool {
    pub name_contains: Option<String>,
}

#[macros::mcp_tool(
    name = "describe_resource",
    description = "Describe the resource behind a URI without fetching its content"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct DescribeResourceTool {
    pub uri: String,
}

/// Introspection tools over the resource layer.
pub struct ResourceTools {
    resources: Arc<ResourceManager>,
}

impl ResourceTools {
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self { resources }
    }

    fn list_providers(&self, args: ListProvidersTool) -> CallToolResult {
        let needle = args
            .name_contains
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty());
        let providers: Vec<_> = self
            .resources
            .provider_info()
            .into_iter()
            .filter(|info| {
                needle
                    .as_deref()
                    .map_or(true, |needle| info.name.to_ascii_lowercase().contains(needle))
            })
            .collect();

        tool_result(
            format!("Returned {} resource providers", providers.len()),
            Map::from_iter([
                ("providers".to_string(), json!(providers)),
                ("cache".to_string(), json!(self.resources.cache_stats())),
            ]),
            false,
        )
    }

    async fn describe_resource(&self, args: DescribeResourceTool) -> CallToolResult {
        match self.resources.get_resource_info(&args.uri).await {
            Ok(info) => tool_result(
                format!("Resource {} is available", info.uri),
                Map::from_iter([("resource".to_string(), json!(info))]),
                false,
            ),
            Err(err) => tool_result(
                err.to_string(),
                Map::from_iter([
                    ("code".to_string(), json!(err.code())),
                    ("uri".to_string(), json!(args.uri)),
                ]),
                true,
            ),
        }
    }
}

#[async_trait]
impl ToolBackend for ResourceTools {
    fn list_tools(&self) -> Vec<Tool> {
        vec![ListProvidersTool::tool(), DescribeResourceTool::tool()]
    }

    async fn call_tool(&self, params: CallToolRequestParams) -> Result<CallToolResult, AppError> {
        let arguments = json!(params.arguments.unwrap_or_default());
        match params.name.as_str() {
            "list_providers" => Ok(self.list_providers(parse_arguments(arguments)?)),
            "describe_resource" => Ok(self.describe_resource(parse_arguments(arguments)?).await),
            other => Err(unknown_tool(other)),
        }
    }
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, AppError> {
    serde_json::from_value(arguments)
        .map_err(|err| AppError::bad_request("invalid_arguments", err.to_string()))
}

fn unknown_tool(name: &str) -> AppError {
    AppError::not_found("tool_not_found", format!("unknown tool name: {name}"))
}

fn tool_result(text: String, structured: Map<String, Value>, is_error: bool) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: is_error.then_some(true),
        meta: None,
        structured_content: Some(structured),
    }
}
