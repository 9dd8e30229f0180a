//! URI-addressed resources served through pluggable providers
//!
//! [`manager::ResourceManager`] is the single entry point. It validates the URI,
//! consults [`cache::ResourceCache`], and on a miss hands the request to the first
//! registered [`ResourceProvider`] that claims the URI.

pub mod cache;
pub mod manager;
pub mod static_provider;
pub mod uri;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::ResourceError;

pub use cache::{CacheStats, ResourceCache};
pub use manager::ResourceManager;
pub use static_provider::StaticResourceProvider;
pub use uri::{UriMatch, UriParser};

pub const JSON_MIME_TYPE: &str = "application/json";

/// A resolved resource. The manager and cache never look inside `content`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mime_type: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl ResourceContent {
    pub fn json(uri: impl Into<String>, name: impl Into<String>, content: Value) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: JSON_MIME_TYPE.to_string(),
            content,
            metadata: Map::new(),
            last_modified: Utc::now(),
            etag: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Body as text: strings verbatim, anything else as compact JSON.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ResourceInfo {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: JSON_MIME_TYPE.to_string(),
            size: None,
            last_modified: None,
            tags: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

impl From<&ResourceContent> for ResourceInfo {
    fn from(content: &ResourceContent) -> Self {
        Self {
            uri: content.uri.clone(),
            name: content.name.clone(),
            description: content.description.clone(),
            mime_type: content.mime_type.clone(),
            size: Some(content.text().len() as u64),
            last_modified: Some(content.last_modified),
            tags: Vec::new(),
            metadata: content.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    pub resources: Vec<ResourceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub uri_patterns: Vec<String>,
}

/// A source of resources. Implementations are expected to be idempotent: a cold URI
/// requested concurrently may be fetched more than once.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn get_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError>;

    async fn list_resources(&self, cursor: Option<&str>) -> Result<ResourceList, ResourceError>;

    async fn get_resource_info(&self, uri: &str) -> Result<ResourceInfo, ResourceError>;

    fn supports_uri(&self, uri: &str) -> bool;

    fn provider_info(&self) -> ProviderInfo;
}
