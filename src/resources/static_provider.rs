//! Table-driven resource provider
//!
//! Serves fixed JSON documents by exact URI, plus pattern routes whose content is
//! rendered from the captured URI parameters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    ProviderInfo, ResourceContent, ResourceInfo, ResourceList, ResourceProvider, UriMatch,
    UriParser,
};
use crate::errors::ResourceError;

type Renderer = Arc<dyn Fn(&UriMatch) -> Result<Value, ResourceError> + Send + Sync>;

struct Document {
    uri: String,
    name: String,
    description: Option<String>,
    content: Value,
}

struct Route {
    name: String,
    template: String,
    description: Option<String>,
    render: Renderer,
}

pub struct StaticResourceProvider {
    name: String,
    description: String,
    version: String,
    documents: Vec<Document>,
    routes: Vec<Route>,
    parser: UriParser,
}

impl StaticResourceProvider {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            documents: Vec::new(),
            routes: Vec::new(),
            parser: UriParser::new(),
        }
    }

    pub fn with_document(
        mut self,
        uri: impl Into<String>,
        name: impl Into<String>,
        description: Option<&str>,
        content: Value,
    ) -> Self {
        self.documents.push(Document {
            uri: uri.into(),
            name: name.into(),
            description: description.map(str::to_string),
            content,
        });
        self
    }

    /// Adds a route matched by `pattern` and listed as `template`.
    pub fn with_route<F>(
        mut self,
        name: &str,
        pattern: &str,
        template: &str,
        description: Option<&str>,
        render: F,
    ) -> Result<Self, ResourceError>
    where
        F: Fn(&UriMatch) -> Result<Value, ResourceError> + Send + Sync + 'static,
    {
        self.parser.add_pattern(name, pattern)?;
        self.routes.push(Route {
            name: name.to_string(),
            template: template.to_string(),
            description: description.map(str::to_string),
            render: Arc::new(render),
        });
        Ok(self)
    }

    fn document(&self, uri: &str) -> Option<&Document> {
        self.documents.iter().find(|document| document.uri == uri)
    }

    fn route(&self, uri: &str) -> Result<(&Route, UriMatch), ResourceError> {
        let matched = self.parser.parse_uri(uri)?;
        let route = self
            .routes
            .iter()
            .find(|route| route.name == matched.pattern)
            .ok_or_else(|| ResourceError::NotFound {
                uri: uri.to_string(),
            })?;
        Ok((route, matched))
    }
}

#[async_trait]
impl ResourceProvider for StaticResourceProvider {
    async fn get_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
        if let Some(document) = self.document(uri) {
            let mut content = ResourceContent::json(uri, &document.name, document.content.clone());
            content.description = document.description.clone();
            return Ok(content);
        }

        let (route, matched) = self.route(uri)?;
        let mut content = ResourceContent::json(uri, &route.name, (route.render)(&matched)?);
        content.description = route.description.clone();
        Ok(content)
    }

    async fn list_resources(&self, _cursor: Option<&str>) -> Result<ResourceList, ResourceError> {
        let resources: Vec<ResourceInfo> = self
            .documents
            .iter()
            .map(|document| {
                ResourceInfo::new(&document.uri, &document.name)
                    .with_description(document.description.clone())
            })
            .chain(self.routes.iter().map(|route| {
                ResourceInfo::new(&route.template, &route.name)
                    .with_description(route.description.clone())
            }))
            .collect();

        Ok(ResourceList {
            total: resources.len(),
            resources,
            next_cursor: None,
        })
    }

    async fn get_resource_info(&self, uri: &str) -> Result<ResourceInfo, ResourceError> {
        if let Some(document) = self.document(uri) {
            return Ok(ResourceInfo::new(uri, &document.name)
                .with_description(document.description.clone()));
        }

        let (route, _) = self.route(uri)?;
        Ok(ResourceInfo::new(uri, &route.name).with_description(route.description.clone()))
    }

    fn supports_uri(&self, uri: &str) -> bool {
        self.document(uri).is_some() || self.parser.matches(uri)
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            uri_patterns: self
                .documents
                .iter()
                .map(|document| document.uri.clone())
                .chain(self.routes.iter().map(|route| route.template.clone()))
                .collect(),
        }
    }
}
