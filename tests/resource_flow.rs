use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use mcp_resource_server::{
    errors::ResourceError,
    mcp::{rpc::RESOURCE_NOT_FOUND, server::handle_message_bytes, tools::NoToolBackend},
    resources::{
        ProviderInfo, ResourceCache, ResourceContent, ResourceInfo, ResourceList, ResourceManager,
        ResourceProvider, UriParser,
    },
    AppState,
};
use serde_json::{json, Value};

struct WidgetProvider {
    parser: UriParser,
    calls: AtomicUsize,
}

impl WidgetProvider {
    fn new() -> Self {
        Self {
            parser: UriParser::new()
                .with_pattern("widget", "^/widget/(?P<id>[^/]+)$")
                .expect("valid pattern"),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProvider for WidgetProvider {
    async fn get_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let matched = self.parser.parse_uri(uri)?;
        Ok(ResourceContent::json(
            uri,
            "Widget",
            json!({ "id": matched.params["id"], "kind": "widget" }),
        ))
    }

    async fn list_resources(&self, _cursor: Option<&str>) -> Result<ResourceList, ResourceError> {
        Ok(ResourceList {
            resources: vec![ResourceInfo::new("/widget/{id}", "Widget")],
            next_cursor: None,
            total: 1,
        })
    }

    async fn get_resource_info(&self, uri: &str) -> Result<ResourceInfo, ResourceError> {
        Ok(ResourceInfo::new(uri, "Widget"))
    }

    fn supports_uri(&self, uri: &str) -> bool {
        self.parser.matches(uri)
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "widgets".to_string(),
            description: "Widget catalogue".to_string(),
            version: "1.0.0".to_string(),
            uri_patterns: vec!["/widget/{id}".to_string()],
        }
    }
}

fn manager_with_widgets() -> (Arc<ResourceManager>, Arc<WidgetProvider>) {
    let manager = Arc::new(ResourceManager::new(ResourceCache::new(
        100,
        Duration::from_secs(300),
    )));
    let provider = Arc::new(WidgetProvider::new());
    manager.register_provider("widgets", provider.clone());
    (manager, provider)
}

#[tokio::test]
async fn second_read_is_served_from_cache() {
    let (manager, provider) = manager_with_widgets();

    let first = manager.get_resource("/widget/42").await.expect("first read");
    let second = manager.get_resource("/widget/42").await.expect("second read");

    assert_eq!(provider.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(second.content["id"], "42");
    assert_eq!(manager.cache_stats().entries, 1);
}

#[tokio::test]
async fn unknown_uri_makes_no_provider_calls() {
    let (manager, provider) = manager_with_widgets();

    let err = manager
        .get_resource("/nope/1")
        .await
        .expect_err("no provider claims the URI");

    assert!(matches!(err, ResourceError::NoProvider { ref uri } if uri == "/nope/1"));
    assert!(err.is_terminal());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_fetched_again() {
    let manager = Arc::new(ResourceManager::new(ResourceCache::new(
        100,
        Duration::from_secs(10),
    )));
    let provider = Arc::new(WidgetProvider::new());
    manager.register_provider("widgets", provider.clone());

    manager.get_resource("/widget/1").await.expect("cold read");
    tokio::time::advance(Duration::from_secs(11)).await;
    manager.get_resource("/widget/1").await.expect("read after expiry");

    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn resources_read_dispatches_through_json_rpc() {
    let (manager, provider) = manager_with_widgets();
    let state = AppState::new(manager, Arc::new(NoToolBackend));

    let request = json!({
        "jsonrpc": "2.0",
        "id": "read-1",
        "method": "resources/read",
        "params": { "uri": "/widget/7" }
    });
    let response = handle_message_bytes(&state, request.to_string().as_bytes())
        .await
        .expect("response");

    assert_eq!(response["id"], "read-1");
    let text = response["result"]["contents"][0]["text"]
        .as_str()
        .expect("text content");
    let body: Value = serde_json::from_str(text).expect("json text");
    assert_eq!(body, json!({ "id": "7", "kind": "widget" }));

    let missing = json!({
        "jsonrpc": "2.0",
        "id": "read-2",
        "method": "resources/read",
        "params": { "uri": "/nope/1" }
    });
    let response = handle_message_bytes(&state, missing.to_string().as_bytes())
        .await
        .expect("response");
    assert_eq!(response["error"]["code"], RESOURCE_NOT_FOUND);
    assert_eq!(response["error"]["data"]["details"]["uri"], "/nope/1");
    assert_eq!(provider.calls(), 1);
}
