use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    CacheStats, ProviderInfo, ResourceCache, ResourceContent, ResourceInfo, ResourceList,
    ResourceProvider, UriParser,
};
use crate::{config::Config, errors::ResourceError};

#[derive(Clone)]
struct RegisteredProvider {
    name: String,
    provider: Arc<dyn ResourceProvider>,
}

/// Routes resource requests to registered providers through a shared cache.
///
/// Providers are consulted in registration order and always called without any
/// internal lock held.
pub struct ResourceManager {
    providers: RwLock<Vec<RegisteredProvider>>,
    cache: Arc<ResourceCache>,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(ResourceCache::default())
    }
}

impl ResourceManager {
    pub fn new(cache: ResourceCache) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            cache: Arc::new(cache),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ResourceCache::new(
            config.resource_cache_max_entries,
            config.resource_cache_ttl,
        ))
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn spawn_cache_sweeper(&self, period: Duration, stop: CancellationToken) -> JoinHandle<()> {
        self.cache.spawn_sweeper(period, stop)
    }

    /// Registers `provider` under `name`. An existing registration with the same
    /// name is replaced and keeps its position.
    pub fn register_provider(&self, name: impl Into<String>, provider: Arc<dyn ResourceProvider>) {
        let name = name.into();
        let patterns = provider.provider_info().uri_patterns;

        let replaced = {
            let mut providers = self.providers.write();
            match providers.iter_mut().find(|entry| entry.name == name) {
                Some(entry) => {
                    entry.provider = provider;
                    true
                }
                None => {
                    providers.push(RegisteredProvider {
                        name: name.clone(),
                        provider,
                    });
                    false
                }
            }
        };

        info!(provider = %name, patterns = ?patterns, replaced, "registered resource provider");
    }

    pub async fn get_resource(&self, uri: &str) -> Result<Arc<ResourceContent>, ResourceError> {
        UriParser::validate_uri(uri)?;

        if let Some(cached) = self.cache.get(uri) {
            return Ok(cached);
        }

        let registered = self.find_provider(uri)?;
        let content = registered
            .provider
            .get_resource(uri)
            .await
            .map_err(|source| ResourceError::Provider {
                uri: uri.to_string(),
                provider: registered.name.clone(),
                source: Box::new(source),
            })?;

        let content = Arc::new(content);
        self.cache
            .set(uri, Arc::clone(&content), self.cache.default_ttl());
        info!(
            uri,
            provider = %registered.name,
            size = content.text().len(),
            "resource retrieved"
        );
        Ok(content)
    }

    /// Concatenates every provider's listing. A provider that fails is skipped.
    pub async fn list_resources(&self, cursor: Option<&str>) -> ResourceList {
        let mut resources = Vec::new();
        for registered in self.snapshot() {
            match registered.provider.list_resources(cursor).await {
                Ok(list) => resources.extend(list.resources),
                Err(err) => warn!(
                    provider = %registered.name,
                    error = %err,
                    "failed to list resources from provider"
                ),
            }
        }

        debug!(count = resources.len(), "listed resources");
        ResourceList {
            total: resources.len(),
            resources,
            next_cursor: None,
        }
    }

    pub async fn get_resource_info(&self, uri: &str) -> Result<ResourceInfo, ResourceError> {
        UriParser::validate_uri(uri)?;

        let registered = self.find_provider(uri)?;
        registered
            .provider
            .get_resource_info(uri)
            .await
            .map_err(|source| ResourceError::Provider {
                uri: uri.to_string(),
                provider: registered.name.clone(),
                source: Box::new(source),
            })
    }

    pub fn provider_info(&self) -> Vec<ProviderInfo> {
        self.snapshot()
            .iter()
            .map(|registered| registered.provider.provider_info())
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn snapshot(&self) -> Vec<RegisteredProvider> {
        self.providers.read().clone()
    }

    fn find_provider(&self, uri: &str) -> Result<RegisteredProvider, ResourceError> {
        self.snapshot()
            .into_iter()
            .find(|registered| registered.provider.supports_uri(uri))
            .ok_or_else(|| ResourceError::NoProvider {
                uri: uri.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct FixedProvider {
        name: &'static str,
        prefix: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(name: &'static str, prefix: &'static str) -> Self {
            Self {
                name,
                prefix,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str, prefix: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, prefix)
            }
        }
    }

    #[async_trait]
    impl ResourceProvider for FixedProvider {
        async fn get_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResourceError::Backend {
                    uri: uri.to_string(),
                    message: "upstream unavailable".to_string(),
                });
            }
            Ok(ResourceContent::json(uri, self.name, json!({ "from": self.name })))
        }

        async fn list_resources(&self, _cursor: Option<&str>) -> Result<ResourceList, ResourceError> {
            if self.fail {
                return Err(ResourceError::Backend {
                    uri: self.prefix.to_string(),
                    message: "listing unavailable".to_string(),
                });
            }
            Ok(ResourceList {
                resources: vec![ResourceInfo::new(format!("{}{{id}}", self.prefix), self.name)],
                next_cursor: None,
                total: 99,
            })
        }

        async fn get_resource_info(&self, uri: &str) -> Result<ResourceInfo, ResourceError> {
            Ok(ResourceInfo::new(uri, self.name))
        }

        fn supports_uri(&self, uri: &str) -> bool {
            uri.starts_with(self.prefix)
        }

        fn provider_info(&self) -> ProviderInfo {
            ProviderInfo {
                name: self.name.to_string(),
                description: "fixed test provider".to_string(),
                version: "1.0.0".to_string(),
                uri_patterns: vec![format!("{}{{id}}", self.prefix)],
            }
        }
    }

    #[tokio::test]
    async fn provider_errors_are_wrapped_and_not_cached() {
        let manager = ResourceManager::default();
        let provider = Arc::new(FixedProvider::failing("flaky", "/flaky/"));
        manager.register_provider("flaky", provider.clone());

        for _ in 0..2 {
            let err = manager
                .get_resource("/flaky/1")
                .await
                .expect_err("provider failure should surface");
            assert!(matches!(
                &err,
                ResourceError::Provider { uri, provider, .. } if uri == "/flaky/1" && provider == "flaky"
            ));
            assert!(!err.is_terminal());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(manager.cache().is_empty());
    }

    #[tokio::test]
    async fn malformed_uri_is_rejected_before_dispatch() {
        let manager = ResourceManager::default();
        let provider = Arc::new(FixedProvider::new("any", ""));
        manager.register_provider("any", provider.clone());

        let err = manager
            .get_resource("widget/1")
            .await
            .expect_err("relative URI is invalid");
        assert!(matches!(err, ResourceError::InvalidUri { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_registered_provider_handles_overlap() {
        let manager = ResourceManager::default();
        manager.register_provider("specific", Arc::new(FixedProvider::new("specific", "/widget/")));
        manager.register_provider("general", Arc::new(FixedProvider::new("general", "/")));

        let content = manager.get_resource("/widget/1").await.expect("resolved");
        assert_eq!(content.name, "specific");
        let content = manager.get_resource("/gadget/1").await.expect("resolved");
        assert_eq!(content.name, "general");
    }

    #[tokio::test]
    async fn listing_skips_failed_providers_and_recounts() {
        let manager = ResourceManager::default();
        manager.register_provider("widgets", Arc::new(FixedProvider::new("widgets", "/widget/")));
        manager.register_provider("broken", Arc::new(FixedProvider::failing("broken", "/broken/")));
        manager.register_provider("gadgets", Arc::new(FixedProvider::new("gadgets", "/gadget/")));

        let list = manager.list_resources(None).await;
        assert_eq!(list.total, 2);
        assert_eq!(
            list.resources.iter().map(|info| info.uri.as_str()).collect::<Vec<_>>(),
            vec!["/widget/{id}", "/gadget/{id}"]
        );
    }

    #[tokio::test]
    async fn re_registering_replaces_in_place() {
        let manager = ResourceManager::default();
        manager.register_provider("a", Arc::new(FixedProvider::new("a-v1", "/a/")));
        manager.register_provider("b", Arc::new(FixedProvider::new("b", "/b/")));
        manager.register_provider("a", Arc::new(FixedProvider::new("a-v2", "/a/")));

        let names: Vec<String> = manager
            .provider_info()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["a-v2", "b"]);
    }

    #[tokio::test]
    async fn resource_info_requires_a_provider() {
        let manager = ResourceManager::default();
        manager.register_provider("widgets", Arc::new(FixedProvider::new("widgets", "/widget/")));

        let info = manager.get_resource_info("/widget/7").await.expect("info");
        assert_eq!(info.uri, "/widget/7");
        assert!(matches!(
            manager.get_resource_info("/nope/1").await,
            Err(ResourceError::NoProvider { .. })
        ));
    }
}
