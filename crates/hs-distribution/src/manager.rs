//! Dual-source distribution manager
//!
//! Resolves a bundle id through the cache and the appropriate sources:
//! free bundles try the direct source first with the registry as fallback,
//! paid bundles are registry-only and credential-gated up front. Every
//! successful fetch is handed to the cache before being returned.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::cache::BundleCache;
use crate::catalog::BundleCatalog;
use crate::direct::DirectFetcher;
use crate::registry::BundleRegistry;
use crate::types::{BundleInfo, DistributionError, PricingTier};

/// Orchestrates bundle resolution across cache, direct source, and registry
pub struct DistributionManager {
    catalog: BundleCatalog,
    cache: Arc<BundleCache>,
    registry: Option<Arc<dyn BundleRegistry>>,
    fetcher: DirectFetcher,
    credential: Option<String>,
}

impl DistributionManager {
    pub fn new(
        catalog: BundleCatalog,
        cache: Arc<BundleCache>,
        registry: Option<Arc<dyn BundleRegistry>>,
        credential: Option<String>,
        direct_token: Option<String>,
    ) -> Result<Self, DistributionError> {
        Ok(Self {
            catalog,
            cache,
            registry,
            fetcher: DirectFetcher::new(direct_token)?,
            credential,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.credential
            .as_ref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    pub fn can_access_registry(&self) -> bool {
        self.has_credential() && self.registry.is_some()
    }

    /// Resolve a bundle id to its payload.
    ///
    /// Returns the cached copy unless `force_refresh` is set; otherwise
    /// fetches per pricing tier and caches the result.
    pub async fn load_bundle(
        &self,
        bundle_id: &str,
        version: Option<&str>,
        force_refresh: bool,
    ) -> Result<Value, DistributionError> {
        info!("Loading bundle: {}", bundle_id);

        let bundle_info = self
            .catalog
            .get(bundle_id)
            .ok_or_else(|| DistributionError::NotFound(bundle_id.to_string()))?;

        if !force_refresh {
            if let Some(cached) = self.load_from_cache(bundle_id) {
                info!("Loaded bundle from cache: {}", bundle_id);
                return Ok(cached);
            }
        }

        match bundle_info.pricing_tier {
            PricingTier::Free => self.load_free_bundle(bundle_info, version).await,
            PricingTier::Paid | PricingTier::Enterprise => {
                self.load_paid_bundle(bundle_info, version).await
            }
        }
    }

    /// All catalog entries; access control is applied at load time
    pub fn list_available_bundles(&self) -> Vec<BundleInfo> {
        self.catalog.list().into_iter().cloned().collect()
    }

    pub fn get_bundle_info(&self, bundle_id: &str) -> Option<&BundleInfo> {
        self.catalog.get(bundle_id)
    }

    /// Remediation text explaining how to access a bundle
    pub fn access_message(&self, bundle_id: &str) -> String {
        let Some(info) = self.catalog.get(bundle_id) else {
            return format!("Bundle '{bundle_id}' not found.");
        };

        match info.pricing_tier {
            PricingTier::Free => match &info.direct_url {
                Some(url) => format!("Free bundle available at: {url}"),
                None => "Free bundle available for download.".to_string(),
            },
            tier => {
                if self.has_credential() {
                    "Paid bundle available with your API key.".to_string()
                } else {
                    format!(
                        "This is a {tier} bundle. Set the HYBRIDSCAN_API_KEY environment \
                         variable or visit https://hybridscan.dev/pricing for access."
                    )
                }
            }
        }
    }

    fn load_from_cache(&self, bundle_id: &str) -> Option<Value> {
        let path = self.cache.get_cached_bundle(bundle_id)?;
        match std::fs::read_to_string(&path).map_err(DistributionError::Io).and_then(
            |data| Ok(serde_json::from_str(&data)?),
        ) {
            Ok(value) => Some(value),
            Err(e) => {
                // A corrupt payload is dropped entirely, metadata included,
                // so the re-fetch writes a fresh copy instead of matching
                // the stale checksum and leaving the bad file in place.
                warn!("Cached bundle '{}' is unreadable, discarding: {}", bundle_id, e);
                if let Err(e) = self.cache.remove_bundle(bundle_id) {
                    warn!("Failed to discard corrupt cache entry '{}': {}", bundle_id, e);
                }
                None
            }
        }
    }

    /// Free tier: direct source first, registry fallback when available
    async fn load_free_bundle(
        &self,
        info: &BundleInfo,
        version: Option<&str>,
    ) -> Result<Value, DistributionError> {
        info!("Loading free bundle: {}", info.id);

        let direct_error = match self.fetcher.fetch_bundle(info).await {
            Ok(bundle_data) => {
                info!("Loaded bundle from direct source: {}", info.id);
                self.cache.cache_bundle(&info.id, &bundle_data)?;
                return Ok(bundle_data);
            }
            Err(e) => {
                warn!("Direct fetch failed for '{}': {}", info.id, e);
                e
            }
        };

        if self.can_access_registry() {
            match self.load_from_registry(info, version).await {
                Ok(bundle_data) => {
                    info!("Loaded bundle from registry fallback: {}", info.id);
                    return Ok(bundle_data);
                }
                Err(e) => error!("Registry fallback failed for '{}': {}", info.id, e),
            }
        }

        Err(DistributionError::Fetch {
            bundle_id: info.id.clone(),
            message: format!(
                "unable to load free bundle from its direct source ({direct_error}); \
                 check your internet connection or try again later. Source: {}",
                info.direct_url.as_deref().unwrap_or("unknown")
            ),
        })
    }

    /// Paid tier: registry only, credential required up front. No direct
    /// fallback and no network attempt without a credential.
    async fn load_paid_bundle(
        &self,
        info: &BundleInfo,
        version: Option<&str>,
    ) -> Result<Value, DistributionError> {
        info!("Loading paid bundle: {}", info.id);

        if !self.can_access_registry() {
            return Err(DistributionError::Access {
                bundle_id: info.id.clone(),
                message: format!(
                    "this is a {} bundle; set the HYBRIDSCAN_API_KEY environment \
                     variable or visit https://hybridscan.dev/pricing for access",
                    info.pricing_tier
                ),
            });
        }

        self.load_from_registry(info, version)
            .await
            .map_err(|e| DistributionError::Fetch {
                bundle_id: info.id.clone(),
                message: format!(
                    "unable to load paid bundle from registry ({e}); \
                     check your API key and internet connection"
                ),
            })
    }

    async fn load_from_registry(
        &self,
        info: &BundleInfo,
        version: Option<&str>,
    ) -> Result<Value, DistributionError> {
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| DistributionError::Registry("no registry client configured".into()))?;

        let bundle_data = registry.download_bundle(&info.id, version).await?;
        self.cache.cache_bundle(&info.id, &bundle_data)?;
        Ok(bundle_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::types::{BundleSource, SourceType};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct MockRegistry {
        calls: Mutex<u32>,
        payload: Value,
    }

    impl MockRegistry {
        fn new(payload: Value) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(0),
                payload,
            })
        }
    }

    #[async_trait]
    impl BundleRegistry for MockRegistry {
        async fn download_bundle(
            &self,
            _bundle_id: &str,
            _version: Option<&str>,
        ) -> Result<Value, DistributionError> {
            *self.calls.lock() += 1;
            Ok(self.payload.clone())
        }
    }

    fn test_cache(dir: &std::path::Path) -> Arc<BundleCache> {
        Arc::new(
            BundleCache::new(CacheConfig {
                cache_dir: Some(dir.to_path_buf()),
                ..CacheConfig::default()
            })
            .unwrap(),
        )
    }

    /// Free bundle whose direct URL fails fast without touching the network
    fn unreachable_free_catalog() -> BundleCatalog {
        let mut catalog = BundleCatalog::empty();
        catalog.register(BundleInfo {
            id: "free-bundle".to_string(),
            name: "Free Bundle".to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            pricing_tier: PricingTier::Free,
            category: "security".to_string(),
            tags: vec![],
            source: BundleSource {
                source_type: SourceType::Direct,
                location: "free-bundle".to_string(),
                requires_credential: false,
                fallback_available: true,
            },
            direct_url: Some("https://example.com/not/a/tree/url".to_string()),
        });
        catalog
    }

    #[tokio::test]
    async fn test_unknown_bundle_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            test_cache(dir.path()),
            None,
            None,
            None,
        )
        .unwrap();

        let err = manager.load_bundle("no-such-bundle", None, false).await;
        assert!(matches!(err, Err(DistributionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_paid_bundle_without_credential_never_touches_network() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MockRegistry::new(json!({}));
        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            test_cache(dir.path()),
            Some(registry.clone()),
            None, // no credential
            None,
        )
        .unwrap();

        let err = manager.load_bundle("owasp-llm-pro", None, false).await;
        assert!(matches!(err, Err(DistributionError::Access { .. })));
        assert_eq!(*registry.calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_paid_bundle_with_credential_downloads_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let payload = json!({"id": "owasp-llm-pro", "version": "1.0.0", "rules": []});
        let registry = MockRegistry::new(payload.clone());
        let cache = test_cache(dir.path());
        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            cache.clone(),
            Some(registry.clone()),
            Some("hs_test_key".to_string()),
            None,
        )
        .unwrap();

        let data = manager.load_bundle("owasp-llm-pro", None, false).await.unwrap();
        assert_eq!(data, payload);
        assert_eq!(*registry.calls.lock(), 1);
        assert!(cache.is_bundle_cached("owasp-llm-pro"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_registry() {
        let dir = tempfile::tempdir().unwrap();
        let payload = json!({"id": "owasp-llm-pro", "version": "1.0.0", "rules": []});
        let registry = MockRegistry::new(payload.clone());
        let cache = test_cache(dir.path());
        cache.cache_bundle("owasp-llm-pro", &payload).unwrap();

        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            cache,
            Some(registry.clone()),
            Some("hs_test_key".to_string()),
            None,
        )
        .unwrap();

        let data = manager.load_bundle("owasp-llm-pro", None, false).await.unwrap();
        assert_eq!(data, payload);
        assert_eq!(*registry.calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_cached_payload_is_repaired_by_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let payload = json!({"id": "owasp-llm-pro", "version": "1.0.0", "rules": []});
        let registry = MockRegistry::new(payload.clone());
        let cache = test_cache(dir.path());
        let path = cache.cache_bundle("owasp-llm-pro", &payload).unwrap();
        std::fs::write(&path, "{corrupt").unwrap();

        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            cache.clone(),
            Some(registry.clone()),
            Some("hs_test_key".to_string()),
            None,
        )
        .unwrap();

        // First load discards the corrupt entry and re-fetches
        let data = manager.load_bundle("owasp-llm-pro", None, false).await.unwrap();
        assert_eq!(data, payload);
        assert_eq!(*registry.calls.lock(), 1);

        // The payload on disk is whole again and serves cache hits
        let restored = cache.get_cached_bundle("owasp-llm-pro").unwrap();
        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(restored).unwrap()).unwrap();
        assert_eq!(on_disk, payload);

        let data = manager.load_bundle("owasp-llm-pro", None, false).await.unwrap();
        assert_eq!(data, payload);
        assert_eq!(*registry.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = json!({"id": "owasp-llm-pro", "version": "2.0.0", "rules": []});
        let registry = MockRegistry::new(fresh.clone());
        let cache = test_cache(dir.path());
        cache
            .cache_bundle("owasp-llm-pro", &json!({"version": "1.0.0"}))
            .unwrap();

        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            cache,
            Some(registry.clone()),
            Some("hs_test_key".to_string()),
            None,
        )
        .unwrap();

        let data = manager.load_bundle("owasp-llm-pro", None, true).await.unwrap();
        assert_eq!(data, fresh);
        assert_eq!(*registry.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_free_bundle_falls_back_to_registry() {
        let dir = tempfile::tempdir().unwrap();
        let payload = json!({"id": "free-bundle", "version": "1.0.0", "rules": []});
        let registry = MockRegistry::new(payload.clone());
        let manager = DistributionManager::new(
            unreachable_free_catalog(),
            test_cache(dir.path()),
            Some(registry.clone()),
            Some("hs_test_key".to_string()),
            None,
        )
        .unwrap();

        let data = manager.load_bundle("free-bundle", None, false).await.unwrap();
        assert_eq!(data, payload);
        assert_eq!(*registry.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_free_bundle_error_names_direct_source() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DistributionManager::new(
            unreachable_free_catalog(),
            test_cache(dir.path()),
            None,
            None,
            None,
        )
        .unwrap();

        let err = manager
            .load_bundle("free-bundle", None, false)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("https://example.com/not/a/tree/url"));
    }

    #[test]
    fn test_access_messages() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            test_cache(dir.path()),
            None,
            None,
            None,
        )
        .unwrap();

        assert!(manager
            .access_message("owasp-llm-basic")
            .contains("https://github.com/hybridscan/rule-bundles"));
        assert!(manager
            .access_message("owasp-llm-pro")
            .contains("HYBRIDSCAN_API_KEY"));
        assert!(manager.access_message("bogus").contains("not found"));
    }

    #[test]
    fn test_credential_detection() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DistributionManager::new(
            BundleCatalog::builtin(),
            test_cache(dir.path()),
            None,
            Some("   ".to_string()),
            None,
        )
        .unwrap();
        assert!(!manager.has_credential());
        assert!(!manager.can_access_registry());
    }
}
