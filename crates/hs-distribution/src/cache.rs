//! Local bundle cache
//!
//! Content-checksummed, TTL- and size-bounded store for downloaded bundle
//! payloads. One payload file per `{bundle_id}-{version}`, plus a single
//! metadata index mapping bundle id to its entry. The index is written via
//! temp file + atomic rename so concurrent writers cannot tear it.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::checksum::content_checksum;
use crate::types::DistributionError;

const METADATA_FILE: &str = "cache_metadata.json";

/// Metadata for one cached bundle payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: String,
    pub path: PathBuf,
    pub downloaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub checksum: String,
}

/// A cached bundle with its identity, for listings
#[derive(Debug, Clone, Serialize)]
pub struct CachedBundle {
    pub id: String,
    pub version: String,
    pub path: PathBuf,
    pub downloaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub age_days: f64,
}

/// Cache size and occupancy statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub bundle_count: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub usage_percent: f64,
    pub cache_dir: PathBuf,
    pub ttl_days: i64,
}

/// Cache location and bounds
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Defaults to `~/.hybridscan/bundles`
    pub cache_dir: Option<PathBuf>,
    pub max_size_mb: u64,
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_size_mb: 500,
            ttl_days: 7,
        }
    }
}

/// Local cache for downloaded bundles
#[derive(Debug)]
pub struct BundleCache {
    cache_dir: PathBuf,
    max_size_bytes: u64,
    ttl: Duration,
    metadata_file: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl BundleCache {
    pub fn new(config: CacheConfig) -> Result<Self, DistributionError> {
        let cache_dir = match config.cache_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .ok_or_else(|| {
                    DistributionError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "could not determine home directory",
                    ))
                })?
                .join(".hybridscan")
                .join("bundles"),
        };
        std::fs::create_dir_all(&cache_dir)?;

        let metadata_file = cache_dir.join(METADATA_FILE);
        let entries = match std::fs::read_to_string(&metadata_file) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    // Corrupted index is discarded, entries re-populate on use
                    warn!("Discarding corrupted cache metadata: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            cache_dir,
            max_size_bytes: config.max_size_mb * 1024 * 1024,
            ttl: Duration::days(config.ttl_days),
            metadata_file,
            entries: RwLock::new(entries),
        })
    }

    /// Cache a bundle payload.
    ///
    /// Idempotent: if the entry's checksum already matches, the existing
    /// path is returned without rewriting the file or touching its
    /// timestamp. TTL and size sweeps run after every store.
    pub fn cache_bundle(
        &self,
        bundle_id: &str,
        bundle_data: &Value,
    ) -> Result<PathBuf, DistributionError> {
        let checksum = content_checksum(bundle_data);

        if let Some(existing) = self.entries.read().get(bundle_id) {
            if existing.checksum == checksum {
                debug!("Bundle '{}' already cached with same content", bundle_id);
                return Ok(existing.path.clone());
            }
        }

        let version = bundle_data
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("latest")
            .to_string();
        let path = self.cache_dir.join(format!("{bundle_id}-{version}.json"));

        let payload = serde_json::to_string_pretty(bundle_data)?;
        std::fs::write(&path, &payload)?;

        let entry = CacheEntry {
            version,
            path: path.clone(),
            downloaded_at: Utc::now(),
            size_bytes: payload.len() as u64,
            checksum,
        };
        self.entries.write().insert(bundle_id.to_string(), entry);
        self.save_metadata()?;

        info!("Cached bundle '{}' at {}", bundle_id, path.display());

        self.cleanup_expired()?;
        self.enforce_size_limit()?;

        Ok(path)
    }

    /// Path to a cached bundle, or None on miss.
    ///
    /// Self-heals: a metadata entry whose backing file is gone is dropped
    /// and treated as a miss.
    pub fn get_cached_bundle(&self, bundle_id: &str) -> Option<PathBuf> {
        let path = self.entries.read().get(bundle_id).map(|e| e.path.clone())?;
        if path.exists() {
            return Some(path);
        }

        warn!(
            "Cache entry for '{}' points at missing file, discarding",
            bundle_id
        );
        self.entries.write().remove(bundle_id);
        if let Err(e) = self.save_metadata() {
            warn!("Failed to persist cache metadata: {}", e);
        }
        None
    }

    pub fn is_bundle_cached(&self, bundle_id: &str) -> bool {
        self.get_cached_bundle(bundle_id).is_some()
    }

    /// Remove a bundle's payload and metadata. Returns false on miss.
    pub fn remove_bundle(&self, bundle_id: &str) -> Result<bool, DistributionError> {
        let entry = self.entries.write().remove(bundle_id);
        let Some(entry) = entry else {
            return Ok(false);
        };
        if entry.path.exists() {
            std::fs::remove_file(&entry.path)?;
        }
        self.save_metadata()?;
        Ok(true)
    }

    /// Refresh the entry's timestamp (explicit "touch"). Returns false on miss.
    pub fn refresh_bundle(&self, bundle_id: &str) -> Result<bool, DistributionError> {
        {
            let mut entries = self.entries.write();
            let Some(entry) = entries.get_mut(bundle_id) else {
                return Ok(false);
            };
            entry.downloaded_at = Utc::now();
        }
        self.save_metadata()?;
        Ok(true)
    }

    /// All cached bundles, newest first
    pub fn list_cached_bundles(&self) -> Vec<CachedBundle> {
        let now = Utc::now();
        let mut bundles: Vec<CachedBundle> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| CachedBundle {
                id: id.clone(),
                version: entry.version.clone(),
                path: entry.path.clone(),
                downloaded_at: entry.downloaded_at,
                size_bytes: entry.size_bytes,
                age_days: (now - entry.downloaded_at).num_seconds() as f64 / 86_400.0,
            })
            .collect();
        bundles.sort_by(|a, b| b.downloaded_at.cmp(&a.downloaded_at));
        bundles
    }

    /// Remove entries older than the TTL
    pub fn cleanup_expired(&self) -> Result<(), DistributionError> {
        let cutoff = Utc::now() - self.ttl;
        let expired: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.downloaded_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for bundle_id in expired {
            debug!("Removing expired cache entry '{}'", bundle_id);
            self.remove_bundle(&bundle_id)?;
        }
        Ok(())
    }

    /// Evict oldest entries by `downloaded_at` until under the byte budget
    pub fn enforce_size_limit(&self) -> Result<(), DistributionError> {
        let mut sorted: Vec<(String, DateTime<Utc>, u64)> = self
            .entries
            .read()
            .iter()
            .map(|(id, e)| (id.clone(), e.downloaded_at, e.size_bytes))
            .collect();
        let mut total: u64 = sorted.iter().map(|(_, _, size)| size).sum();
        if total <= self.max_size_bytes {
            return Ok(());
        }

        sorted.sort_by_key(|(_, downloaded_at, _)| *downloaded_at);
        for (bundle_id, _, size) in sorted {
            if total <= self.max_size_bytes {
                break;
            }
            debug!("Evicting '{}' to enforce cache size limit", bundle_id);
            self.remove_bundle(&bundle_id)?;
            total -= size;
        }
        Ok(())
    }

    /// Remove every cached bundle and the metadata index
    pub fn clear(&self) -> Result<(), DistributionError> {
        let ids: Vec<String> = self.entries.read().keys().cloned().collect();
        for bundle_id in ids {
            self.remove_bundle(&bundle_id)?;
        }
        if self.metadata_file.exists() {
            std::fs::remove_file(&self.metadata_file)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let total_size_bytes: u64 = entries.values().map(|e| e.size_bytes).sum();
        CacheStats {
            bundle_count: entries.len(),
            total_size_bytes,
            max_size_bytes: self.max_size_bytes,
            usage_percent: if self.max_size_bytes > 0 {
                total_size_bytes as f64 / self.max_size_bytes as f64 * 100.0
            } else {
                0.0
            },
            cache_dir: self.cache_dir.clone(),
            ttl_days: self.ttl.num_days(),
        }
    }

    fn save_metadata(&self) -> Result<(), DistributionError> {
        let snapshot = self.entries.read().clone();
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp = self.metadata_file.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.metadata_file)?;
        Ok(())
    }
}
