//! Bundle distribution
//!
//! Dual-source resolution for rule bundles: free bundles come straight
//! from their public direct source with the registry as fallback, paid
//! bundles are registry-only behind a credential. Downloaded payloads land
//! in a content-checksummed local cache with TTL and size bounds.

pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod direct;
pub mod manager;
pub mod registry;
pub mod types;

pub use cache::{BundleCache, CacheConfig, CacheEntry, CacheStats, CachedBundle};
pub use catalog::BundleCatalog;
pub use checksum::{canonical_json, content_checksum};
pub use direct::{DirectFetcher, SINGLE_FILE_NAMES};
pub use manager::DistributionManager;
pub use registry::{BundleRegistry, RegistryClient};
pub use types::{BundleInfo, BundleSource, DistributionError, PricingTier, SourceType};
