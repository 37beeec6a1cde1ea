//! Distribution types and errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from bundle distribution and caching
#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("Unknown bundle: {0}")]
    NotFound(String),

    #[error("Access denied for bundle '{bundle_id}': {message}")]
    Access { bundle_id: String, message: String },

    #[error("Failed to fetch bundle '{bundle_id}': {message}")]
    Fetch { bundle_id: String, message: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Pricing tier determining which sources a bundle may be fetched from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    Free,
    Paid,
    Enterprise,
}

impl PricingTier {
    /// Paid and enterprise bundles are registry-only, credential-gated
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for PricingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Paid => write!(f, "paid"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Where a bundle is fetched from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Registry,
    Direct,
    Local,
}

/// A bundle source location. Static mapping, not runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSource {
    pub source_type: SourceType,
    pub location: String,
    pub requires_credential: bool,
    pub fallback_available: bool,
}

/// Catalog metadata for a distributable bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub pricing_tier: PricingTier,
    pub category: String,
    pub tags: Vec<String>,
    pub source: BundleSource,
    /// Browsable URL for free bundles, used in remediation messages
    #[serde(default)]
    pub direct_url: Option<String>,
}
