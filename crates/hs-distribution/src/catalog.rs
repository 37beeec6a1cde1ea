//! Static bundle catalog
//!
//! Maps bundle identifiers to their distribution metadata. The built-in
//! entries cover the published bundles; callers can register additional
//! entries (for example from a config file) before handing the catalog to
//! the distribution manager.

use std::collections::HashMap;

use crate::types::{BundleInfo, BundleSource, PricingTier, SourceType};

/// Known bundle identities and where each may be fetched from
#[derive(Debug, Clone, Default)]
pub struct BundleCatalog {
    entries: HashMap<String, BundleInfo>,
}

impl BundleCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with the built-in published bundles
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        catalog.register(BundleInfo {
            id: "owasp-llm-basic".to_string(),
            name: "OWASP LLM Top 10 Basic".to_string(),
            description: "Heuristic-only OWASP LLM Top 10 rules".to_string(),
            version: "1.0.0".to_string(),
            pricing_tier: PricingTier::Free,
            category: "security".to_string(),
            tags: vec![
                "owasp".to_string(),
                "llm".to_string(),
                "ai-security".to_string(),
            ],
            source: BundleSource {
                source_type: SourceType::Direct,
                location: "hybridscan/rule-bundles/bundles/free/owasp-llm-basic".to_string(),
                requires_credential: false,
                fallback_available: true,
            },
            direct_url: Some(
                "https://github.com/hybridscan/rule-bundles/tree/main/bundles/free/owasp-llm-basic"
                    .to_string(),
            ),
        });
        catalog.register(BundleInfo {
            id: "owasp-llm-pro".to_string(),
            name: "OWASP LLM Top 10 Pro".to_string(),
            description: "AI-enhanced OWASP LLM Top 10 analysis".to_string(),
            version: "1.0.0".to_string(),
            pricing_tier: PricingTier::Paid,
            category: "security".to_string(),
            tags: vec![
                "owasp".to_string(),
                "llm".to_string(),
                "ai-enhanced".to_string(),
            ],
            source: BundleSource {
                source_type: SourceType::Registry,
                location: "owasp-llm-pro".to_string(),
                requires_credential: true,
                fallback_available: false,
            },
            direct_url: None,
        });
        catalog.register(BundleInfo {
            id: "iso-42001-compliance".to_string(),
            name: "ISO 42001 AI Governance".to_string(),
            description: "Comprehensive AI governance compliance rules".to_string(),
            version: "1.0.0".to_string(),
            pricing_tier: PricingTier::Paid,
            category: "compliance".to_string(),
            tags: vec![
                "iso-42001".to_string(),
                "ai-governance".to_string(),
                "compliance".to_string(),
            ],
            source: BundleSource {
                source_type: SourceType::Registry,
                location: "iso-42001-compliance".to_string(),
                requires_credential: true,
                fallback_available: false,
            },
            direct_url: None,
        });
        catalog
    }

    pub fn register(&mut self, info: BundleInfo) {
        self.entries.insert(info.id.clone(), info);
    }

    pub fn get(&self, bundle_id: &str) -> Option<&BundleInfo> {
        self.entries.get(bundle_id)
    }

    /// All catalog entries, free and paid; access control happens at load
    pub fn list(&self) -> Vec<&BundleInfo> {
        let mut entries: Vec<&BundleInfo> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }
}
