//! Registry client
//!
//! Downloads bundles from the hosted registry with bearer authentication.
//! Behind a trait so the distribution manager can be exercised without a
//! live registry.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::types::DistributionError;

const DEFAULT_REGISTRY_URL: &str = "https://registry.hybridscan.dev";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Downloads bundle payloads from a registry
#[async_trait]
pub trait BundleRegistry: Send + Sync {
    async fn download_bundle(
        &self,
        bundle_id: &str,
        version: Option<&str>,
    ) -> Result<Value, DistributionError>;
}

/// HTTP client for the hosted bundle registry
#[derive(Debug)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    credential: String,
}

impl RegistryClient {
    pub fn new(credential: impl Into<String>) -> Result<Self, DistributionError> {
        Self::with_base_url(DEFAULT_REGISTRY_URL, credential)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<Self, DistributionError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("hybridscan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential: credential.into(),
        })
    }
}

#[async_trait]
impl BundleRegistry for RegistryClient {
    async fn download_bundle(
        &self,
        bundle_id: &str,
        version: Option<&str>,
    ) -> Result<Value, DistributionError> {
        let mut url = format!("{}/api/v1/bundles/{}/download", self.base_url, bundle_id);
        if let Some(version) = version {
            url.push_str(&format!("?version={version}"));
        }
        debug!("Downloading bundle '{}' from registry", bundle_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DistributionError::Registry(format!(
                "registry returned {} for bundle '{}'",
                response.status(),
                bundle_id
            )));
        }

        Ok(response.json().await?)
    }
}
