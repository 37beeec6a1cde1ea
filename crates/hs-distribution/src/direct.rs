//! Direct bundle fetching from raw repository content
//!
//! Free bundles are published in a public Git repository and fetched over
//! the raw-content URL scheme, no registry credential required. A manifest
//! (`index.json`) listing the rule files is tried first; without one, a
//! small fixed list of conventional single-file names is probed.

use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::types::{BundleInfo, DistributionError};

/// Conventional single-file bundle names probed when no manifest exists
pub const SINGLE_FILE_NAMES: &[&str] = &["rules.yaml", "bundle.yaml", "index.yaml", "rules.yml"];

const MANIFEST_FILE: &str = "index.json";
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Fetches bundles over the raw-content URL scheme
#[derive(Debug)]
pub struct DirectFetcher {
    client: reqwest::Client,
    /// Optional token for higher rate limits
    token: Option<String>,
}

impl DirectFetcher {
    pub fn new(token: Option<String>) -> Result<Self, DistributionError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(concat!("hybridscan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, token })
    }

    /// Fetch a free bundle from its direct source
    pub async fn fetch_bundle(&self, info: &BundleInfo) -> Result<Value, DistributionError> {
        let Some(direct_url) = &info.direct_url else {
            return Err(DistributionError::Fetch {
                bundle_id: info.id.clone(),
                message: "no direct URL configured".to_string(),
            });
        };
        let base_url = raw_base_url(direct_url).map_err(|message| DistributionError::Fetch {
            bundle_id: info.id.clone(),
            message,
        })?;

        let manifest_url = format!("{base_url}/{MANIFEST_FILE}");
        let response = self.get(&manifest_url).await?;
        match response.status() {
            StatusCode::OK => {
                let manifest: Value = response.json().await?;
                self.fetch_manifest_bundle(&info.id, &base_url, &manifest)
                    .await
            }
            StatusCode::NOT_FOUND => self.fetch_single_file(info, &base_url).await,
            status => Err(DistributionError::Fetch {
                bundle_id: info.id.clone(),
                message: format!("manifest request returned {status}"),
            }),
        }
    }

    /// Load every rule file the manifest references; unreadable files are
    /// skipped with a warning.
    async fn fetch_manifest_bundle(
        &self,
        bundle_id: &str,
        base_url: &str,
        manifest: &Value,
    ) -> Result<Value, DistributionError> {
        let mut rules = Vec::new();
        let rule_files = manifest
            .get("rules")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        for rule_file in rule_files.iter().filter_map(|f| f.as_str()) {
            let rule_url = format!("{base_url}/rules/{rule_file}");
            match self.fetch_rule_file(&rule_url, rule_file).await {
                Ok(Some(rule)) => rules.push(rule),
                Ok(None) => debug!("Skipping rule file with unknown extension: {}", rule_file),
                Err(e) => warn!("Failed to load rule file '{}': {}", rule_file, e),
            }
        }

        Ok(json!({
            "id": manifest.get("id").cloned().unwrap_or_else(|| json!(bundle_id)),
            "name": manifest.get("name").cloned().unwrap_or(Value::Null),
            "version": manifest.get("version").cloned().unwrap_or_else(|| json!("1.0.0")),
            "description": manifest.get("description").cloned().unwrap_or(Value::Null),
            "rules": rules,
        }))
    }

    async fn fetch_rule_file(
        &self,
        url: &str,
        file_name: &str,
    ) -> Result<Option<Value>, DistributionError> {
        let response = self.get(url).await?;
        if response.status() != StatusCode::OK {
            return Err(DistributionError::Fetch {
                bundle_id: file_name.to_string(),
                message: format!("rule file request returned {}", response.status()),
            });
        }
        let content = response.text().await?;
        parse_by_extension(&content, file_name)
    }

    /// Probe conventional single-file names in order
    async fn fetch_single_file(
        &self,
        info: &BundleInfo,
        base_url: &str,
    ) -> Result<Value, DistributionError> {
        for file_name in SINGLE_FILE_NAMES {
            let url = format!("{base_url}/{file_name}");
            let response = match self.get(&url).await {
                Ok(r) => r,
                Err(e) => {
                    debug!("Probe of {} failed: {}", file_name, e);
                    continue;
                }
            };
            if response.status() != StatusCode::OK {
                continue;
            }
            // One bad candidate never ends the probe, the next name is tried
            let content = match response.text().await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {}: {}", file_name, e);
                    continue;
                }
            };
            let Some(mut bundle) = parse_candidate(&content, file_name) else {
                continue;
            };
            if let Some(obj) = bundle.as_object_mut() {
                obj.insert("id".to_string(), json!(info.id));
                obj.insert("name".to_string(), json!(info.name));
                obj.insert("version".to_string(), json!(info.version));
                obj.insert("source".to_string(), json!("direct"));
            }
            return Ok(bundle);
        }

        Err(DistributionError::Fetch {
            bundle_id: info.id.clone(),
            message: "no manifest or conventional bundle file found".to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DistributionError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }
        Ok(request.send().await?)
    }
}

/// Translate a browsable tree URL into its raw-content base URL.
///
/// `https://github.com/{owner}/{repo}/tree/{branch}/{path}` becomes
/// `https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{path}`.
fn raw_base_url(direct_url: &str) -> Result<String, String> {
    let url = reqwest::Url::parse(direct_url).map_err(|e| format!("invalid URL: {e}"))?;
    let host = url.host_str().unwrap_or_default();
    if host != "github.com" && !host.ends_with(".github.com") {
        return Err(format!("unsupported direct-fetch host: {host}"));
    }

    let parts: Vec<&str> = url
        .path()
        .trim_matches('/')
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();
    // owner/repo/tree/branch/path...
    if parts.len() < 5 || parts[2] != "tree" {
        return Err(format!("unexpected tree URL format: {direct_url}"));
    }
    let (owner, repo, branch) = (parts[0], parts[1], parts[3]);
    let path = parts[4..].join("/");

    Ok(format!(
        "https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{path}"
    ))
}

/// Parse one probe candidate; a malformed candidate is skipped, not fatal
fn parse_candidate(content: &str, file_name: &str) -> Option<Value> {
    match parse_by_extension(content, file_name) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse {}: {}", file_name, e);
            None
        }
    }
}

fn parse_by_extension(content: &str, file_name: &str) -> Result<Option<Value>, DistributionError> {
    if file_name.ends_with(".yaml") || file_name.ends_with(".yml") {
        let value: Value = serde_yaml::from_str(content).map_err(|e| DistributionError::Fetch {
            bundle_id: file_name.to_string(),
            message: format!("invalid YAML: {e}"),
        })?;
        Ok(Some(value))
    } else if file_name.ends_with(".json") {
        Ok(Some(serde_json::from_str(content)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_base_url_translation() {
        let raw = raw_base_url(
            "https://github.com/hybridscan/rule-bundles/tree/main/bundles/free/owasp-llm-basic",
        )
        .unwrap();
        assert_eq!(
            raw,
            "https://raw.githubusercontent.com/hybridscan/rule-bundles/main/bundles/free/owasp-llm-basic"
        );
    }

    #[test]
    fn test_raw_base_url_rejects_other_hosts() {
        assert!(raw_base_url("https://example.com/a/b/tree/main/c").is_err());
        // A lookalike suffix is not the real host
        assert!(raw_base_url("https://notgithub.com/a/b/tree/main/c").is_err());
        assert!(raw_base_url("https://www.github.com/hybridscan/rule-bundles/tree/main/x").is_ok());
    }

    #[test]
    fn test_raw_base_url_rejects_short_paths() {
        assert!(raw_base_url("https://github.com/owner/repo").is_err());
        assert!(raw_base_url("https://github.com/owner/repo/blob/main/x").is_err());
    }

    #[test]
    fn test_parse_by_extension() {
        assert!(parse_by_extension("rules:\n  - id: a\n", "rules.yaml")
            .unwrap()
            .is_some());
        assert!(parse_by_extension(r#"{"rules": []}"#, "bundle.json")
            .unwrap()
            .is_some());
        assert!(parse_by_extension("text", "notes.txt").unwrap().is_none());
    }

    #[test]
    fn test_malformed_probe_candidate_is_skipped() {
        assert!(parse_candidate("rules: [unclosed", "rules.yaml").is_none());
        assert!(parse_candidate("rules: []\n", "rules.yaml").is_some());
    }
}
