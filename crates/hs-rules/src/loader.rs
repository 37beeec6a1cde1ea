//! Bundle loader
//!
//! Loads rule bundles from single files (JSON or YAML) or from directories
//! (an index file plus sibling declarative rule files), converts the legacy
//! flat format, and parses raw rule values into the typed model.

use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::legacy::convert_legacy_bundle;
use crate::types::{ExtractedHeuristic, HeuristicType, HybridRule, RuleBundle, RulesError};
use crate::validate::validate_rule;

/// Index file names recognized in bundle directories, probed in order
const INDEX_FILES: &[&str] = &["bundle.json", "index.json", "manifest.json"];

/// Fields a raw rule must carry before typed parsing is attempted
const REQUIRED_RULE_FIELDS: &[&str] = &["id", "name", "category", "severity", "rule_type"];

/// Loader for rule bundles in the hybrid and legacy formats
#[derive(Debug, Default)]
pub struct RulesLoader;

impl RulesLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a bundle from a file or directory path
    pub fn load_bundle(&self, path: impl AsRef<Path>) -> Result<RuleBundle, RulesError> {
        let path = path.as_ref();
        if path.is_file() {
            self.load_bundle_file(path)
        } else if path.is_dir() {
            self.load_bundle_directory(path)
        } else {
            Err(RulesError::Format(format!(
                "Bundle path not found: {}",
                path.display()
            )))
        }
    }

    /// Load a bundle from a single JSON or YAML file
    fn load_bundle_file(&self, path: &Path) -> Result<RuleBundle, RulesError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let data = std::fs::read_to_string(path)?;
        let value: Value = match ext.as_str() {
            "json" => serde_json::from_str(&data)?,
            "yaml" | "yml" => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(&data)?;
                serde_json::to_value(yaml)?
            }
            _ => {
                return Err(RulesError::Format(format!(
                    "Unsupported bundle format: .{}",
                    ext
                )))
            }
        };

        let fallback_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bundle");
        self.parse_bundle_value(fallback_id, &value)
    }

    /// Load a bundle from a directory: an index file plus sibling YAML rule
    /// files, each contributing its top-level `rules` list.
    fn load_bundle_directory(&self, dir: &Path) -> Result<RuleBundle, RulesError> {
        let index_path = INDEX_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
            .ok_or_else(|| {
                RulesError::Format(format!("No index file found in {}", dir.display()))
            })?;

        let index: Value = serde_json::from_str(&std::fs::read_to_string(&index_path)?)?;
        let name = string_field(&index, "name")
            .ok_or_else(|| RulesError::Format("Index file missing 'name'".to_string()))?;
        let version = string_field(&index, "version")
            .ok_or_else(|| RulesError::Format("Index file missing 'version'".to_string()))?;
        let description = string_field(&index, "description").unwrap_or_default();
        let id = string_field(&index, "id").unwrap_or_else(|| {
            dir.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("bundle")
                .to_string()
        });

        let mut raw_rules = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        entries.sort();

        for rule_file in entries {
            match read_rules_list(&rule_file) {
                Ok(mut rules) => raw_rules.append(&mut rules),
                Err(e) => {
                    warn!("Skipping rule file '{}': {}", rule_file.display(), e);
                }
            }
        }

        self.build_bundle(id, name, version, description, &raw_rules)
    }

    /// Parse an in-memory bundle value (as returned by the distribution
    /// manager) into a typed bundle. Values without a `rules` list are
    /// treated as the legacy flat format.
    pub fn parse_bundle_value(
        &self,
        fallback_id: &str,
        value: &Value,
    ) -> Result<RuleBundle, RulesError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RulesError::Format("Bundle is not an object".to_string()))?;

        if let Some(rules) = obj.get("rules").and_then(|r| r.as_array()) {
            let id = string_field(value, "id").unwrap_or_else(|| fallback_id.to_string());
            let name = string_field(value, "name").unwrap_or_else(|| id.clone());
            let version = string_field(value, "version").unwrap_or_else(|| "1.0".to_string());
            let description = string_field(value, "description").unwrap_or_default();
            self.build_bundle(id, name, version, description, rules)
        } else {
            Ok(convert_legacy_bundle(fallback_id, obj))
        }
    }

    /// Parse all raw rules, aggregating every rule's violations so the whole
    /// bundle is reported at once.
    fn build_bundle(
        &self,
        id: String,
        name: String,
        version: String,
        description: String,
        raw_rules: &[Value],
    ) -> Result<RuleBundle, RulesError> {
        let mut rules = Vec::with_capacity(raw_rules.len());
        let mut errors = Vec::new();

        for raw in raw_rules {
            match self.parse_hybrid_rule(raw) {
                Ok(rule) => rules.push(rule),
                Err(e) => errors.push(e.to_string()),
            }
        }

        if !errors.is_empty() {
            return Err(RulesError::InvalidBundle { bundle: id, errors });
        }

        Ok(RuleBundle {
            id,
            name,
            version,
            description,
            rules,
        })
    }

    /// Parse and validate a single raw rule value
    pub fn parse_hybrid_rule(&self, raw: &Value) -> Result<HybridRule, RulesError> {
        let rule_id = string_field(raw, "id").unwrap_or_else(|| "unknown".to_string());

        let missing: Vec<String> = REQUIRED_RULE_FIELDS
            .iter()
            .filter(|f| raw.get(**f).is_none())
            .map(|f| format!("missing required field '{}'", f))
            .collect();
        if !missing.is_empty() {
            return Err(RulesError::Validation {
                rule_id,
                errors: missing,
            });
        }

        let rule: HybridRule =
            serde_json::from_value(raw.clone()).map_err(|e| RulesError::Validation {
                rule_id: rule_id.clone(),
                errors: vec![e.to_string()],
            })?;

        let violations = validate_rule(&rule);
        if !violations.is_empty() {
            return Err(RulesError::Validation {
                rule_id,
                errors: violations,
            });
        }

        Ok(rule)
    }

    /// Project all heuristics of one type out of a bundle, for handing to an
    /// external full-scan engine.
    pub fn extract_heuristics(
        &self,
        bundle: &RuleBundle,
        heuristic_type: HeuristicType,
    ) -> Vec<ExtractedHeuristic> {
        bundle
            .rules
            .iter()
            .flat_map(|rule| {
                rule.heuristics
                    .iter()
                    .filter(|h| h.heuristic_type == heuristic_type)
                    .map(|h| ExtractedHeuristic {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        severity: rule.severity,
                        category: rule.category.clone(),
                        subcategory: rule.subcategory.clone(),
                        tags: rule.tags.clone(),
                        pattern: h.pattern.clone(),
                        message: h.message.clone(),
                    })
            })
            .collect()
    }
}

/// Read a YAML rule file and return its top-level `rules` list
fn read_rules_list(path: &Path) -> Result<Vec<Value>, RulesError> {
    let data = std::fs::read_to_string(path)?;
    let yaml: serde_yaml::Value = serde_yaml::from_str(&data)?;
    let value: Value = serde_json::to_value(yaml)?;
    match value.get("rules").and_then(|r| r.as_array()) {
        Some(rules) => Ok(rules.clone()),
        None => Err(RulesError::Format(
            "Rule file has no top-level 'rules' list".to_string(),
        )),
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleType;
    use serde_json::json;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn hybrid_rule_value() -> Value {
        json!({
            "id": "llm01-prompt-injection",
            "name": "Prompt Injection",
            "category": "security",
            "severity": "high",
            "rule_type": "hybrid",
            "compatible_models": ["openai/gpt-3.5-turbo"],
            "heuristics": [
                {"type": "pattern", "pattern": "ignore previous", "message": "Possible injection"}
            ],
            "ai_analysis": {
                "trigger": ["heuristics_matched"],
                "prompt_template": "Analyze this {language} code: {code_snippet}",
                "expected_response_schema": {}
            }
        })
    }

    #[test]
    fn test_parse_hybrid_rule() {
        let loader = RulesLoader::new();
        let rule = loader.parse_hybrid_rule(&hybrid_rule_value()).unwrap();
        assert_eq!(rule.rule_type, RuleType::Hybrid);
        assert_eq!(rule.heuristics.len(), 1);
        assert_eq!(rule.execution.max_tokens, 2000);
    }

    #[test]
    fn test_parse_rule_missing_fields_named() {
        let loader = RulesLoader::new();
        let err = loader
            .parse_hybrid_rule(&json!({"id": "incomplete"}))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("name"));
        assert!(msg.contains("severity"));
        assert!(msg.contains("rule_type"));
    }

    #[test]
    fn test_parse_rule_invariant_violations_reported() {
        let loader = RulesLoader::new();
        let err = loader
            .parse_hybrid_rule(&json!({
                "id": "bad-hybrid",
                "name": "Bad",
                "category": "security",
                "severity": "low",
                "rule_type": "hybrid"
            }))
            .unwrap_err();
        match err {
            RulesError::Validation { rule_id, errors } => {
                assert_eq!(rule_id, "bad-hybrid");
                assert_eq!(errors.len(), 3);
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_json_bundle_file() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = json!({
            "name": "Test Bundle",
            "version": "2.0.0",
            "description": "For tests",
            "rules": [hybrid_rule_value()]
        });
        write(dir.path(), "test.json", &bundle.to_string());

        let loader = RulesLoader::new();
        let parsed = loader.load_bundle(dir.path().join("test.json")).unwrap();
        assert_eq!(parsed.id, "test");
        assert_eq!(parsed.version, "2.0.0");
        assert_eq!(parsed.rules.len(), 1);
    }

    #[test]
    fn test_load_yaml_legacy_bundle_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "legacy.yaml",
            "hardcoded-secret:\n  name: Hardcoded Secret\n  severity: critical\n  pattern: \"api_key =\"\n  message: Hardcoded credential\n",
        );

        let loader = RulesLoader::new();
        let bundle = loader.load_bundle(dir.path().join("legacy.yaml")).unwrap();
        assert_eq!(bundle.rules.len(), 1);
        assert_eq!(bundle.rules[0].rule_type, RuleType::Pattern);
        assert_eq!(bundle.rules[0].heuristics[0].pattern, "api_key =");
    }

    #[test]
    fn test_load_directory_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "bundle.json",
            &json!({"name": "Dir Bundle", "version": "1.0.0", "description": "d"}).to_string(),
        );
        let rules_yaml = serde_yaml::to_string(&json!({"rules": [hybrid_rule_value()]})).unwrap();
        write(dir.path(), "rules.yaml", &rules_yaml);

        let loader = RulesLoader::new();
        let bundle = loader.load_bundle(dir.path()).unwrap();
        assert_eq!(bundle.name, "Dir Bundle");
        assert_eq!(bundle.rules.len(), 1);
    }

    #[test]
    fn test_load_directory_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "rules.yaml", "rules: []\n");

        let loader = RulesLoader::new();
        let err = loader.load_bundle(dir.path()).unwrap_err();
        assert!(matches!(err, RulesError::Format(_)));
        assert!(err.to_string().contains("index file"));
    }

    #[test]
    fn test_load_directory_skips_malformed_rule_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "index.json",
            &json!({"name": "B", "version": "1.0.0"}).to_string(),
        );
        write(dir.path(), "broken.yaml", "not a rules file\n");
        let rules_yaml = serde_yaml::to_string(&json!({"rules": [hybrid_rule_value()]})).unwrap();
        write(dir.path(), "rules.yaml", &rules_yaml);

        let loader = RulesLoader::new();
        let bundle = loader.load_bundle(dir.path()).unwrap();
        assert_eq!(bundle.rules.len(), 1);
    }

    #[test]
    fn test_missing_path_is_format_error() {
        let loader = RulesLoader::new();
        let err = loader.load_bundle("/nonexistent/bundle.yaml").unwrap_err();
        assert!(matches!(err, RulesError::Format(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bundle.toml", "rules = []");
        let loader = RulesLoader::new();
        let err = loader.load_bundle(dir.path().join("bundle.toml")).unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }

    #[test]
    fn test_invalid_rule_aborts_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = json!({
            "name": "Bad Bundle",
            "version": "1.0.0",
            "rules": [
                hybrid_rule_value(),
                {"id": "no-models", "name": "x", "category": "security",
                 "severity": "low", "rule_type": "ai_only",
                 "ai_analysis": {"prompt_template": "p"}}
            ]
        });
        write(dir.path(), "bad.json", &bundle.to_string());

        let loader = RulesLoader::new();
        let err = loader.load_bundle(dir.path().join("bad.json")).unwrap_err();
        assert!(matches!(err, RulesError::InvalidBundle { .. }));
    }

    #[test]
    fn test_extract_heuristics_by_type() {
        let loader = RulesLoader::new();
        let bundle = loader
            .parse_bundle_value(
                "b",
                &json!({
                    "name": "B", "version": "1.0",
                    "rules": [
                        hybrid_rule_value(),
                        {"id": "policy-rule", "name": "P", "category": "security",
                         "severity": "medium", "rule_type": "policy",
                         "heuristics": [{"type": "policy",
                                         "pattern": "package scanner\ndeny[msg] { msg := \"x\" }",
                                         "message": "policy hit"}]}
                    ]
                }),
            )
            .unwrap();

        let patterns = loader.extract_heuristics(&bundle, HeuristicType::Pattern);
        let policies = loader.extract_heuristics(&bundle, HeuristicType::Policy);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].rule_id, "llm01-prompt-injection");
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].rule_id, "policy-rule");
    }
}
