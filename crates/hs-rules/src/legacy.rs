//! Legacy flat-format conversion
//!
//! The older bundle format is a flat mapping of rule id to a handful of
//! fields. Conversion is pure and deterministic: every supported field is
//! carried over verbatim, everything else gets the hybrid-format defaults.

use serde_json::{Map, Value};

use hs_types::Severity;

use crate::types::{
    ExecutionConfig, HeuristicRule, HeuristicType, HybridRule, RuleBundle, RuleType,
};

/// Convert a legacy flat bundle (rule_id -> fields) into a typed bundle of
/// pattern rules.
pub fn convert_legacy_bundle(bundle_id: &str, legacy: &Map<String, Value>) -> RuleBundle {
    let mut rules = Vec::new();

    for (rule_id, rule_data) in legacy {
        let Some(fields) = rule_data.as_object() else {
            continue;
        };

        let name = fields
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(rule_id)
            .to_string();
        let category = fields
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("security")
            .to_string();
        let subcategory = fields
            .get("subcategory")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let severity = fields
            .get("severity")
            .and_then(|v| v.as_str())
            .map(Severity::from_str_lenient)
            .unwrap_or(Severity::Medium);
        let tags = fields
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str())
                    .map(|t| t.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let heuristics = match fields.get("pattern").and_then(|v| v.as_str()) {
            Some(pattern) => vec![HeuristicRule {
                heuristic_type: HeuristicType::Pattern,
                pattern: pattern.to_string(),
                message: fields
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Pattern match: {}", rule_id)),
            }],
            None => Vec::new(),
        };

        rules.push(HybridRule {
            id: rule_id.clone(),
            name,
            category,
            subcategory,
            severity,
            rule_type: RuleType::Pattern,
            compatible_models: Vec::new(),
            heuristics,
            ai_analysis: None,
            execution: ExecutionConfig::default(),
            tags,
            version: "1.0".to_string(),
        });
    }

    RuleBundle {
        id: bundle_id.to_string(),
        name: "legacy-bundle".to_string(),
        version: "1.0".to_string(),
        description: "Converted legacy bundle".to_string(),
        rules,
    }
}
