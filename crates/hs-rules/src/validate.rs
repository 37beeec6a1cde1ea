//! Structural rule validation
//!
//! `validate_rule` returns every violated invariant, not just the first, so
//! callers can report a bundle's problems in one pass.

use crate::types::{HeuristicType, HybridRule};

/// Control keywords a plausible policy source must contain at least one of
const POLICY_KEYWORDS: &[&str] = &["package", "import", "default", "allow", "deny", "violation"];

/// Validate a hybrid rule, returning all violated invariants
pub fn validate_rule(rule: &HybridRule) -> Vec<String> {
    let mut errors = Vec::new();

    if rule.rule_type.requires_heuristics() && rule.heuristics.is_empty() {
        errors.push(format!(
            "rules with {:?} type must have at least one heuristic",
            rule.rule_type
        ));
    }

    for (i, heuristic) in rule.heuristics.iter().enumerate() {
        if heuristic.pattern.is_empty() {
            errors.push(format!("heuristic {}: missing pattern", i));
            continue;
        }
        if heuristic.heuristic_type == HeuristicType::Policy
            && !is_plausible_policy_source(&heuristic.pattern)
        {
            errors.push(format!(
                "heuristic {}: pattern is not plausible policy source",
                i
            ));
        }
    }

    if rule.rule_type.requires_ai_analysis() {
        match &rule.ai_analysis {
            None => errors.push(format!(
                "rules with {:?} type must have an ai_analysis config",
                rule.rule_type
            )),
            Some(cfg) if cfg.prompt_template.is_empty() => {
                errors.push("ai_analysis config missing prompt_template".to_string());
            }
            Some(_) => {}
        }
        if rule.compatible_models.is_empty() {
            errors.push("AI-enabled rules must specify compatible_models".to_string());
        }
    }

    errors
}

/// Check that a string is syntactically plausible policy-language source:
/// balanced delimiters and at least one control keyword.
pub fn is_plausible_policy_source(source: &str) -> bool {
    if source.trim().is_empty() {
        return false;
    }
    if !has_balanced_delimiters(source) {
        return false;
    }
    POLICY_KEYWORDS.iter().any(|kw| source.contains(kw))
}

/// Check parenthesis/bracket/brace nesting and string literal closure.
/// Quotes open a literal scanned to its closing quote, honoring backslash
/// escapes; delimiters inside literals do not count.
pub fn has_balanced_delimiters(source: &str) -> bool {
    let mut stack: Vec<char> = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '(' => stack.push(')'),
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ')' | ']' | '}' => {
                if stack.pop() != Some(c) {
                    return false;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == '\\' {
                        chars.next();
                    } else if inner == quote {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AiAnalysisConfig, AiTrigger, ExecutionConfig, HeuristicRule, HeuristicType, RuleType,
    };
    use hs_types::Severity;

    fn base_rule(rule_type: RuleType) -> HybridRule {
        HybridRule {
            id: "test-rule".to_string(),
            name: "Test Rule".to_string(),
            category: "security".to_string(),
            subcategory: String::new(),
            severity: Severity::High,
            rule_type,
            compatible_models: vec![],
            heuristics: vec![],
            ai_analysis: None,
            execution: ExecutionConfig::default(),
            tags: vec![],
            version: "1.0".to_string(),
        }
    }

    fn pattern_heuristic() -> HeuristicRule {
        HeuristicRule {
            heuristic_type: HeuristicType::Pattern,
            pattern: "eval(".to_string(),
            message: "Dangerous eval".to_string(),
        }
    }

    fn ai_config() -> AiAnalysisConfig {
        AiAnalysisConfig {
            trigger: vec![AiTrigger::HeuristicsMatched],
            prompt_template: "Analyze {code_snippet}".to_string(),
            expected_response_schema: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_valid_hybrid_rule_has_no_errors() {
        let mut rule = base_rule(RuleType::Hybrid);
        rule.heuristics = vec![pattern_heuristic()];
        rule.ai_analysis = Some(ai_config());
        rule.compatible_models = vec!["openai/gpt-3.5-turbo".to_string()];
        assert!(validate_rule(&rule).is_empty());
    }

    #[test]
    fn test_hybrid_rule_missing_everything() {
        let rule = base_rule(RuleType::Hybrid);
        let errors = validate_rule(&rule);
        // Missing heuristics, ai_analysis, and compatible_models
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_pattern_rule_requires_heuristics() {
        let rule = base_rule(RuleType::Pattern);
        let errors = validate_rule(&rule);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("heuristic"));
    }

    #[test]
    fn test_ai_only_rule_does_not_require_heuristics() {
        let mut rule = base_rule(RuleType::AiOnly);
        rule.ai_analysis = Some(ai_config());
        rule.compatible_models = vec!["openai/gpt-4".to_string()];
        assert!(validate_rule(&rule).is_empty());
    }

    #[test]
    fn test_empty_prompt_template_flagged() {
        let mut rule = base_rule(RuleType::AiOnly);
        let mut cfg = ai_config();
        cfg.prompt_template = String::new();
        rule.ai_analysis = Some(cfg);
        rule.compatible_models = vec!["openai/gpt-4".to_string()];
        let errors = validate_rule(&rule);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("prompt_template"));
    }

    #[test]
    fn test_policy_heuristic_rejects_unbalanced_source() {
        let mut rule = base_rule(RuleType::Pattern);
        rule.heuristics = vec![HeuristicRule {
            heuristic_type: HeuristicType::Policy,
            pattern: "package scanner\ndeny[msg] { input.code".to_string(),
            message: "Policy violation".to_string(),
        }];
        let errors = validate_rule(&rule);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("policy"));
    }

    #[test]
    fn test_policy_heuristic_accepts_plausible_source() {
        let mut rule = base_rule(RuleType::Pattern);
        rule.heuristics = vec![HeuristicRule {
            heuristic_type: HeuristicType::Policy,
            pattern: "package scanner\n\ndeny[msg] {\n  contains(input.code, \"eval\")\n  msg := \"eval found\"\n}"
                .to_string(),
            message: "Policy violation".to_string(),
        }];
        assert!(validate_rule(&rule).is_empty());
    }

    #[test]
    fn test_balanced_delimiters() {
        assert!(has_balanced_delimiters("fn main() { let x = [1, 2]; }"));
        assert!(has_balanced_delimiters(r#"msg := "a ( in a string""#));
        assert!(!has_balanced_delimiters("deny[msg] {"));
        assert!(!has_balanced_delimiters("mismatch(]"));
        assert!(!has_balanced_delimiters("\"unclosed"));
        assert!(has_balanced_delimiters(r#""escaped \" quote""#));
    }

    #[test]
    fn test_policy_source_needs_keyword() {
        assert!(!is_plausible_policy_source("x := 1"));
        assert!(is_plausible_policy_source("package example"));
    }
}
