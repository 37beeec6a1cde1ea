//! Literal line-pattern evaluator
//!
//! Scans code line by line for literal containment of the heuristic pattern
//! and emits one finding per matching line.

use serde_json::json;

use hs_rules::{HeuristicRule, HybridRule};
use hs_types::{CodeContext, Finding};

/// Evaluate a pattern heuristic against a code context
pub fn evaluate(rule: &HybridRule, heuristic: &HeuristicRule, ctx: &CodeContext) -> Vec<Finding> {
    if heuristic.pattern.is_empty() || !ctx.code_snippet.contains(&heuristic.pattern) {
        return Vec::new();
    }

    ctx.code_snippet
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains(&heuristic.pattern))
        .map(|(idx, line)| {
            let line_num = (idx + 1) as u32;
            Finding {
                rule_id: rule.id.clone(),
                message: heuristic.message.clone(),
                path: ctx.file_path.clone(),
                start_line: line_num,
                end_line: line_num,
                severity: rule.severity,
                category: rule.category.clone(),
                metadata: json!({
                    "pattern": heuristic.pattern,
                    "matched_line": line.trim(),
                    "engine": "pattern",
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_rules::{ExecutionConfig, HeuristicType, RuleType};
    use hs_types::Severity;

    fn rule() -> HybridRule {
        HybridRule {
            id: "eval-usage".to_string(),
            name: "Eval Usage".to_string(),
            category: "injection".to_string(),
            subcategory: String::new(),
            severity: Severity::High,
            rule_type: RuleType::Pattern,
            compatible_models: vec![],
            heuristics: vec![],
            ai_analysis: None,
            execution: ExecutionConfig::default(),
            tags: vec![],
            version: "1.0".to_string(),
        }
    }

    fn heuristic(pattern: &str) -> HeuristicRule {
        HeuristicRule {
            heuristic_type: HeuristicType::Pattern,
            pattern: pattern.to_string(),
            message: "Use of eval".to_string(),
        }
    }

    #[test]
    fn test_single_match_reports_line_number() {
        let ctx = CodeContext::new("import os\nimport sys\nresult = eval(x)\n", "app.py");
        let findings = evaluate(&rule(), &heuristic("eval("), &ctx);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line, 3);
        assert_eq!(findings[0].end_line, 3);
        assert_eq!(findings[0].rule_id, "eval-usage");
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].path, "app.py");
    }

    #[test]
    fn test_one_finding_per_matching_line() {
        let ctx = CodeContext::new("eval(a)\nsafe()\neval(b)\n", "app.py");
        let findings = evaluate(&rule(), &heuristic("eval("), &ctx);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].start_line, 1);
        assert_eq!(findings[1].start_line, 3);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let ctx = CodeContext::new("print('hello')\n", "app.py");
        assert!(evaluate(&rule(), &heuristic("eval("), &ctx).is_empty());
    }

    #[test]
    fn test_metadata_carries_matched_line() {
        let ctx = CodeContext::new("    result = eval(x)\n", "app.py");
        let findings = evaluate(&rule(), &heuristic("eval("), &ctx);
        assert_eq!(findings[0].metadata["matched_line"], "result = eval(x)");
        assert_eq!(findings[0].metadata["engine"], "pattern");
    }

    #[test]
    fn test_empty_pattern_matches_nothing() {
        let ctx = CodeContext::new("code\n", "app.py");
        assert!(evaluate(&rule(), &heuristic(""), &ctx).is_empty());
    }
}
