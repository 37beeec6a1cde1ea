//! AI trigger policy
//!
//! Decides whether the expensive AI phase runs for a rule given the
//! heuristic outcome and the target file. The high-risk lists are a policy
//! choice, so they are injectable rather than fixed.

use hs_rules::{AiTrigger, HybridRule};
use hs_types::CodeContext;

/// Extensions and path keywords that mark a file as high risk
#[derive(Debug, Clone)]
pub struct HighRiskFileConfig {
    pub extensions: Vec<String>,
    pub path_keywords: Vec<String>,
}

impl Default for HighRiskFileConfig {
    fn default() -> Self {
        Self {
            extensions: [".py", ".js", ".ts", ".java", ".cpp", ".c", ".php"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            path_keywords: ["config", "auth", "security", "admin"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl HighRiskFileConfig {
    pub fn is_high_risk(&self, file_path: &str) -> bool {
        let lower = file_path.to_lowercase();
        if self.extensions.iter().any(|ext| lower.ends_with(ext)) {
            return true;
        }
        self.path_keywords.iter().any(|kw| lower.contains(kw))
    }
}

/// The AI phase runs iff the rule carries an AI config and at least one of
/// its triggers fires.
pub fn should_run_ai_analysis(
    rule: &HybridRule,
    heuristic_finding_count: usize,
    ctx: &CodeContext,
    high_risk: &HighRiskFileConfig,
) -> bool {
    let Some(ai_config) = &rule.ai_analysis else {
        return false;
    };

    for trigger in &ai_config.trigger {
        match trigger {
            AiTrigger::Always => return true,
            AiTrigger::HeuristicsMatched if heuristic_finding_count > 0 => return true,
            AiTrigger::HighRiskFiles if high_risk.is_high_risk(&ctx.file_path) => return true,
            _ => {}
        }
    }

    false
}
