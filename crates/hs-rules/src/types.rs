//! Rule data model
//!
//! Bundles and rules are immutable once parsed; re-running a scan re-parses
//! rather than mutating in place.

use hs_types::Severity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rule loading and validation errors
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Bundle format error: {0}")]
    Format(String),

    #[error("Rule '{rule_id}' failed validation: {}", .errors.join("; "))]
    Validation {
        rule_id: String,
        errors: Vec<String>,
    },

    #[error("Bundle '{bundle}' has invalid rules: {}", .errors.join("; "))]
    InvalidBundle {
        bundle: String,
        errors: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RulesError {
    fn from(err: serde_json::Error) -> Self {
        RulesError::Format(err.to_string())
    }
}

impl From<serde_yaml::Error> for RulesError {
    fn from(err: serde_yaml::Error) -> Self {
        RulesError::Format(err.to_string())
    }
}

/// How a rule is executed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Heuristic pattern matching only (legacy wire name: "opengrep")
    #[serde(alias = "opengrep")]
    Pattern,
    /// Policy evaluation only (legacy wire name: "opa")
    #[serde(alias = "opa")]
    Policy,
    /// Heuristics plus conditional AI analysis
    Hybrid,
    /// AI analysis only
    #[serde(alias = "ai-only")]
    AiOnly,
}

impl RuleType {
    /// Rule types that must carry at least one heuristic
    pub fn requires_heuristics(&self) -> bool {
        matches!(self, Self::Pattern | Self::Hybrid)
    }

    /// Rule types that must carry an AI analysis config
    pub fn requires_ai_analysis(&self) -> bool {
        matches!(self, Self::Hybrid | Self::AiOnly)
    }
}

/// Evaluation strategy for a single heuristic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicType {
    /// Literal substring/line matching (legacy wire name: "semgrep")
    #[serde(alias = "semgrep")]
    Pattern,
    /// Policy-language evaluation (legacy wire name: "opa")
    #[serde(alias = "opa")]
    Policy,
}

/// A single heuristic within a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicRule {
    #[serde(rename = "type")]
    pub heuristic_type: HeuristicType,
    pub pattern: String,
    pub message: String,
}

/// Condition under which the AI phase runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiTrigger {
    Always,
    HeuristicsMatched,
    HighRiskFiles,
}

/// AI analysis configuration for hybrid and ai_only rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisConfig {
    #[serde(default = "default_trigger")]
    pub trigger: Vec<AiTrigger>,
    pub prompt_template: String,
    #[serde(default)]
    pub expected_response_schema: serde_json::Value,
}

fn default_trigger() -> Vec<AiTrigger> {
    vec![AiTrigger::Always]
}

/// Per-rule execution tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_cache_results")]
    pub cache_results: bool,
    #[serde(default = "default_cache_duration")]
    pub cache_duration: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.1
}

fn default_cache_results() -> bool {
    true
}

fn default_cache_duration() -> String {
    "7d".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            cache_results: default_cache_results(),
            cache_duration: default_cache_duration(),
            fallback_model: None,
        }
    }
}

/// A hybrid rule combining local heuristics with optional AI escalation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridRule {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    pub severity: Severity,
    pub rule_type: RuleType,
    #[serde(default)]
    pub compatible_models: Vec<String>,
    #[serde(default)]
    pub heuristics: Vec<HeuristicRule>,
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysisConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_rule_version")]
    pub version: String,
}

fn default_rule_version() -> String {
    "1.0".to_string()
}

/// A versioned, named collection of rules distributed as a unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBundle {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub rules: Vec<HybridRule>,
}

/// A heuristic projected out of its rule, for handing to an external
/// full-scan engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedHeuristic {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub category: String,
    pub subcategory: String,
    pub tags: Vec<String>,
    pub pattern: String,
    pub message: String,
}
