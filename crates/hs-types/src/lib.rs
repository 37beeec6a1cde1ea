//! Shared types for the hybridscan engine
//!
//! Severity levels, findings, and the code context handed to evaluators.
//! Error enums live with the crates that produce them; this crate only
//! carries the types every layer exchanges.

use serde::{Deserialize, Serialize};

/// Severity level of a rule or finding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl Severity {
    /// Parse severity from string (case-insensitive, defaults to Medium)
    pub fn from_str_lenient(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }

    /// Strict parse: returns None for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A single finding produced by a heuristic evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub message: String,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub severity: Severity,
    pub category: String,
    /// Evaluator-specific detail (matched line, violation document, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Code under evaluation, plus where it came from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeContext {
    pub code_snippet: String,
    pub file_path: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_line_number")]
    pub line_number: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_language() -> String {
    "unknown".to_string()
}

fn default_line_number() -> u32 {
    1
}

impl CodeContext {
    pub fn new(code_snippet: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            code_snippet: code_snippet.into(),
            file_path: file_path.into(),
            language: default_language(),
            line_number: 1,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_severity_lenient_parse() {
        assert_eq!(Severity::from_str_lenient("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_str_lenient("bogus"), Severity::Medium);
    }

    #[test]
    fn test_severity_strict_parse() {
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse("bogus"), None);
    }

    #[test]
    fn test_severity_serde_snake_case() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"high\"");
        let back: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(back, Severity::Critical);
    }

    #[test]
    fn test_code_context_builder() {
        let ctx = CodeContext::new("eval(x)", "app.py").with_language("python");
        assert_eq!(ctx.language, "python");
        assert_eq!(ctx.line_number, 1);
    }
}
