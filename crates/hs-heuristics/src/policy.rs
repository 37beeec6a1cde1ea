//! Policy evaluator
//!
//! Evaluates a policy-language heuristic against a JSON input document built
//! from the code context. Two execution paths are tried in order: a
//! long-lived evaluation service (probed for availability first), then a
//! one-shot executable invocation with a bounded timeout. Each path returns
//! either a result or a typed "unavailable" signal that selects the next;
//! when every path is unavailable the heuristic degrades to no findings
//! with a logged warning.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use hs_rules::{HeuristicRule, HybridRule};
use hs_types::{CodeContext, Finding, Severity};

use crate::HeuristicError;

/// Policy evaluator configuration
#[derive(Debug, Clone)]
pub struct PolicyEvaluatorConfig {
    /// Base URL of the long-lived evaluation service
    pub service_url: String,
    /// Availability probe timeout
    pub probe_timeout: Duration,
    /// Evaluation timeout (service request or subprocess run)
    pub eval_timeout: Duration,
    /// Policy-evaluation executable invoked as the fallback path
    pub executable: String,
}

impl Default for PolicyEvaluatorConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8181".to_string(),
            probe_timeout: Duration::from_secs(10),
            eval_timeout: Duration::from_secs(30),
            executable: "opa".to_string(),
        }
    }
}

/// Outcome of one evaluation strategy
enum StrategyOutcome {
    /// The strategy ran and produced violation documents (possibly none)
    Evaluated(Vec<Value>),
    /// The strategy could not run here; try the next one
    Unavailable(String),
}

/// Evaluates policy heuristics via service or subprocess
#[derive(Debug)]
pub struct PolicyEvaluator {
    config: PolicyEvaluatorConfig,
    http_client: reqwest::Client,
}

impl PolicyEvaluator {
    pub fn new(config: PolicyEvaluatorConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Evaluate a policy heuristic against a code context.
    ///
    /// Temp files for the policy source and input document are removed on
    /// every exit path (they are dropped with this scope).
    pub async fn evaluate(
        &self,
        rule: &HybridRule,
        heuristic: &HeuristicRule,
        ctx: &CodeContext,
    ) -> Result<Vec<Finding>, HeuristicError> {
        let input_doc = json!({
            "code": ctx.code_snippet,
            "file_path": ctx.file_path,
            "language": ctx.language,
            "metadata": ctx.metadata,
        });

        let mut policy_file = tempfile::Builder::new()
            .prefix("hs-policy-")
            .suffix(".rego")
            .tempfile()?;
        policy_file.write_all(heuristic.pattern.as_bytes())?;
        policy_file.flush()?;

        let mut input_file = tempfile::Builder::new()
            .prefix("hs-input-")
            .suffix(".json")
            .tempfile()?;
        input_file.write_all(&serde_json::to_vec(&input_doc)?)?;
        input_file.flush()?;

        match self.try_service(&heuristic.pattern, &input_doc).await {
            StrategyOutcome::Evaluated(violations) => {
                return Ok(map_violations(rule, heuristic, ctx, &violations));
            }
            StrategyOutcome::Unavailable(reason) => {
                debug!("Policy service unavailable, trying subprocess: {}", reason);
            }
        }

        match self
            .try_subprocess(policy_file.path(), input_file.path())
            .await
        {
            StrategyOutcome::Evaluated(violations) => {
                Ok(map_violations(rule, heuristic, ctx, &violations))
            }
            StrategyOutcome::Unavailable(reason) => {
                warn!(
                    "No policy evaluation backend for rule '{}', skipping heuristic: {}",
                    rule.id, reason
                );
                Ok(Vec::new())
            }
        }
    }

    /// Service path: probe, upload the policy, query with the input document
    async fn try_service(&self, policy_source: &str, input_doc: &Value) -> StrategyOutcome {
        let base = self.config.service_url.trim_end_matches('/');

        let probe = self
            .http_client
            .get(format!("{}/health", base))
            .timeout(self.config.probe_timeout)
            .send()
            .await;
        match probe {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                return StrategyOutcome::Unavailable(format!(
                    "service probe returned HTTP {}",
                    resp.status()
                ))
            }
            Err(e) => return StrategyOutcome::Unavailable(format!("service unreachable: {}", e)),
        }

        let upload = self
            .http_client
            .put(format!("{}/v1/policies/scanner", base))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(policy_source.to_string())
            .timeout(self.config.eval_timeout)
            .send()
            .await;
        match upload {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                return StrategyOutcome::Unavailable(format!(
                    "policy upload returned HTTP {}",
                    resp.status()
                ))
            }
            Err(e) => return StrategyOutcome::Unavailable(format!("policy upload failed: {}", e)),
        }

        let query = self
            .http_client
            .post(format!("{}/v1/data", base))
            .json(&json!({ "input": input_doc }))
            .timeout(self.config.eval_timeout)
            .send()
            .await;
        let body: Value = match query {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(body) => body,
                Err(e) => {
                    return StrategyOutcome::Unavailable(format!("malformed service reply: {}", e))
                }
            },
            Ok(resp) => {
                return StrategyOutcome::Unavailable(format!(
                    "data query returned HTTP {}",
                    resp.status()
                ))
            }
            Err(e) => return StrategyOutcome::Unavailable(format!("data query failed: {}", e)),
        };

        StrategyOutcome::Evaluated(extract_violations(&body).unwrap_or_default())
    }

    /// Subprocess path: one-shot `<executable> eval` with a bounded timeout
    async fn try_subprocess(&self, policy_path: &Path, input_path: &Path) -> StrategyOutcome {
        let mut cmd = Command::new(&self.config.executable);
        cmd.arg("eval")
            .arg("--data")
            .arg(policy_path)
            .arg("--input")
            .arg(input_path)
            .args(["--format", "json", "data"])
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.config.eval_timeout, cmd.output()).await {
            Err(_) => {
                return StrategyOutcome::Unavailable(format!(
                    "evaluation timed out after {:?}",
                    self.config.eval_timeout
                ))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return StrategyOutcome::Unavailable(format!(
                    "'{}' executable not found",
                    self.config.executable
                ))
            }
            Ok(Err(e)) => {
                return StrategyOutcome::Unavailable(format!("failed to run evaluator: {}", e))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return StrategyOutcome::Unavailable(format!(
                "evaluator exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let body: Value = match serde_json::from_slice(&output.stdout) {
            Ok(body) => body,
            Err(e) => {
                return StrategyOutcome::Unavailable(format!("unparseable evaluator output: {}", e))
            }
        };

        StrategyOutcome::Evaluated(extract_violations(&body).unwrap_or_default())
    }
}

/// Find the first `violations` array anywhere in an evaluation reply.
/// Handles both the service's `{"result": {...}}` envelope and the
/// executable's `{"result": [{"expressions": [{"value": {...}}]}]}` shape.
fn extract_violations(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(violations)) = map.get("violations") {
                return Some(violations.clone());
            }
            map.values().find_map(extract_violations)
        }
        Value::Array(items) => items.iter().find_map(extract_violations),
        _ => None,
    }
}

/// Convert violation documents into findings
fn map_violations(
    rule: &HybridRule,
    heuristic: &HeuristicRule,
    ctx: &CodeContext,
    violations: &[Value],
) -> Vec<Finding> {
    violations
        .iter()
        .map(|violation| {
            let line = violation.get("line").and_then(|l| l.as_u64()).unwrap_or(1) as u32;
            let message = violation
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(&heuristic.message)
                .to_string();
            let severity = violation
                .get("severity")
                .and_then(|s| s.as_str())
                .and_then(Severity::parse)
                .unwrap_or(rule.severity);

            Finding {
                rule_id: rule.id.clone(),
                message,
                path: ctx.file_path.clone(),
                start_line: line,
                end_line: line,
                severity,
                category: "policy".to_string(),
                metadata: json!({
                    "engine": "policy",
                    "violation": violation,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_rules::{ExecutionConfig, HeuristicType, RuleType};

    fn rule() -> HybridRule {
        HybridRule {
            id: "policy-rule".to_string(),
            name: "Policy Rule".to_string(),
            category: "security".to_string(),
            subcategory: String::new(),
            severity: Severity::Medium,
            rule_type: RuleType::Policy,
            compatible_models: vec![],
            heuristics: vec![],
            ai_analysis: None,
            execution: ExecutionConfig::default(),
            tags: vec![],
            version: "1.0".to_string(),
        }
    }

    fn heuristic() -> HeuristicRule {
        HeuristicRule {
            heuristic_type: HeuristicType::Policy,
            pattern: "package scanner\n\ndeny[msg] { msg := \"x\" }".to_string(),
            message: "Policy violation".to_string(),
        }
    }

    #[test]
    fn test_extract_violations_service_shape() {
        let body = json!({
            "result": {
                "scanner": {
                    "violations": [{"message": "bad", "line": 4}]
                }
            }
        });
        let violations = extract_violations(&body).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0]["line"], 4);
    }

    #[test]
    fn test_extract_violations_subprocess_shape() {
        let body = json!({
            "result": [{
                "expressions": [{
                    "value": {"scanner": {"violations": [{"message": "bad"}]}}
                }]
            }]
        });
        assert_eq!(extract_violations(&body).unwrap().len(), 1);
    }

    #[test]
    fn test_extract_violations_absent() {
        assert!(extract_violations(&json!({"result": {}})).is_none());
    }

    #[test]
    fn test_map_violations_defaults() {
        let ctx = CodeContext::new("code", "config/settings.py");
        let violations = vec![json!({})];
        let findings = map_violations(&rule(), &heuristic(), &ctx, &violations);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line, 1);
        assert_eq!(findings[0].message, "Policy violation");
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].category, "policy");
    }

    #[test]
    fn test_map_violations_explicit_fields() {
        let ctx = CodeContext::new("code", "app.py");
        let violations = vec![json!({"message": "no eval", "line": 7, "severity": "critical"})];
        let findings = map_violations(&rule(), &heuristic(), &ctx, &violations);

        assert_eq!(findings[0].start_line, 7);
        assert_eq!(findings[0].message, "no eval");
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_no_backend_degrades_to_no_findings() {
        // Unroutable service and a nonexistent executable: both strategies
        // report unavailable and the heuristic contributes nothing.
        let evaluator = PolicyEvaluator::new(PolicyEvaluatorConfig {
            service_url: "http://127.0.0.1:9".to_string(),
            probe_timeout: Duration::from_millis(200),
            eval_timeout: Duration::from_secs(1),
            executable: "hs-missing-policy-evaluator".to_string(),
        });

        let ctx = CodeContext::new("eval(x)", "app.py");
        let findings = evaluator.evaluate(&rule(), &heuristic(), &ctx).await.unwrap();
        assert!(findings.is_empty());
    }
}
