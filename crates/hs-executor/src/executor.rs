//! Hybrid execution orchestrator
//!
//! Runs a rule's heuristics, applies the trigger policy, consults the
//! budget gate, and conditionally escalates to the AI collaborator. Every
//! failure past loading is isolated: a broken heuristic, a blocked budget,
//! or a failed AI call degrades that phase and the scan continues.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hs_heuristics::HeuristicEvaluator;
use hs_rules::{HybridRule, RuleBundle};
use hs_types::{CodeContext, Finding, Severity};
use hs_usage::{UsageRecord, UsageTracker};

use crate::client::{AiAnalysisClient, AiAnalysisRequest, AiAnalysisResponse};
use crate::models::select_model;
use crate::prompt::render_prompt_template;
use crate::trigger::{should_run_ai_analysis, HighRiskFileConfig};

/// Default bounded concurrency for rules within one bundle
const DEFAULT_RULE_CONCURRENCY: usize = 4;

/// Result of the local heuristic phase
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicResult {
    pub findings: Vec<Finding>,
    pub execution_time_ms: u64,
}

/// Parsed result of the remote AI phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResult {
    pub severity: Severity,
    pub vulnerable_lines: Vec<u32>,
    pub description: String,
    pub remediation: String,
    pub mapping_tags: Vec<String>,
    pub confidence: f64,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

/// Why the AI phase did not produce a result for a rule
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiSkipReason {
    /// Trigger policy did not fire
    NotTriggered,
    /// Budget gate blocked escalation
    BudgetExceeded,
    /// No AI collaborator was injected
    NoClient,
    /// The AI call or response parse failed
    Failed,
}

/// Combined per-rule result. Heuristics are always present; the AI phase is
/// present or annotated with why it was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct HybridExecutionResult {
    pub rule_id: String,
    pub heuristics: HeuristicResult,
    pub ai_analysis: Option<AiResult>,
    pub ai_skipped: Option<AiSkipReason>,
    pub execution_time_ms: u64,
    pub total_cost_usd: f64,
}

/// Aggregate statistics over a bundle execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub total_rules: usize,
    pub heuristic_executions: usize,
    pub ai_executions: usize,
    pub ai_skipped_budget: usize,
    pub total_findings: usize,
    pub total_execution_time_ms: u64,
    pub total_cost_usd: f64,
    pub average_cost_per_rule: f64,
}

/// Orchestrates the heuristic and AI phases for hybrid rules.
///
/// Collaborators are injected; the executor owns no global state.
pub struct HybridRuleExecutor {
    heuristics: HeuristicEvaluator,
    ai_client: Option<Arc<dyn AiAnalysisClient>>,
    usage: Option<Arc<UsageTracker>>,
    high_risk: HighRiskFileConfig,
    rule_concurrency: usize,
}

impl HybridRuleExecutor {
    pub fn new(
        heuristics: HeuristicEvaluator,
        ai_client: Option<Arc<dyn AiAnalysisClient>>,
        usage: Option<Arc<UsageTracker>>,
    ) -> Self {
        Self {
            heuristics,
            ai_client,
            usage,
            high_risk: HighRiskFileConfig::default(),
            rule_concurrency: DEFAULT_RULE_CONCURRENCY,
        }
    }

    pub fn with_high_risk_config(mut self, config: HighRiskFileConfig) -> Self {
        self.high_risk = config;
        self
    }

    pub fn with_rule_concurrency(mut self, concurrency: usize) -> Self {
        self.rule_concurrency = concurrency.max(1);
        self
    }

    /// Execute one rule: heuristics, trigger policy, budget gate, AI phase.
    pub async fn execute_rule(
        &self,
        rule: &HybridRule,
        ctx: &CodeContext,
    ) -> HybridExecutionResult {
        let start = Instant::now();

        let heuristic_result = self.execute_heuristics(rule, ctx).await;

        let triggered =
            should_run_ai_analysis(rule, heuristic_result.findings.len(), ctx, &self.high_risk);

        let (ai_result, ai_skipped) = if !triggered {
            (None, Some(AiSkipReason::NotTriggered))
        } else if self
            .usage
            .as_ref()
            .is_some_and(|u| u.should_block_ai_analysis())
        {
            warn!(
                "Skipping AI analysis for rule '{}': monthly budget exceeded",
                rule.id
            );
            (None, Some(AiSkipReason::BudgetExceeded))
        } else if let Some(client) = &self.ai_client {
            match self
                .execute_ai_analysis(client.as_ref(), rule, ctx, &heuristic_result)
                .await
            {
                Ok(result) => (Some(result), None),
                Err(e) => {
                    warn!("AI analysis failed for rule '{}': {}", rule.id, e);
                    (None, Some(AiSkipReason::Failed))
                }
            }
        } else {
            debug!("No AI client configured, rule '{}' is heuristics-only", rule.id);
            (None, Some(AiSkipReason::NoClient))
        };

        let total_cost_usd = ai_result.as_ref().map_or(0.0, |r| r.cost_usd);

        HybridExecutionResult {
            rule_id: rule.id.clone(),
            heuristics: heuristic_result,
            ai_analysis: ai_result,
            ai_skipped,
            execution_time_ms: start.elapsed().as_millis() as u64,
            total_cost_usd,
        }
    }

    /// Execute every rule in a bundle with bounded concurrency.
    ///
    /// Rules are independent; a failure inside one rule's evaluation never
    /// cancels its siblings, and results come back in bundle order.
    pub async fn execute_bundle_rules(
        &self,
        bundle: &RuleBundle,
        ctx: &CodeContext,
    ) -> Vec<HybridExecutionResult> {
        use futures::StreamExt;

        info!(
            "Executing {} rules from bundle '{}'",
            bundle.rules.len(),
            bundle.id
        );

        futures::stream::iter(bundle.rules.iter())
            .map(|rule| self.execute_rule(rule, ctx))
            .buffered(self.rule_concurrency)
            .collect()
            .await
    }

    /// Aggregate statistics; computed only after all rules have completed.
    pub fn get_execution_stats(&self, results: &[HybridExecutionResult]) -> ExecutionStats {
        let total_execution_time_ms = results.iter().map(|r| r.execution_time_ms).sum();
        let total_cost_usd: f64 = results.iter().map(|r| r.total_cost_usd).sum();
        let ai_executions = results.iter().filter(|r| r.ai_analysis.is_some()).count();
        let ai_skipped_budget = results
            .iter()
            .filter(|r| r.ai_skipped == Some(AiSkipReason::BudgetExceeded))
            .count();
        let total_findings = results.iter().map(|r| r.heuristics.findings.len()).sum();

        ExecutionStats {
            total_rules: results.len(),
            heuristic_executions: results.len(),
            ai_executions,
            ai_skipped_budget,
            total_findings,
            total_execution_time_ms,
            total_cost_usd,
            average_cost_per_rule: if results.is_empty() {
                0.0
            } else {
                total_cost_usd / results.len() as f64
            },
        }
    }

    async fn execute_heuristics(&self, rule: &HybridRule, ctx: &CodeContext) -> HeuristicResult {
        let start = Instant::now();
        let mut findings = Vec::new();

        for heuristic in &rule.heuristics {
            match self.heuristics.evaluate(rule, heuristic, ctx).await {
                Ok(mut heuristic_findings) => findings.append(&mut heuristic_findings),
                Err(e) => {
                    // One broken heuristic never aborts its siblings
                    warn!(
                        "Heuristic {:?} failed for rule '{}': {}",
                        heuristic.heuristic_type, rule.id, e
                    );
                }
            }
        }

        HeuristicResult {
            findings,
            execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn execute_ai_analysis(
        &self,
        client: &dyn AiAnalysisClient,
        rule: &HybridRule,
        ctx: &CodeContext,
        heuristic_result: &HeuristicResult,
    ) -> Result<AiResult, Box<dyn std::error::Error + Send + Sync>> {
        let Some(ai_config) = &rule.ai_analysis else {
            return Err("rule has no AI analysis config".into());
        };

        let prompt = render_prompt_template(
            &ai_config.prompt_template,
            ctx,
            heuristic_result.findings.len(),
        );
        let model = select_model(&rule.compatible_models);

        debug!("Submitting rule '{}' for AI analysis with {}", rule.id, model);

        let response = client
            .submit_analysis(AiAnalysisRequest {
                code_snippet: ctx.code_snippet.clone(),
                model: model.clone(),
                prompt,
                max_tokens: rule.execution.max_tokens,
                temperature: rule.execution.temperature,
            })
            .await?;

        let result = parse_ai_response(&response, rule);

        if let Some(usage) = &self.usage {
            let record = UsageRecord::new("ai_analysis", result.tokens_used, result.cost_usd)
                .with_model(model);
            if let Err(e) = usage.record_usage(record) {
                warn!("Failed to record AI usage: {}", e);
            }
        }

        Ok(result)
    }
}

/// Parse the collaborator's response into a structured result.
///
/// The content is expected to be a JSON document matching the rule's
/// response schema; missing or malformed fields fall back to neutral
/// values with the raw content kept as the description.
fn parse_ai_response(response: &AiAnalysisResponse, rule: &HybridRule) -> AiResult {
    let parsed: Option<serde_json::Value> = serde_json::from_str(&response.content).ok();
    let obj = parsed.as_ref().and_then(|v| v.as_object());

    let severity = obj
        .and_then(|o| o.get("severity"))
        .and_then(|v| v.as_str())
        .and_then(Severity::parse)
        .unwrap_or(rule.severity);

    let vulnerable_lines = obj
        .and_then(|o| o.get("vulnerable_lines"))
        .and_then(|v| v.as_array())
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_u64())
                .map(|l| l as u32)
                .collect()
        })
        .unwrap_or_default();

    let description = obj
        .and_then(|o| o.get("description"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| response.content.clone());

    let remediation = obj
        .and_then(|o| o.get("remediation"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mapping_tags = obj
        .and_then(|o| o.get("mapping_tags"))
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let confidence = obj
        .and_then(|o| o.get("confidence"))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    AiResult {
        severity,
        vulnerable_lines,
        description,
        remediation,
        mapping_tags,
        confidence,
        tokens_used: response.metadata.tokens_used,
        cost_usd: response.metadata.cost_usd,
    }
}
