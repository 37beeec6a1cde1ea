//! Heuristic evaluators
//!
//! Two interchangeable strategies behind one entry point: a literal
//! line-pattern matcher and a policy evaluator with two execution paths
//! (a long-lived evaluation service, then a one-shot subprocess).
//!
//! Evaluators are cheap, local, and deterministic; they gate the expensive
//! AI phase. Full pattern-matching power lives in the external scan engines,
//! not here.

pub mod pattern;
pub mod policy;

use thiserror::Error;

use hs_rules::{HeuristicRule, HeuristicType, HybridRule};
use hs_types::{CodeContext, Finding};

pub use policy::{PolicyEvaluator, PolicyEvaluatorConfig};

/// Error from a single heuristic evaluation. Non-fatal to the containing
/// rule: the orchestrator logs it and continues with sibling heuristics.
#[derive(Debug, Error)]
pub enum HeuristicError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Policy evaluation failed: {0}")]
    Evaluation(String),
}

/// Dispatches a heuristic to its evaluation strategy
#[derive(Debug)]
pub struct HeuristicEvaluator {
    policy: PolicyEvaluator,
}

impl Default for HeuristicEvaluator {
    fn default() -> Self {
        Self::new(PolicyEvaluatorConfig::default())
    }
}

impl HeuristicEvaluator {
    pub fn new(policy_config: PolicyEvaluatorConfig) -> Self {
        Self {
            policy: PolicyEvaluator::new(policy_config),
        }
    }

    /// Evaluate one heuristic against a code context.
    ///
    /// An unavailable policy backend degrades to no findings (logged by the
    /// policy evaluator); a genuine evaluation failure is returned as an
    /// error for the caller to isolate.
    pub async fn evaluate(
        &self,
        rule: &HybridRule,
        heuristic: &HeuristicRule,
        ctx: &CodeContext,
    ) -> Result<Vec<Finding>, HeuristicError> {
        match heuristic.heuristic_type {
            HeuristicType::Pattern => Ok(pattern::evaluate(rule, heuristic, ctx)),
            HeuristicType::Policy => self.policy.evaluate(rule, heuristic, ctx).await,
        }
    }
}
