//! Hybrid rule execution
//!
//! Sequences the local heuristic phase and the conditional remote AI phase
//! for each rule: run heuristics, apply the trigger policy, consult the
//! budget gate, render a prompt, select a model, and invoke the injected
//! AI collaborator. Per-rule and per-heuristic failures are isolated so a
//! scan always returns best-effort partial results.

pub mod client;
pub mod executor;
pub mod models;
pub mod prompt;
pub mod trigger;

pub use client::{AiAnalysisClient, AiAnalysisRequest, AiAnalysisResponse, AiResponseMetadata};
pub use executor::{
    AiResult, AiSkipReason, ExecutionStats, HeuristicResult, HybridExecutionResult,
    HybridRuleExecutor,
};
pub use models::{select_model, DEFAULT_MODEL, MODEL_PRIORITY};
pub use prompt::render_prompt_template;
pub use trigger::{should_run_ai_analysis, HighRiskFileConfig};
