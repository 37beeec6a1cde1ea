//! Remote AI analysis collaborator interface
//!
//! The engine never talks to a model provider directly; the caller injects
//! an implementation of [`AiAnalysisClient`] that owns transport and auth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request sent to the AI analysis collaborator
#[derive(Debug, Clone, Serialize)]
pub struct AiAnalysisRequest {
    pub code_snippet: String,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Cost accounting attached to every AI response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiResponseMetadata {
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

/// Raw response from the AI analysis collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisResponse {
    pub content: String,
    #[serde(default)]
    pub metadata: AiResponseMetadata,
}

/// Submits code for remote AI analysis
#[async_trait]
pub trait AiAnalysisClient: Send + Sync {
    async fn submit_analysis(
        &self,
        request: AiAnalysisRequest,
    ) -> Result<AiAnalysisResponse, Box<dyn std::error::Error + Send + Sync>>;
}
