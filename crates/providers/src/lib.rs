pub mod anthropic;
pub mod retry;

use async_trait::async_trait;
use browserpilot_core::{Decision, Observation, Result, Transcript};

/// Everything the decision service sees for one turn. The observation and
/// context text accompany the transcript but are not part of it.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub transcript: &'a Transcript,
    pub observation: &'a Observation,
    pub context: &'a str,
}

#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision>;
}

pub use anthropic::AnthropicComputerUse;
pub use retry::RetryingDecisionService;
