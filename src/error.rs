//! Error types shared by every engine component

use thiserror::Error;

use crate::provider::ProviderError;
use crate::router::ComplexityTier;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Must-keep content alone does not fit. Raise the budget or drop
    /// required turns before retrying.
    #[error("Budget infeasible: must-keep turns need {required} tokens, budget is {budget} tokens")]
    BudgetInfeasible { required: usize, budget: usize },

    #[error("Unsupported model: no tokenizer vocabulary for '{0}'")]
    UnsupportedModel(String),

    #[error("Unknown complexity value '{value}' for dimension '{dimension}'")]
    UnknownComplexityValue { dimension: String, value: String },

    #[error("No model of tier {tier} or above accepts a {prompt_tokens}-token prompt")]
    NoEligibleModel { tier: ComplexityTier, prompt_tokens: usize },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Whether the caller may retry the same call unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Provider(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
