//! Context window budget policy
//!
//! Translates the configured context window, completion reservation and
//! compression threshold into the token budget a request is compressed to.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Budget policy for a model's context window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub context_window: usize,
    /// Tokens held back for the model's completion
    pub reserved_output_tokens: usize,
    /// Fraction of the budget at which compression kicks in
    pub compression_threshold: f32,
}

impl ContextBudget {
    pub fn new(
        context_window: usize,
        reserved_output_tokens: usize,
        compression_threshold: f32,
    ) -> Result<Self> {
        let budget = Self {
            context_window,
            reserved_output_tokens,
            compression_threshold,
        };
        budget.validate()?;
        Ok(budget)
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(
            config.context_window,
            config.reserved_output_tokens,
            config.compression_threshold,
        )
    }

    /// Validate that the budget policy is consistent
    pub fn validate(&self) -> Result<()> {
        if self.context_window == 0 {
            return Err(EngineError::Configuration(
                "context_window must be positive".to_string(),
            ));
        }
        if self.reserved_output_tokens >= self.context_window {
            return Err(EngineError::Configuration(format!(
                "reserved_output_tokens ({}) must be below context_window ({})",
                self.reserved_output_tokens, self.context_window
            )));
        }
        if !(0.0..=1.0).contains(&self.compression_threshold) || self.compression_threshold == 0.0 {
            return Err(EngineError::Configuration(format!(
                "compression_threshold must be in (0, 1], got {}",
                self.compression_threshold
            )));
        }
        Ok(())
    }

    /// Prompt tokens available once the completion is reserved
    pub fn prompt_capacity(&self) -> usize {
        self.context_window - self.reserved_output_tokens
    }

    /// Caller budget clamped to what the window can actually hold
    pub fn effective_budget(&self, requested: usize) -> usize {
        requested.min(self.prompt_capacity())
    }

    /// Budget to compress down to once compression is triggered
    pub fn target_budget(&self, budget: usize) -> usize {
        (budget as f64 * self.compression_threshold as f64).floor() as usize
    }

    /// Whether `total` tokens puts enough pressure on `budget` to compress
    pub fn needs_compression(&self, total: usize, budget: usize) -> bool {
        total > self.target_budget(budget)
    }
}
