//! Model provider boundary
//!
//! The engine never talks to a model API itself. Callers plug in an
//! implementation of [`ModelProvider`] that performs the actual request and
//! reports the token counts the provider billed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::Turn;

/// Request handed to the provider after compression and routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub turns: Vec<Turn>,
    pub max_output_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Completed provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    pub prompt_tokens: usize,
    pub response_tokens: usize,
}

/// Failure reported by a provider, with its status detail attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderError {
    pub fn new(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "Provider error (HTTP {}): {}", status, self.detail),
            None => write!(f, "Provider error: {}", self.detail),
        }
    }
}

impl std::error::Error for ProviderError {}

/// External model provider capability
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Execute a request. Retries are the caller's concern.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
