//! Complexity-based model routing
//!
//! Picks the cheapest configured model whose capability tier covers what a
//! task needs. Routing is a pure function of the descriptor and the
//! read-only profile table, so it needs no locking.

pub mod complexity;

pub use complexity::{
    ComplexityDescriptor, ComplexityTier, ContextRequirements, OutputCreativity, ReasoningDepth,
};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Static description of a routable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub identifier: String,
    pub display_name: String,
    pub complexity_tier: ComplexityTier,
    pub relative_cost: f64,
    /// Largest prompt the model accepts, if bounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<usize>,
}

impl ModelProfile {
    pub fn new(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        complexity_tier: ComplexityTier,
        relative_cost: f64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            complexity_tier,
            relative_cost,
            max_context_tokens: None,
        }
    }

    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }

    fn holds(&self, prompt_tokens: usize) -> bool {
        self.max_context_tokens.map_or(true, |max| prompt_tokens <= max)
    }
}

/// Administrative, general-purpose and high-capability defaults
pub fn default_profiles() -> Vec<ModelProfile> {
    vec![
        ModelProfile::new("gpt-3.5-turbo", "GPT-3.5 Turbo", ComplexityTier::Low, 1.0)
            .with_max_context_tokens(16_385),
        ModelProfile::new("gpt-4-turbo", "GPT-4 Turbo", ComplexityTier::Medium, 20.0)
            .with_max_context_tokens(128_000),
        ModelProfile::new("gpt-4", "GPT-4", ComplexityTier::High, 60.0)
            .with_max_context_tokens(8_192),
    ]
}

/// Cheapest first; ties go to the lower tier, then to the identifier
fn by_cost(a: &ModelProfile, b: &ModelProfile) -> Ordering {
    a.relative_cost
        .total_cmp(&b.relative_cost)
        .then_with(|| a.complexity_tier.cmp(&b.complexity_tier))
        .then_with(|| a.identifier.cmp(&b.identifier))
}

/// Model router over an immutable profile table
#[derive(Debug, Clone)]
pub struct ModelRouter {
    profiles: Vec<ModelProfile>,
    /// Index of the most capable (then cheapest) profile
    strongest: usize,
}

impl ModelRouter {
    /// Build a router; the table must be non-empty, uniquely named and
    /// include at least one high-tier model so every descriptor routes
    pub fn new(profiles: Vec<ModelProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(EngineError::Configuration(
                "at least one model profile is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for profile in &profiles {
            if !seen.insert(profile.identifier.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "duplicate model profile '{}'",
                    profile.identifier
                )));
            }
            if !profile.relative_cost.is_finite() || profile.relative_cost < 0.0 {
                return Err(EngineError::Configuration(format!(
                    "model profile '{}' has invalid relative_cost {}",
                    profile.identifier, profile.relative_cost
                )));
            }
        }

        let strongest = profiles
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.complexity_tier
                    .cmp(&b.complexity_tier)
                    .then_with(|| by_cost(b, a))
            })
            .map(|(index, _)| index)
            .unwrap_or(0);

        if profiles[strongest].complexity_tier < ComplexityTier::High {
            return Err(EngineError::Configuration(
                "model profiles must include a high-tier model".to_string(),
            ));
        }

        Ok(Self { profiles, strongest })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(default_profiles())
    }

    /// Cheapest profile capable of the descriptor's required tier
    pub fn select(&self, complexity: &ComplexityDescriptor) -> &ModelProfile {
        let required = complexity.required_tier();
        let selected = self
            .profiles
            .iter()
            .filter(|p| p.complexity_tier >= required)
            .min_by(|a, b| by_cost(a, b))
            .unwrap_or(&self.profiles[self.strongest]);

        debug!(
            "Routed {:?} (tier {}) to {}",
            complexity, required, selected.identifier
        );
        selected
    }

    /// Parse raw dimension values, then select
    pub fn select_raw(
        &self,
        reasoning_depth: Option<&str>,
        context_requirements: Option<&str>,
        output_creativity: Option<&str>,
    ) -> Result<&ModelProfile> {
        let complexity =
            ComplexityDescriptor::parse(reasoning_depth, context_requirements, output_creativity)?;
        Ok(self.select(&complexity))
    }

    /// Like [`select`](Self::select), restricted to models whose context
    /// window holds `prompt_tokens`
    pub fn select_for_prompt(
        &self,
        complexity: &ComplexityDescriptor,
        prompt_tokens: usize,
    ) -> Result<&ModelProfile> {
        let required = complexity.required_tier();
        self.profiles
            .iter()
            .filter(|p| p.complexity_tier >= required && p.holds(prompt_tokens))
            .min_by(|a, b| by_cost(a, b))
            .ok_or(EngineError::NoEligibleModel {
                tier: required,
                prompt_tokens,
            })
    }

    pub fn profile(&self, identifier: &str) -> Option<&ModelProfile> {
        self.profiles.iter().find(|p| p.identifier == identifier)
    }

    pub fn profiles(&self) -> &[ModelProfile] {
        &self.profiles
    }
}
