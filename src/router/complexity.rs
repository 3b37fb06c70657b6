//! Task complexity lattice
//!
//! Each dimension maps onto a [`ComplexityTier`]; the tier a task needs is
//! the maximum across its dimensions. Missing dimensions contribute the
//! lowest tier, so only explicit values can escalate a decision.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

/// Capability tier, ordered low < medium < high < very-high
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Low => "low",
            ComplexityTier::Medium => "medium",
            ComplexityTier::High => "high",
            ComplexityTier::VeryHigh => "very-high",
        }
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningDepth {
    Shallow,
    Moderate,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextRequirements {
    Minimal,
    Moderate,
    Extensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCreativity {
    Low,
    Medium,
    High,
}

impl ReasoningDepth {
    pub const ALL: [ReasoningDepth; 3] = [Self::Shallow, Self::Moderate, Self::Deep];

    pub fn tier(self) -> ComplexityTier {
        match self {
            Self::Shallow => ComplexityTier::Low,
            Self::Moderate => ComplexityTier::Medium,
            Self::Deep => ComplexityTier::High,
        }
    }
}

impl ContextRequirements {
    pub const ALL: [ContextRequirements; 3] = [Self::Minimal, Self::Moderate, Self::Extensive];

    pub fn tier(self) -> ComplexityTier {
        match self {
            Self::Minimal => ComplexityTier::Low,
            Self::Moderate => ComplexityTier::Medium,
            Self::Extensive => ComplexityTier::High,
        }
    }
}

impl OutputCreativity {
    pub const ALL: [OutputCreativity; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn tier(self) -> ComplexityTier {
        match self {
            Self::Low => ComplexityTier::Low,
            Self::Medium => ComplexityTier::Medium,
            Self::High => ComplexityTier::High,
        }
    }
}

fn unknown(dimension: &str, value: &str) -> EngineError {
    EngineError::UnknownComplexityValue {
        dimension: dimension.to_string(),
        value: value.to_string(),
    }
}

impl FromStr for ReasoningDepth {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "shallow" => Ok(Self::Shallow),
            "moderate" => Ok(Self::Moderate),
            "deep" => Ok(Self::Deep),
            _ => Err(unknown("reasoning_depth", s)),
        }
    }
}

impl FromStr for ContextRequirements {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "moderate" => Ok(Self::Moderate),
            "extensive" => Ok(Self::Extensive),
            _ => Err(unknown("context_requirements", s)),
        }
    }
}

impl FromStr for OutputCreativity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(unknown("output_creativity", s)),
        }
    }
}

/// Complexity of a task along three dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComplexityDescriptor {
    #[serde(default)]
    pub reasoning_depth: Option<ReasoningDepth>,
    #[serde(default)]
    pub context_requirements: Option<ContextRequirements>,
    #[serde(default)]
    pub output_creativity: Option<OutputCreativity>,
}

impl ComplexityDescriptor {
    pub fn new(
        reasoning_depth: ReasoningDepth,
        context_requirements: ContextRequirements,
        output_creativity: OutputCreativity,
    ) -> Self {
        Self {
            reasoning_depth: Some(reasoning_depth),
            context_requirements: Some(context_requirements),
            output_creativity: Some(output_creativity),
        }
    }

    /// Parse caller-supplied strings; `None` leaves a dimension unset
    pub fn parse(
        reasoning_depth: Option<&str>,
        context_requirements: Option<&str>,
        output_creativity: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            reasoning_depth: reasoning_depth.map(str::parse::<ReasoningDepth>).transpose()?,
            context_requirements: context_requirements.map(str::parse::<ContextRequirements>).transpose()?,
            output_creativity: output_creativity.map(str::parse::<OutputCreativity>).transpose()?,
        })
    }

    /// Tier required by the most demanding dimension
    pub fn required_tier(&self) -> ComplexityTier {
        [
            self.reasoning_depth.map(ReasoningDepth::tier),
            self.context_requirements.map(ContextRequirements::tier),
            self.output_creativity.map(OutputCreativity::tier),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(ComplexityTier::Low)
    }
}
