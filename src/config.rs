//! Engine configuration
//!
//! Loaded from a TOML/JSON/YAML file through the `config` crate, then
//! overridden field by field from `ENGINE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::router::{default_profiles, ModelProfile};

/// Longest accepted cache entry lifetime (ten years)
pub const MAX_CACHE_EXPIRY_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model context window in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Fraction of the budget above which a request is compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f32,

    /// Minimum similarity for a near-duplicate cache hit
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Cache entry lifetime in seconds
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry_seconds: u64,

    /// Maximum cache size
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Fall back to near-duplicate lookup on an exact miss
    #[serde(default = "default_near_duplicate_enabled")]
    pub near_duplicate_enabled: bool,

    /// Background sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub cache_sweep_interval_secs: u64,

    /// Tokens held back for the completion
    #[serde(default = "default_reserved_output")]
    pub reserved_output_tokens: usize,

    /// Model used when a compression request names none
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_profiles")]
    pub model_profiles: Vec<ModelProfile>,
}

fn default_context_window() -> usize { 8000 }
fn default_compression_threshold() -> f32 { 0.8 }
fn default_similarity_threshold() -> f32 { 0.9 }
fn default_cache_expiry() -> u64 { 3600 }
fn default_cache_max_entries() -> usize { 1000 }
fn default_near_duplicate_enabled() -> bool { true }
fn default_sweep_interval() -> u64 { 60 }
fn default_reserved_output() -> usize { 1000 }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            compression_threshold: default_compression_threshold(),
            similarity_threshold: default_similarity_threshold(),
            cache_expiry_seconds: default_cache_expiry(),
            cache_max_entries: default_cache_max_entries(),
            near_duplicate_enabled: default_near_duplicate_enabled(),
            cache_sweep_interval_secs: default_sweep_interval(),
            reserved_output_tokens: default_reserved_output(),
            default_model: default_model(),
            model_profiles: default_profiles(),
        }
    }
}

impl EngineConfig {
    /// Load from a file; the format follows the extension.
    /// Nested `ENGINE__*` variables (e.g. `ENGINE__CONTEXT_WINDOW`) override it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::Configuration(format!("{}: {}", path.display(), e)))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// Read `.env`, then the optional file, then env overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        }
        .from_env();
        config.validate()?;
        info!(
            "Loaded engine config: window={}, threshold={}, {} model profiles",
            config.context_window,
            config.compression_threshold,
            config.model_profiles.len()
        );
        Ok(config)
    }

    /// Override fields from environment variables if present
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("ENGINE_CONTEXT_WINDOW") {
            if let Ok(window) = val.parse() {
                self.context_window = window;
            }
        }

        if let Ok(val) = std::env::var("ENGINE_COMPRESSION_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.compression_threshold = threshold;
            }
        }

        if let Ok(val) = std::env::var("ENGINE_SIMILARITY_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.similarity_threshold = threshold;
            }
        }

        if let Ok(val) = std::env::var("ENGINE_CACHE_EXPIRY_SECONDS") {
            if let Ok(secs) = val.parse() {
                self.cache_expiry_seconds = secs;
            }
        }

        if let Ok(val) = std::env::var("ENGINE_CACHE_MAX_ENTRIES") {
            if let Ok(size) = val.parse() {
                self.cache_max_entries = size;
            }
        }

        if let Ok(val) = std::env::var("ENGINE_NEAR_DUPLICATE_ENABLED") {
            self.near_duplicate_enabled = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("ENGINE_CACHE_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                self.cache_sweep_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("ENGINE_RESERVED_OUTPUT_TOKENS") {
            if let Ok(tokens) = val.parse() {
                self.reserved_output_tokens = tokens;
            }
        }

        if let Ok(val) = std::env::var("ENGINE_DEFAULT_MODEL") {
            self.default_model = val;
        }

        self
    }

    /// Validate that the configuration is consistent
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
        if !(self.compression_threshold > 0.0 && self.compression_threshold <= 1.0) {
            return Err(EngineError::Configuration(format!(
                "compression_threshold must be in (0, 1], got {}",
                self.compression_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(EngineError::Configuration(format!(
                "similarity_threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.cache_expiry_seconds > MAX_CACHE_EXPIRY_SECONDS {
            return Err(EngineError::Configuration(format!(
                "cache_expiry_seconds must be at most {}, got {}",
                MAX_CACHE_EXPIRY_SECONDS, self.cache_expiry_seconds
            )));
        }
        if self.cache_max_entries == 0 {
            return Err(EngineError::Configuration(
                "cache_max_entries must be positive".to_string(),
            ));
        }
        if self.model_profiles.is_empty() {
            return Err(EngineError::Configuration(
                "at least one model profile is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for profile in &self.model_profiles {
            if !seen.insert(profile.identifier.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "duplicate model profile '{}'",
                    profile.identifier
                )));
            }
        }
        Ok(())
    }

    /// Get cache expiry as a chrono duration, capped at [`MAX_CACHE_EXPIRY_SECONDS`]
    pub fn cache_ttl(&self) -> chrono::Duration {
        let secs = self.cache_expiry_seconds.min(MAX_CACHE_EXPIRY_SECONDS) as i64;
        chrono::Duration::try_seconds(secs).unwrap_or_else(|| chrono::Duration::days(3650))
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }
}
