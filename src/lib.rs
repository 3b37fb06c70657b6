//! Token budget and context compression engine
//!
//! Sits between an application and an LLM API:
//! - [`context`]: fits conversation turns into a token budget
//! - [`cache`]: content-addressed response cache with near-duplicate fallback
//! - [`router`]: picks the cheapest model capable of a task
//! - [`ledger`]: append-only token usage accounting
//! - [`engine`]: the request pipeline wiring them together

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod provider;
pub mod router;
pub mod telemetry;

pub use cache::{CacheEntry, Fingerprint, RequestKey, RequestParams, ResponseCache};
pub use config::EngineConfig;
pub use context::{CompressionRequest, ContextCompressor, Role, Turn, TurnId};
pub use engine::{ContextEngine, EngineRequest, EngineResponse, ResponseSource};
pub use error::{EngineError, Result};
pub use ledger::{UsageLedger, UsageRecord, UsageSummary};
pub use provider::{ModelProvider, ProviderError, ProviderRequest, ProviderResponse};
pub use router::{ComplexityDescriptor, ComplexityTier, ModelProfile, ModelRouter};
