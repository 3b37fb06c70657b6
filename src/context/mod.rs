//! Context management with token budget enforcement
//!
//! This module fits conversation turns into a token budget. Turns are
//! measured through a [`Tokenizer`], ranked by a pluggable
//! [`PriorityScorer`] and admitted whole until the budget is spent.

pub mod budget;
pub mod compressor;
pub mod models;
pub mod scoring;
pub mod tokenizer;

pub use budget::ContextBudget;
pub use compressor::ContextCompressor;
pub use models::{CompressionOutcome, CompressionRequest, Role, Turn, TurnId};
pub use scoring::{DefaultScorer, PinnedScorer, PriorityScorer, RecencyScorer, RelevanceScorer, TurnPosition};
pub use tokenizer::{Encoding, TiktokenTokenizer, TokenId, Tokenizer, WordBasedTokenizer};
