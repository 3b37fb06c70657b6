//! Pluggable turn priority scoring
//!
//! The compressor ranks optional turns by the score returned here, so
//! swapping the scorer changes what survives compression without touching
//! the admission algorithm.

use std::collections::HashSet;
use std::sync::Arc;

use super::models::{Turn, TurnId};

/// Where a turn sits in the conversation being compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnPosition {
    /// Zero-based insertion index
    pub index: usize,
    /// Number of turns in the conversation
    pub total: usize,
    /// Token cost of the turn
    pub tokens: usize,
}

impl TurnPosition {
    /// Recency in (0.0, 1.0]; the newest turn scores 1.0
    pub fn recency(&self) -> f64 {
        (self.index + 1) as f64 / self.total.max(1) as f64
    }
}

/// Importance score for a turn (higher = more likely retained)
pub trait PriorityScorer: Send + Sync {
    fn score(&self, turn: &Turn, position: &TurnPosition) -> f64;
}

/// Explicit priority when present, otherwise a recency/brevity blend.
///
/// Weights: recency (70%), brevity (30%). Brevity decays with token cost
/// relative to `reference_tokens`.
#[derive(Debug, Clone)]
pub struct DefaultScorer {
    reference_tokens: usize,
}

impl DefaultScorer {
    pub fn new(reference_tokens: usize) -> Self {
        Self {
            reference_tokens: reference_tokens.max(1),
        }
    }
}

impl Default for DefaultScorer {
    fn default() -> Self {
        Self::new(200)
    }
}

impl PriorityScorer for DefaultScorer {
    fn score(&self, turn: &Turn, position: &TurnPosition) -> f64 {
        if let Some(priority) = turn.priority() {
            return priority;
        }
        let brevity = 1.0 / (1.0 + position.tokens as f64 / self.reference_tokens as f64);
        position.recency() * 0.7 + brevity * 0.3
    }
}

/// Newest first, ignoring content and explicit priorities
#[derive(Debug, Clone, Default)]
pub struct RecencyScorer;

impl PriorityScorer for RecencyScorer {
    fn score(&self, _turn: &Turn, position: &TurnPosition) -> f64 {
        position.recency()
    }
}

/// Keyword overlap between a turn and the current query
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    query_words: HashSet<String>,
}

impl RelevanceScorer {
    pub fn new(query: &str) -> Self {
        Self {
            query_words: query.to_lowercase().split_whitespace().map(str::to_string).collect(),
        }
    }
}

impl PriorityScorer for RelevanceScorer {
    fn score(&self, turn: &Turn, _position: &TurnPosition) -> f64 {
        if self.query_words.is_empty() {
            return 0.0;
        }
        let content = turn.content().to_lowercase();
        let turn_words: HashSet<&str> = content.split_whitespace().collect();
        let overlap = self
            .query_words
            .iter()
            .filter(|w| turn_words.contains(w.as_str()))
            .count();
        overlap as f64 / self.query_words.len() as f64
    }
}

/// Boosts user-pinned turns above everything the inner scorer produces
pub struct PinnedScorer {
    pinned: HashSet<TurnId>,
    inner: Arc<dyn PriorityScorer>,
    boost: f64,
}

impl PinnedScorer {
    pub fn new<I>(pinned: I, inner: Arc<dyn PriorityScorer>) -> Self
    where
        I: IntoIterator<Item = TurnId>,
    {
        Self {
            pinned: pinned.into_iter().collect(),
            inner,
            boost: 1_000.0,
        }
    }
}

impl PriorityScorer for PinnedScorer {
    fn score(&self, turn: &Turn, position: &TurnPosition) -> f64 {
        let base = self.inner.score(turn, position);
        if self.pinned.contains(turn.id()) {
            base + self.boost
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(index: usize, total: usize, tokens: usize) -> TurnPosition {
        TurnPosition { index, total, tokens }
    }

    #[test]
    fn test_default_scorer_prefers_recent_turns() {
        let scorer = DefaultScorer::default();
        let turn = Turn::user("u", "same text", 0);
        let old = scorer.score(&turn, &position(0, 10, 50));
        let new = scorer.score(&turn, &position(9, 10, 50));
        assert!(new > old);
    }

    #[test]
    fn test_default_scorer_prefers_short_turns() {
        let scorer = DefaultScorer::default();
        let turn = Turn::user("u", "text", 0);
        let short = scorer.score(&turn, &position(5, 10, 20));
        let long = scorer.score(&turn, &position(5, 10, 2000));
        assert!(short > long);
    }

    #[test]
    fn test_default_scorer_uses_explicit_priority() {
        let scorer = DefaultScorer::default();
        let turn = Turn::user("u", "text", 0).with_priority(7.5);
        assert_eq!(scorer.score(&turn, &position(0, 3, 10)), 7.5);
    }

    #[test]
    fn test_relevance_scorer() {
        let scorer = RelevanceScorer::new("async function syntax");
        let relevant = Turn::user("a", "How do I write an async function in Rust", 0);
        let unrelated = Turn::user("b", "What's the weather like", 1);
        let pos = position(0, 2, 10);
        assert!(scorer.score(&relevant, &pos) > scorer.score(&unrelated, &pos));
        assert_eq!(scorer.score(&unrelated, &pos), 0.0);
    }

    #[test]
    fn test_pinned_scorer_boosts_pinned_turns() {
        let scorer = PinnedScorer::new(vec![TurnId::from("keep")], Arc::new(RecencyScorer));
        let pinned = Turn::user("keep", "old but pinned", 0);
        let recent = Turn::user("new", "recent", 9);
        assert!(scorer.score(&pinned, &position(0, 10, 5)) > scorer.score(&recent, &position(9, 10, 5)));
    }
}
