//! Context window compressor
//!
//! Fits an ordered conversation into a token budget:
//! - Must-keep turns are always retained (or the call fails outright)
//! - Optional turns are ranked by score, then recency, then insertion order
//! - Turns are admitted whole, greedily, in rank order
//! - The admitted set is returned in original conversation order
//!
//! Compression is a pure function of its inputs and holds no locks.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::models::{CompressionOutcome, CompressionRequest, Turn, TurnId};
use super::scoring::{DefaultScorer, PriorityScorer, TurnPosition};
use super::tokenizer::Tokenizer;
use crate::error::{EngineError, Result};

/// Ranking entry for an optional turn
struct Candidate {
    index: usize,
    score: f64,
    timestamp: u64,
}

/// Priority key descending, recency descending, insertion order ascending
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
        .then_with(|| a.index.cmp(&b.index))
}

/// Context window compressor
pub struct ContextCompressor {
    tokenizer: Arc<dyn Tokenizer>,
    scorer: Arc<dyn PriorityScorer>,
}

impl ContextCompressor {
    /// Create a compressor using the default recency/brevity scorer
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self::with_scorer(tokenizer, Arc::new(DefaultScorer::default()))
    }

    pub fn with_scorer(tokenizer: Arc<dyn Tokenizer>, scorer: Arc<dyn PriorityScorer>) -> Self {
        Self { tokenizer, scorer }
    }

    /// Compress `request` into a turn sequence within its budget
    pub fn compress(&self, request: &CompressionRequest) -> Result<Vec<Turn>> {
        self.compress_with_report(request).map(|outcome| outcome.turns)
    }

    /// Compress and report token totals and dropped turns
    pub fn compress_with_report(&self, request: &CompressionRequest) -> Result<CompressionOutcome> {
        let budget = request.budget_tokens;
        validate_ids(request)?;

        if budget == 0 && !request.must_keep.is_empty() {
            return Err(EngineError::BudgetInfeasible { required: 0, budget });
        }

        if request.turns.is_empty() {
            return Ok(CompressionOutcome {
                turns: Vec::new(),
                total_tokens: 0,
                budget_tokens: budget,
                dropped: Vec::new(),
            });
        }

        // A turn's text never changes, so its cost is measured once per call
        let costs = self.turn_costs(&request.turns, &request.model)?;

        let must_keep_cost: usize = request
            .turns
            .iter()
            .zip(&costs)
            .filter(|(turn, _)| request.must_keep.contains(turn.id()))
            .map(|(_, cost)| cost)
            .sum();

        if must_keep_cost > budget {
            return Err(EngineError::BudgetInfeasible {
                required: must_keep_cost,
                budget,
            });
        }

        let total = request.turns.len();
        let mut candidates: Vec<Candidate> = request
            .turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| !request.must_keep.contains(turn.id()))
            .map(|(index, turn)| {
                let position = TurnPosition {
                    index,
                    total,
                    tokens: costs[index],
                };
                let score = self.scorer.score(turn, &position);
                Candidate {
                    index,
                    score: if score.is_nan() { f64::NEG_INFINITY } else { score },
                    timestamp: turn.timestamp(),
                }
            })
            .collect();
        candidates.sort_by(rank);

        let mut admitted: Vec<bool> = request
            .turns
            .iter()
            .map(|turn| request.must_keep.contains(turn.id()))
            .collect();
        let mut remaining = budget - must_keep_cost;

        for candidate in &candidates {
            let cost = costs[candidate.index];
            if cost <= remaining {
                admitted[candidate.index] = true;
                remaining -= cost;
            }
        }

        let mut turns = Vec::new();
        let mut dropped = Vec::new();
        let mut total_tokens = 0;
        for (index, turn) in request.turns.iter().enumerate() {
            if admitted[index] {
                total_tokens += costs[index];
                turns.push(turn.clone());
            } else {
                dropped.push(turn.id().clone());
            }
        }

        debug!(
            "Compressed {} turns to {} ({} tokens of {} budget, {} must-keep)",
            total,
            turns.len(),
            total_tokens,
            budget,
            must_keep_cost
        );

        Ok(CompressionOutcome {
            turns,
            total_tokens,
            budget_tokens: budget,
            dropped,
        })
    }

    /// Total token cost of `turns` for `model`
    pub fn measure(&self, turns: &[Turn], model: &str) -> Result<usize> {
        Ok(self.turn_costs(turns, model)?.into_iter().sum())
    }

    fn turn_costs(&self, turns: &[Turn], model: &str) -> Result<Vec<usize>> {
        let texts: Vec<&str> = turns.iter().map(|t| t.content()).collect();
        self.tokenizer.count_batch(&texts, model)
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }
}

/// Turn ids must be unique and every must-keep id must name a turn
fn validate_ids(request: &CompressionRequest) -> Result<()> {
    let mut seen: HashSet<&TurnId> = HashSet::with_capacity(request.turns.len());
    for turn in &request.turns {
        if !seen.insert(turn.id()) {
            return Err(EngineError::InvalidRequest(format!(
                "duplicate turn id '{}'",
                turn.id()
            )));
        }
    }
    if let Some(missing) = request.must_keep.iter().find(|id| !seen.contains(id)) {
        return Err(EngineError::InvalidRequest(format!(
            "must-keep id '{}' does not name a turn",
            missing
        )));
    }
    Ok(())
}
