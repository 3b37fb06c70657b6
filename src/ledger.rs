//! Append-only token usage ledger

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub model_identifier: String,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.response_tokens
    }
}

/// Per-model totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests: usize,
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub total_tokens: usize,
}

impl ModelUsage {
    fn add(&mut self, record: &UsageRecord) {
        self.requests += 1;
        self.prompt_tokens += record.prompt_tokens;
        self.response_tokens += record.response_tokens;
        self.total_tokens += record.total_tokens();
    }
}

/// Aggregate view over the whole ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_requests: usize,
    pub total_prompt_tokens: usize,
    pub total_response_tokens: usize,
    pub total_tokens: usize,
    pub average_tokens_per_request: f64,
    /// Models in the order they were first recorded
    pub breakdown_by_model: IndexMap<String, ModelUsage>,
}

/// Usage ledger; records are never edited or removed
#[derive(Debug, Default)]
pub struct UsageLedger {
    records: RwLock<Vec<UsageRecord>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed request
    pub fn record(
        &self,
        prompt_tokens: usize,
        response_tokens: usize,
        model_identifier: impl Into<String>,
    ) -> UsageRecord {
        let record = UsageRecord {
            prompt_tokens,
            response_tokens,
            model_identifier: model_identifier.into(),
            timestamp: Utc::now(),
        };
        debug!(
            "Recorded usage: model={}, prompt={}, response={}",
            record.model_identifier, prompt_tokens, response_tokens
        );
        self.records.write().push(record.clone());
        record
    }

    /// Aggregate the full log
    pub fn summary(&self) -> UsageSummary {
        let records = self.records.read();
        let mut summary = UsageSummary::default();

        for record in records.iter() {
            summary.total_requests += 1;
            summary.total_prompt_tokens += record.prompt_tokens;
            summary.total_response_tokens += record.response_tokens;
            summary.total_tokens += record.total_tokens();
            summary
                .breakdown_by_model
                .entry(record.model_identifier.clone())
                .or_default()
                .add(record);
        }

        if summary.total_requests > 0 {
            summary.average_tokens_per_request =
                summary.total_tokens as f64 / summary.total_requests as f64;
        }
        summary
    }

    /// Snapshot of every record, oldest first
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
