//! Request pipeline tying the components together
//!
//! `process` runs: route → compress → fingerprint → exact lookup →
//! near-duplicate lookup → provider → ledger → cache store.
//! No cache or ledger lock is held while the provider call is in flight,
//! and nothing is recorded unless the call completes.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, Fingerprint, RequestKey, RequestParams, ResponseCache};
use crate::config::EngineConfig;
use crate::context::{
    CompressionOutcome, CompressionRequest, ContextBudget, ContextCompressor, PriorityScorer,
    Tokenizer, Turn, TurnId,
};
use crate::error::{EngineError, Result};
use crate::ledger::{UsageLedger, UsageRecord, UsageSummary};
use crate::metrics::EngineMetrics;
use crate::provider::{ModelProvider, ProviderRequest};
use crate::router::{ComplexityDescriptor, ModelProfile, ModelRouter};

/// A caller's candidate request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineRequest {
    pub turns: Vec<Turn>,
    pub budget_tokens: usize,
    #[serde(default)]
    pub must_keep: BTreeSet<TurnId>,
    /// Explicit target model; routed from `complexity` when absent
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub complexity: ComplexityDescriptor,
    #[serde(default)]
    pub params: RequestParams,
}

impl EngineRequest {
    pub fn new(turns: Vec<Turn>, budget_tokens: usize) -> Self {
        Self {
            turns,
            budget_tokens,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_complexity(mut self, complexity: ComplexityDescriptor) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_must_keep<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TurnId>,
    {
        self.must_keep.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }
}

/// Where a response came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    NearDuplicate { similarity: f32 },
    Provider,
}

/// Response returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub text: String,
    pub model: String,
    pub source: ResponseSource,
    pub fingerprint: Fingerprint,
    pub compression: CompressionOutcome,
    /// Provider-billed tokens; zero for cached responses
    pub prompt_tokens: usize,
    pub response_tokens: usize,
}

/// Token budget and context compression engine
pub struct ContextEngine {
    config: EngineConfig,
    budget: ContextBudget,
    compressor: ContextCompressor,
    router: ModelRouter,
    cache: Arc<ResponseCache>,
    ledger: Arc<UsageLedger>,
    provider: Arc<dyn ModelProvider>,
    metrics: Arc<EngineMetrics>,
}

impl ContextEngine {
    /// Create an engine with its own cache, ledger and metrics
    pub fn new(
        config: EngineConfig,
        tokenizer: Arc<dyn Tokenizer>,
        provider: Arc<dyn ModelProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let budget = ContextBudget::from_config(&config)?;
        let router = ModelRouter::new(config.model_profiles.clone())?;
        let cache = Arc::new(ResponseCache::new(config.cache_ttl(), config.cache_max_entries));
        let metrics = EngineMetrics::new()
            .map_err(|e| EngineError::Configuration(format!("metrics: {}", e)))?;

        Ok(Self {
            budget,
            compressor: ContextCompressor::new(tokenizer),
            router,
            cache,
            ledger: Arc::new(UsageLedger::new()),
            provider,
            metrics: Arc::new(metrics),
            config,
        })
    }

    /// Replace the turn scoring strategy
    pub fn with_scorer(mut self, scorer: Arc<dyn PriorityScorer>) -> Self {
        let tokenizer = Arc::clone(self.compressor.tokenizer());
        self.compressor = ContextCompressor::with_scorer(tokenizer, scorer);
        self
    }

    /// Share a cache with other engines
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Share a ledger with other engines
    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Run a request through the full pipeline
    pub async fn process(&self, request: EngineRequest) -> Result<EngineResponse> {
        let model = match &request.model {
            Some(model) => model.clone(),
            None => {
                let prompt_tokens = self.routing_prompt_tokens(&request);
                self.select_for_prompt(&request.complexity, prompt_tokens)?
                    .identifier
                    .clone()
            }
        };

        let compression = self.fit_to_budget(&request, &model)?;

        let mut params = request.params.clone();
        let max_output_tokens = *params
            .max_output_tokens
            .get_or_insert(self.config.reserved_output_tokens);
        let key = RequestKey::from_turns(model.as_str(), &compression.turns, params.clone());
        let fingerprint = key.fingerprint();

        if let Some(entry) = self.cache.lookup(&fingerprint) {
            info!("Cache hit for {} ({} tokens saved)", fingerprint, entry.token_cost_saved);
            self.metrics.record_cache_lookup("hit", entry.token_cost_saved);
            return Ok(Self::cached_response(entry, model, ResponseSource::Cache, fingerprint, compression));
        }

        if self.config.near_duplicate_enabled {
            if let Some(found) = self
                .cache
                .near_duplicate_lookup(&key, self.config.similarity_threshold)
            {
                info!(
                    "Near-duplicate hit for {} via {} (similarity {:.3})",
                    fingerprint, found.fingerprint, found.similarity
                );
                self.metrics
                    .record_cache_lookup("near_hit", found.entry.token_cost_saved);
                let source = ResponseSource::NearDuplicate {
                    similarity: found.similarity,
                };
                return Ok(Self::cached_response(found.entry, model, source, found.fingerprint, compression));
            }
        }

        self.metrics.record_cache_lookup("miss", 0);
        debug!("Cache miss for {}, calling provider with {}", fingerprint, model);

        let provider_request = ProviderRequest {
            model: model.clone(),
            turns: compression.turns.clone(),
            max_output_tokens,
            temperature: params.temperature,
        };
        let response = match self.provider.complete(provider_request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Provider call to {} failed: {}", model, e);
                self.metrics.record_provider_error();
                return Err(EngineError::Provider(e));
            }
        };

        self.record(response.prompt_tokens, response.response_tokens, &model);
        self.cache.store_response(
            key,
            response.text.clone(),
            response.prompt_tokens + response.response_tokens,
        );

        Ok(EngineResponse {
            text: response.text,
            model,
            source: ResponseSource::Provider,
            fingerprint,
            compression,
            prompt_tokens: response.prompt_tokens,
            response_tokens: response.response_tokens,
        })
    }

    /// Upper bound on the prompt a routed request sends, measured with the
    /// default model's tokenizer. Compression never exceeds the effective
    /// budget, so that bound applies when measuring fails.
    fn routing_prompt_tokens(&self, request: &EngineRequest) -> usize {
        let effective = self.budget.effective_budget(request.budget_tokens);
        self.compressor
            .measure(&request.turns, &self.config.default_model)
            .map_or(effective, |total| total.min(effective))
    }

    /// Compress to the threshold target when the request is under pressure,
    /// falling back to the full effective budget if must-keep turns need it
    fn fit_to_budget(&self, request: &EngineRequest, model: &str) -> Result<CompressionOutcome> {
        let effective = self.budget.effective_budget(request.budget_tokens);
        let total = self.compressor.measure(&request.turns, model)?;

        let compression_request = CompressionRequest {
            model: model.to_string(),
            turns: request.turns.clone(),
            budget_tokens: effective,
            must_keep: request.must_keep.clone(),
        };

        if !self.budget.needs_compression(total, effective) {
            let outcome = self.compress(&compression_request)?;
            self.metrics
                .record_compression("passthrough", outcome.total_tokens, outcome.dropped.len());
            return Ok(outcome);
        }

        let target = CompressionRequest {
            budget_tokens: self.budget.target_budget(effective),
            ..compression_request.clone()
        };
        let outcome = match self.compress(&target) {
            Err(EngineError::BudgetInfeasible { required, budget }) => {
                debug!(
                    "Must-keep turns ({} tokens) exceed target {}, using full budget {}",
                    required, budget, effective
                );
                self.compress(&compression_request)?
            }
            other => other?,
        };

        info!(
            "Compressed prompt from {} to {} tokens ({} turns dropped)",
            total,
            outcome.total_tokens,
            outcome.dropped.len()
        );
        self.metrics
            .record_compression("compressed", outcome.total_tokens, outcome.dropped.len());
        Ok(outcome)
    }

    fn cached_response(
        entry: CacheEntry,
        model: String,
        source: ResponseSource,
        fingerprint: Fingerprint,
        compression: CompressionOutcome,
    ) -> EngineResponse {
        EngineResponse {
            text: entry.response_text,
            model,
            source,
            fingerprint,
            compression,
            prompt_tokens: 0,
            response_tokens: 0,
        }
    }

    /// Compress a request to its budget
    pub fn compress(&self, request: &CompressionRequest) -> Result<CompressionOutcome> {
        match self.compressor.compress_with_report(request) {
            Err(e @ EngineError::BudgetInfeasible { .. }) => {
                self.metrics.compressions.with_label_values(&["infeasible"]).inc();
                Err(e)
            }
            other => other,
        }
    }

    /// Exact cache lookup
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.cache.lookup(fingerprint)
    }

    /// Route a task to a model
    pub fn select(&self, complexity: &ComplexityDescriptor) -> &ModelProfile {
        let profile = self.router.select(complexity);
        self.metrics
            .record_selection(profile.complexity_tier.as_str(), &profile.identifier);
        profile
    }

    /// Route a task to a model whose context window holds `prompt_tokens`
    pub fn select_for_prompt(
        &self,
        complexity: &ComplexityDescriptor,
        prompt_tokens: usize,
    ) -> Result<&ModelProfile> {
        let profile = self.router.select_for_prompt(complexity, prompt_tokens)?;
        self.metrics
            .record_selection(profile.complexity_tier.as_str(), &profile.identifier);
        Ok(profile)
    }

    /// Record a completed call in the ledger
    pub fn record(&self, prompt_tokens: usize, response_tokens: usize, model: &str) -> UsageRecord {
        self.metrics.record_usage(model, prompt_tokens, response_tokens);
        self.ledger.record(prompt_tokens, response_tokens, model)
    }

    pub fn summary(&self) -> UsageSummary {
        self.ledger.summary()
    }

    /// Start the background cache sweep
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        self.cache.spawn_sweeper(self.config.sweep_interval())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}
