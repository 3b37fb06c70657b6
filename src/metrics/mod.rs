//! Metrics collection for observability
//!
//! Each engine owns its own [`Registry`], so independent engines (and
//! tests) never share counters.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry, CounterVec,
    Encoder, Histogram, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics collector
pub struct EngineMetrics {
    registry: Registry,

    // Compression metrics
    pub compressions: IntCounterVec,
    pub turns_dropped: IntCounter,
    pub compressed_tokens: Histogram,

    // Cache metrics
    pub cache_lookups: IntCounterVec,
    pub cache_tokens_saved: IntCounter,

    // Routing metrics
    pub router_selections: IntCounterVec,

    // Usage metrics
    pub tokens_used: CounterVec,
    pub provider_errors: IntCounter,
}

impl EngineMetrics {
    /// Create a new metrics collector with a private registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let compressions = register_int_counter_vec_with_registry!(
            Opts::new("engine_compressions_total", "Compression passes by outcome"),
            &["outcome"],
            registry
        )?;

        let turns_dropped = register_int_counter_with_registry!(
            Opts::new("engine_turns_dropped_total", "Turns dropped to fit the budget"),
            registry
        )?;

        let compressed_tokens = register_histogram_with_registry!(
            "engine_compressed_prompt_tokens",
            "Prompt tokens after compression",
            registry
        )?;

        let cache_lookups = register_int_counter_vec_with_registry!(
            Opts::new("engine_cache_lookups_total", "Response cache lookups by result"),
            &["result"],
            registry
        )?;

        let cache_tokens_saved = register_int_counter_with_registry!(
            Opts::new("engine_cache_tokens_saved_total", "Tokens saved by cache hits"),
            registry
        )?;

        let router_selections = register_int_counter_vec_with_registry!(
            Opts::new("engine_router_selections_total", "Model selections by tier and model"),
            &["tier", "model"],
            registry
        )?;

        let tokens_used = register_counter_vec_with_registry!(
            Opts::new("engine_tokens_used_total", "Tokens billed by model and kind"),
            &["model", "kind"],
            registry
        )?;

        let provider_errors = register_int_counter_with_registry!(
            Opts::new("engine_provider_errors_total", "Failed provider calls"),
            registry
        )?;

        Ok(Self {
            registry,
            compressions,
            turns_dropped,
            compressed_tokens,
            cache_lookups,
            cache_tokens_saved,
            router_selections,
            tokens_used,
            provider_errors,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a compression pass
    pub fn record_compression(&self, outcome: &str, prompt_tokens: usize, dropped: usize) {
        self.compressions.with_label_values(&[outcome]).inc();
        self.compressed_tokens.observe(prompt_tokens as f64);
        self.turns_dropped.inc_by(dropped as u64);
    }

    /// Record a cache lookup (`hit`, `near_hit` or `miss`)
    pub fn record_cache_lookup(&self, result: &str, tokens_saved: usize) {
        self.cache_lookups.with_label_values(&[result]).inc();
        self.cache_tokens_saved.inc_by(tokens_saved as u64);
    }

    /// Record a routing decision
    pub fn record_selection(&self, tier: &str, model: &str) {
        self.router_selections.with_label_values(&[tier, model]).inc();
    }

    /// Record billed tokens for a completed call
    pub fn record_usage(&self, model: &str, prompt_tokens: usize, response_tokens: usize) {
        self.tokens_used
            .with_label_values(&[model, "prompt"])
            .inc_by(prompt_tokens as f64);
        self.tokens_used
            .with_label_values(&[model, "response"])
            .inc_by(response_tokens as f64);
    }

    pub fn record_provider_error(&self) {
        self.provider_errors.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
