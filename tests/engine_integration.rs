//! Integration tests for the request pipeline
//!
//! These tests drive `ContextEngine` end to end with a word-count tokenizer
//! and an in-process provider that counts how often it is called.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use token_budget_engine::context::WordBasedTokenizer;
use token_budget_engine::router::{ContextRequirements, OutputCreativity, ReasoningDepth};
use token_budget_engine::{
    ComplexityDescriptor, ContextEngine, EngineConfig, EngineError, EngineRequest, ModelProvider,
    ProviderError, ProviderRequest, ProviderResponse, ResponseSource, Turn,
};

/// Echoes the number of turns it was sent
#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
    fail_with: Option<ProviderError>,
    delay: Option<Duration>,
}

#[async_trait]
impl ModelProvider for CountingProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok(ProviderResponse {
            text: format!("{} answered {} turns", request.model, request.turns.len()),
            prompt_tokens: 40,
            response_tokens: 10,
        })
    }
}

fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

fn engine_with(provider: Arc<CountingProvider>) -> ContextEngine {
    ContextEngine::new(
        EngineConfig::default(),
        Arc::new(WordBasedTokenizer::new(1.0)),
        provider,
    )
    .unwrap()
}

fn question(text: &str) -> EngineRequest {
    EngineRequest::new(
        vec![
            Turn::system("sys", "You are a helpful assistant.", 0),
            Turn::user("u1", text, 1),
        ],
        1000,
    )
    .with_model("gpt-3.5-turbo")
    .with_must_keep(["sys"])
}

#[tokio::test]
async fn test_repeated_request_is_served_from_cache() {
    let provider = Arc::new(CountingProvider::default());
    let engine = engine_with(provider.clone());

    let first = assert_ok!(engine.process(question("What is Rust?")).await);
    let second = assert_ok!(engine.process(question("What is Rust?")).await);

    assert_eq!(first.source, ResponseSource::Provider);
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.text, first.text);
    assert_eq!(second.fingerprint, first.fingerprint);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    assert!(engine.lookup(&first.fingerprint).is_some());
    assert_eq!(engine.summary().total_requests, 1);
    assert_eq!(engine.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_only_must_keep_survives_tight_budget() {
    let provider = Arc::new(CountingProvider::default());
    let engine = engine_with(provider.clone());

    let request = EngineRequest::new(
        vec![
            Turn::system("sys", words(50), 0),
            Turn::user("u1", words(200), 1),
            Turn::assistant("a1", words(300), 2),
        ],
        100,
    )
    .with_model("gpt-3.5-turbo")
    .with_must_keep(["sys"]);

    let response = assert_ok!(engine.process(request).await);
    assert_eq!(response.compression.turns.len(), 1);
    assert_eq!(response.compression.turns[0].id().as_str(), "sys");
    assert_eq!(response.compression.total_tokens, 50);
    assert_eq!(response.text, "gpt-3.5-turbo answered 1 turns");
}

#[tokio::test]
async fn test_infeasible_budget_never_reaches_provider() {
    let provider = Arc::new(CountingProvider::default());
    let engine = engine_with(provider.clone());

    let request = EngineRequest::new(vec![Turn::system("sys", words(120), 0)], 100)
        .with_model("gpt-3.5-turbo")
        .with_must_keep(["sys"]);

    let err = assert_err!(engine.process(request).await);
    assert!(matches!(err, EngineError::BudgetInfeasible { required: 120, budget: 100 }));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(engine.ledger().is_empty());
}

#[tokio::test]
async fn test_provider_errors_propagate_and_record_nothing() {
    let provider = Arc::new(CountingProvider {
        fail_with: Some(ProviderError::new(Some(503), "overloaded")),
        ..Default::default()
    });
    let engine = engine_with(provider.clone());

    let err = assert_err!(engine.process(question("hello")).await);
    match err {
        EngineError::Provider(e) => {
            assert_eq!(e.status, Some(503));
            assert_eq!(e.detail, "overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.ledger().is_empty());
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn test_unrouted_request_uses_router() {
    let provider = Arc::new(CountingProvider::default());
    let engine = engine_with(provider);

    let deep = EngineRequest::new(vec![Turn::user("u1", "prove it", 0)], 500).with_complexity(
        ComplexityDescriptor::new(
            ReasoningDepth::Deep,
            ContextRequirements::Minimal,
            OutputCreativity::Low,
        ),
    );
    let simple = EngineRequest::new(vec![Turn::user("u1", "prove it", 0)], 500);

    assert_eq!(assert_ok!(engine.process(deep).await).model, "gpt-4");
    assert_eq!(assert_ok!(engine.process(simple).await).model, "gpt-3.5-turbo");

    let summary = engine.summary();
    assert_eq!(summary.breakdown_by_model.len(), 2);
}

#[tokio::test]
async fn test_same_text_different_model_misses_cache() {
    let provider = Arc::new(CountingProvider::default());
    let engine = engine_with(provider.clone());

    let a = assert_ok!(engine.process(question("What is Rust?")).await);
    let b = assert_ok!(engine.process(question("What is Rust?").with_model("gpt-4")).await);

    assert_ne!(a.fingerprint, b.fingerprint);
    assert_eq!(b.source, ResponseSource::Provider);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_near_duplicate_request_reuses_response() {
    let provider = Arc::new(CountingProvider::default());
    let engine = engine_with(provider.clone());

    assert_ok!(
        engine
            .process(question("please explain how the rust borrow checker works in detail"))
            .await
    );
    let near = assert_ok!(
        engine
            .process(question("please explain how the rust borrow checker works in depth"))
            .await
    );

    assert!(matches!(near.source, ResponseSource::NearDuplicate { similarity } if similarity >= 0.9));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_near_duplicate_can_be_disabled() {
    let provider = Arc::new(CountingProvider::default());
    let config = EngineConfig {
        near_duplicate_enabled: false,
        ..EngineConfig::default()
    };
    let engine = ContextEngine::new(config, Arc::new(WordBasedTokenizer::new(1.0)), provider.clone()).unwrap();

    assert_ok!(engine.process(question("tell me about tokio runtimes please")).await);
    let second = assert_ok!(engine.process(question("tell me about tokio runtimes")).await);

    assert_eq!(second.source, ResponseSource::Provider);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abandoned_call_is_not_recorded() {
    let provider = Arc::new(CountingProvider {
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let engine = engine_with(provider.clone());

    let result = tokio::time::timeout(Duration::from_millis(50), engine.process(question("slow"))).await;
    assert!(result.is_err());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert!(engine.ledger().is_empty());
    assert!(engine.cache().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let provider = Arc::new(CountingProvider::default());
    let engine = Arc::new(engine_with(provider.clone()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.process(question(&format!("question number {}", i))).await })
        })
        .collect();

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let summary = engine.summary();
    assert_eq!(summary.total_requests, provider.calls.load(Ordering::SeqCst));
    assert_eq!(summary.total_tokens, summary.total_requests * 50);
    assert_eq!(summary.average_tokens_per_request, 50.0);
}

#[tokio::test]
async fn test_must_keep_above_threshold_target_uses_full_budget() {
    let provider = Arc::new(CountingProvider::default());
    let engine = engine_with(provider.clone());

    // Target is 80 of 100; the 90-token system turn only fits the full budget
    let request = EngineRequest::new(
        vec![
            Turn::system("sys", words(90), 0),
            Turn::user("u1", words(20), 1),
        ],
        100,
    )
    .with_model("gpt-3.5-turbo")
    .with_must_keep(["sys"]);

    let response = assert_ok!(engine.process(request).await);
    assert_eq!(response.compression.turns.len(), 1);
    assert_eq!(response.compression.turns[0].id().as_str(), "sys");
    assert_eq!(response.compression.total_tokens, 90);
    assert!(response.compression.total_tokens <= 100);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unbounded_cache_expiry_is_rejected_at_construction() {
    let config = EngineConfig {
        cache_expiry_seconds: 10_000_000_000_000,
        ..EngineConfig::default()
    };
    let result = ContextEngine::new(
        config,
        Arc::new(WordBasedTokenizer::new(1.0)),
        Arc::new(CountingProvider::default()),
    );
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}

#[tokio::test]
async fn test_routing_skips_models_too_small_for_the_prompt() {
    let provider = Arc::new(CountingProvider::default());
    let config = EngineConfig {
        context_window: 200_000,
        ..EngineConfig::default()
    };
    let engine = ContextEngine::new(config, Arc::new(WordBasedTokenizer::new(1.0)), provider.clone()).unwrap();
    let long_turns = || vec![Turn::user("u1", words(30_000), 0)];

    // gpt-3.5-turbo holds 16k, so the long prompt goes to gpt-4-turbo
    let light = EngineRequest::new(long_turns(), 50_000);
    assert_eq!(assert_ok!(engine.process(light).await).model, "gpt-4-turbo");

    // The only high-tier default holds 8k
    let deep = EngineRequest::new(long_turns(), 50_000)
        .with_complexity(ComplexityDescriptor::parse(Some("deep"), None, None).unwrap());
    let err = assert_err!(engine.process(deep).await);
    assert!(matches!(
        err,
        EngineError::NoEligibleModel { prompt_tokens: 30_000, .. }
    ));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    // Short prompts still get the cheapest capable model
    let short = EngineRequest::new(vec![Turn::user("u2", "hi", 0)], 50_000);
    assert_eq!(assert_ok!(engine.process(short).await).model, "gpt-3.5-turbo");
}
