//! Shared fixture for the end-to-end tests: seed taxonomy and keywords,
//! in-process stores, and a scriptable LLM transport.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use kestrel::alerts::AlertManager;
use kestrel::analysis::Normalizer;
use kestrel::audit::AuditLog;
use kestrel::cache::{CacheConfig, ResponseCache};
use kestrel::classify::DecisionEngine;
use kestrel::config::{ConfigManager, ConfigVariant};
use kestrel::context::SessionWindow;
use kestrel::cost::{PriceTable, RateLimiter, UsageTracker};
use kestrel::defaults;
use kestrel::embedding::{EmbeddingMatcher, HashedTfIdfEncoder};
use kestrel::entities::{EntityExtractor, EntityValidator};
use kestrel::error::{KestrelError, Result};
use kestrel::fallback::FallbackManager;
use kestrel::keyword::KeywordMatcher;
use kestrel::llm::{
    Completion, CompletionRequest, ConfidenceCalibrator, LlmClient, LlmErrorKind, PromptLibrary,
    ResilientLlmClient, RetryPolicy,
};
use kestrel::queue::{EscalationQueue, MemoryQueue, QueueConfig, WorkerDeps};
use kestrel::status::StatusStore;
use kestrel::storage::{KvStore, MemoryKv, MemoryVectorIndex};

/// An LLM transport that replays a script and counts calls.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<Completion>>>,
    calls: AtomicU32,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<Completion>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        })
    }

    /// A transport that always times out.
    pub fn always_timeout() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ok_response(code: &str, confidence: f32) -> Result<Completion> {
        Ok(Completion {
            content: format!(r#"{{"action_code": "{code}", "confidence": {confidence}}}"#),
            prompt_tokens: 150,
            completion_tokens: 40,
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(KestrelError::llm(LlmErrorKind::Timeout, "scripted timeout")))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Everything a test drives: the engine, worker deps, and the shared
/// components behind them.
pub struct Fixture {
    pub engine: Arc<DecisionEngine>,
    pub deps: Arc<WorkerDeps>,
    pub queue: Arc<MemoryQueue>,
    pub status: Arc<StatusStore>,
    pub cache: Arc<ResponseCache>,
    pub config: Arc<ConfigManager>,
    pub alerts: Arc<AlertManager>,
    pub usage: Arc<UsageTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub normalizer: Arc<Normalizer>,
    pub llm_transport: Arc<ScriptedLlm>,
}

/// Thresholds strict enough that everything short of a perfect keyword
/// hit escalates.
pub fn strict_variant() -> ConfigVariant {
    ConfigVariant {
        priority_threshold: 0.99,
        confidence_threshold: 0.95,
        gap_threshold: 0.5,
        ..ConfigVariant::default()
    }
}

pub struct FixtureOptions {
    pub variant: ConfigVariant,
    /// Additional variants loaded alongside the active one, for A/B
    /// switch tests.
    pub extra_variants: Vec<ConfigVariant>,
    pub cache_config: CacheConfig,
    pub transport: Arc<ScriptedLlm>,
    pub max_cost_per_request: f64,
    pub queue_config: QueueConfig,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            variant: strict_variant(),
            extra_variants: Vec::new(),
            cache_config: CacheConfig::default(),
            transport: ScriptedLlm::new(vec![]),
            max_cost_per_request: 0.01,
            queue_config: QueueConfig {
                retry_delay: Duration::from_millis(5),
                ..QueueConfig::default()
            },
        }
    }
}

pub fn build_fixture(options: FixtureOptions) -> Fixture {
    let taxonomy = Arc::new(defaults::seed_taxonomy());
    let keywords = Arc::new(KeywordMatcher::new(defaults::seed_keyword_entries()));

    let phrases: Vec<String> = taxonomy
        .definitions()
        .flat_map(|d| d.example_phrases.iter().cloned())
        .collect();
    let refs: Vec<&str> = phrases.iter().map(String::as_str).collect();
    let encoder = Arc::new(HashedTfIdfEncoder::fitted(384, &refs));
    let embeddings = Arc::new(EmbeddingMatcher::new(encoder, Arc::clone(&taxonomy)));

    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let cache = Arc::new(ResponseCache::new(
        options.cache_config,
        Arc::clone(&kv),
        Arc::new(MemoryVectorIndex::new()),
        Arc::clone(&embeddings),
    ));
    let status = Arc::new(StatusStore::new(Arc::clone(&kv), "kestrel"));
    let queue = Arc::new(MemoryQueue::new(options.queue_config, Arc::clone(&status)));

    let active = options.variant.name.clone();
    let mut variants = vec![options.variant];
    variants.extend(options.extra_variants);
    let config = Arc::new(ConfigManager::from_variants(variants, &active).unwrap());
    let alerts = Arc::new(AlertManager::new(None));
    let usage = Arc::new(UsageTracker::new(PriceTable::default(), None));
    let rate_limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(60)));

    let llm = Arc::new(
        ResilientLlmClient::new(
            Arc::clone(&options.transport) as Arc<dyn LlmClient>,
            Arc::clone(&taxonomy),
            Arc::new(PromptLibrary::default()),
            Arc::clone(&rate_limiter),
            Arc::clone(&usage),
        )
        .with_policy(RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(2),
            jitter_frac: 0.10,
            call_timeout: Duration::from_secs(2),
        })
        .with_budget(options.max_cost_per_request),
    );

    let fallback = Arc::new(FallbackManager::new(Arc::clone(&cache)));
    let audit = Arc::new(AuditLog::new(None));
    let normalizer = Arc::new(Normalizer::default());
    let sessions = Arc::new(SessionWindow::default());

    let engine = Arc::new(DecisionEngine::new(
        Arc::clone(&normalizer),
        keywords,
        Arc::clone(&embeddings),
        Arc::clone(&taxonomy),
        Arc::clone(&config),
        Arc::clone(&cache),
        Arc::clone(&queue) as Arc<dyn EscalationQueue>,
        Arc::clone(&sessions),
        Arc::clone(&audit),
        Arc::clone(&fallback),
    ));

    let deps = Arc::new(WorkerDeps {
        queue: Arc::clone(&queue) as Arc<dyn EscalationQueue>,
        status: Arc::clone(&status),
        llm,
        cache: Arc::clone(&cache),
        fallback,
        extractor: Arc::new(EntityExtractor::new()),
        validator: Arc::new(EntityValidator::new()),
        calibrator: Arc::new(ConfidenceCalibrator::default()),
        alerts: Arc::clone(&alerts),
        audit,
        normalizer: Arc::clone(&normalizer),
        config: Arc::clone(&config),
    });

    Fixture {
        engine,
        deps,
        queue,
        status,
        cache,
        config,
        alerts,
        usage,
        rate_limiter,
        normalizer,
        llm_transport: options.transport,
    }
}
