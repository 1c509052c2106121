//! Application context.
//!
//! One explicit root object owns every component; it is built once at
//! startup and shared behind an `Arc`. Nothing in the crate is a
//! module-level singleton, so teardown is just dropping the context.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::alerts::AlertManager;
use crate::analysis::Normalizer;
use crate::audit::AuditLog;
use crate::cache::{CacheConfig, ResponseCache};
use crate::classify::DecisionEngine;
use crate::config::{ConfigManager, ConfigVariant, Settings};
use crate::context::SessionWindow;
use crate::cost::{PriceTable, RateLimiter, SpikeDetector, UsageTracker};
use crate::defaults;
use crate::embedding::{EmbeddingMatcher, HashedTfIdfEncoder, TextEncoder};
use crate::entities::{EntityExtractor, EntityValidator};
use crate::error::Result;
use crate::fallback::FallbackManager;
use crate::keyword::{load_keyword_dir, KeywordMatcher};
use crate::llm::{
    ConfidenceCalibrator, HttpLlmClient, LlmClient, PromptLibrary, ResilientLlmClient,
};
use crate::queue::{EscalationQueue, MemoryQueue, QueueConfig, WorkerDeps, WorkerPool};
use crate::status::StatusStore;
use crate::storage::{KvStore, MemoryKv, MemoryVectorIndex, VectorIndex};
use crate::taxonomy::{load_taxonomy_dir, Taxonomy};

/// Default endpoint used when none is configured.
const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Key prefix shared by the queue and status store.
const KEY_PREFIX: &str = "kestrel";

/// Startup options for building an [`AppContext`].
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Directory of intent definition files; built-in seed when absent.
    pub taxonomy_dir: Option<PathBuf>,
    /// Directory of keyword dictionaries; built-in seed when absent.
    pub keywords_dir: Option<PathBuf>,
    /// Rules file with config variants; defaults when absent.
    pub config_file: Option<PathBuf>,
    /// Audit log path (JSONL); in-memory only when absent.
    pub audit_log: Option<PathBuf>,
    /// Usage log path (JSONL); in-memory only when absent.
    pub usage_log: Option<PathBuf>,
    /// Worker pool size.
    pub workers: usize,
    /// Environment-derived settings.
    pub settings: Settings,
}

/// The assembled application.
pub struct AppContext {
    pub taxonomy: Arc<Taxonomy>,
    pub normalizer: Arc<Normalizer>,
    pub keywords: Arc<KeywordMatcher>,
    pub embeddings: Arc<EmbeddingMatcher>,
    pub config: Arc<ConfigManager>,
    pub cache: Arc<ResponseCache>,
    pub status: Arc<StatusStore>,
    pub queue: Arc<MemoryQueue>,
    pub sessions: Arc<SessionWindow>,
    pub audit: Arc<AuditLog>,
    pub alerts: Arc<AlertManager>,
    pub usage: Arc<UsageTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub llm: Arc<ResilientLlmClient>,
    pub fallback: Arc<FallbackManager>,
    pub engine: Arc<DecisionEngine>,
    pub workers: usize,
    pub config_file: Option<PathBuf>,
}

impl AppContext {
    /// Build the whole application from options.
    pub fn build(options: AppOptions) -> Result<Arc<Self>> {
        let settings = options.settings.clone();

        let taxonomy = Arc::new(match &options.taxonomy_dir {
            Some(dir) => load_taxonomy_dir(dir)?,
            None => {
                info!("no taxonomy directory configured; using built-in seed taxonomy");
                defaults::seed_taxonomy()
            }
        });

        let keyword_entries = match &options.keywords_dir {
            Some(dir) => load_keyword_dir(dir)?,
            None => defaults::seed_keyword_entries(),
        };
        let keywords = Arc::new(KeywordMatcher::new(keyword_entries));

        let config = Arc::new(match &options.config_file {
            Some(path) => ConfigManager::from_file(path)?,
            None => {
                let mut variant = ConfigVariant::default();
                settings.apply_to_variant(&mut variant);
                variant.validate()?;
                ConfigManager::with_default(variant)?
            }
        });

        if settings.kv_url.is_some() || settings.vector_url.is_some() {
            warn!("external store URLs configured; this build uses the in-process stores");
        }
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let vectors: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new());

        let encoder = build_encoder(&taxonomy);
        let embeddings = Arc::new(EmbeddingMatcher::new(encoder, Arc::clone(&taxonomy)));

        let cache = Arc::new(ResponseCache::new(
            CacheConfig {
                similarity_threshold: settings.cache_similarity_threshold,
                ttl_seconds: settings.cache_ttl.as_secs() as i64,
                ..CacheConfig::default()
            },
            Arc::clone(&kv),
            vectors,
            Arc::clone(&embeddings),
        ));

        let status = Arc::new(StatusStore::new(Arc::clone(&kv), KEY_PREFIX));
        let queue = Arc::new(MemoryQueue::new(
            QueueConfig {
                max_retries: settings.max_retries,
                retry_delay: settings.retry_delay,
                message_ttl: settings.message_ttl,
                ..QueueConfig::default()
            },
            Arc::clone(&status),
        ));

        let alerts = Arc::new(AlertManager::new(settings.escalation_webhook_url.clone()));
        let usage = Arc::new(UsageTracker::new(
            PriceTable::default(),
            options.usage_log.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            settings.rate_limit_max_calls,
            Duration::from_secs(60),
        ));

        let transport: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
            settings
                .llm_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
            settings.llm_api_key.clone().unwrap_or_default(),
        ));
        let llm = Arc::new(
            ResilientLlmClient::new(
                transport,
                Arc::clone(&taxonomy),
                Arc::new(PromptLibrary::default()),
                Arc::clone(&rate_limiter),
                Arc::clone(&usage),
            )
            .with_budget(settings.max_cost_per_request),
        );

        let fallback = Arc::new(FallbackManager::new(Arc::clone(&cache)));
        let audit = Arc::new(AuditLog::new(options.audit_log.clone()));
        let normalizer = Arc::new(Normalizer::default());
        let sessions = Arc::new(SessionWindow::default());

        let engine = Arc::new(DecisionEngine::new(
            Arc::clone(&normalizer),
            Arc::clone(&keywords),
            Arc::clone(&embeddings),
            Arc::clone(&taxonomy),
            Arc::clone(&config),
            Arc::clone(&cache),
            Arc::clone(&queue) as Arc<dyn EscalationQueue>,
            Arc::clone(&sessions),
            Arc::clone(&audit),
            Arc::clone(&fallback),
        ));

        info!(
            intents = taxonomy.len(),
            keyword_entries = keywords.entry_count(),
            variant = %config.active().name,
            "application context assembled"
        );

        Ok(Arc::new(Self {
            taxonomy,
            normalizer,
            keywords,
            embeddings,
            config,
            cache,
            status,
            queue,
            sessions,
            audit,
            alerts,
            usage,
            rate_limiter,
            llm,
            fallback,
            engine,
            workers: options.workers.max(1),
            config_file: options.config_file,
        }))
    }

    /// Bundle the worker dependencies.
    pub fn worker_deps(&self) -> Arc<WorkerDeps> {
        Arc::new(WorkerDeps {
            queue: Arc::clone(&self.queue) as Arc<dyn EscalationQueue>,
            status: Arc::clone(&self.status),
            llm: Arc::clone(&self.llm),
            cache: Arc::clone(&self.cache),
            fallback: Arc::clone(&self.fallback),
            extractor: Arc::new(EntityExtractor::new()),
            validator: Arc::new(EntityValidator::new()),
            calibrator: Arc::new(ConfidenceCalibrator::default()),
            alerts: Arc::clone(&self.alerts),
            audit: Arc::clone(&self.audit),
            normalizer: Arc::clone(&self.normalizer),
            config: Arc::clone(&self.config),
        })
    }

    /// Spawn the worker pool.
    pub fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(self.worker_deps(), self.workers)
    }

    /// Spike detector wired to this context's usage tracker.
    pub fn spike_detector(&self) -> SpikeDetector {
        SpikeDetector::default()
    }
}

fn build_encoder(taxonomy: &Taxonomy) -> Arc<dyn TextEncoder> {
    let phrases: Vec<String> = taxonomy
        .definitions()
        .flat_map(|definition| definition.example_phrases.iter().cloned())
        .collect();
    let refs: Vec<&str> = phrases.iter().map(String::as_str).collect();
    Arc::new(HashedTfIdfEncoder::fitted(
        crate::embedding::tfidf::DEFAULT_DIMENSION,
        &refs,
    ))
}
