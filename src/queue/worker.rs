//! The worker pool consuming escalated queries.
//!
//! Workers are stateless and interchangeable: dequeue, look the query up
//! in the response cache, call the model, validate entities, store the
//! result, and update the request status. Shutdown is graceful; a worker
//! always finishes the message it is holding before exiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::{AlertManager, Severity};
use crate::analysis::Normalizer;
use crate::audit::{AuditLog, AuditRecord};
use crate::cache::ResponseCache;
use crate::classify::{ClassificationResult, MatchSource, ResultStatus};
use crate::config::ConfigManager;
use crate::entities::{EntityExtractor, EntityValidator};
use crate::fallback::{user_message, FallbackManager};
use crate::llm::{
    ConfidenceCalibrator, EscalationRequest, LlmErrorKind, ResilientLlmClient,
};
use crate::status::{RequestState, StatusStore, UsageSummary};

use super::types::{EscalationQueue, NackOutcome, QueueMessage};

/// Default pool size.
pub const DEFAULT_WORKERS: usize = 4;

/// How long one dequeue call waits before the loop re-checks shutdown.
const DEQUEUE_WAIT: Duration = Duration::from_secs(1);

/// Everything a worker needs, shared across the pool.
pub struct WorkerDeps {
    pub queue: Arc<dyn EscalationQueue>,
    pub status: Arc<StatusStore>,
    pub llm: Arc<ResilientLlmClient>,
    pub cache: Arc<ResponseCache>,
    pub fallback: Arc<FallbackManager>,
    pub extractor: Arc<EntityExtractor>,
    pub validator: Arc<EntityValidator>,
    pub calibrator: Arc<ConfidenceCalibrator>,
    pub alerts: Arc<AlertManager>,
    pub audit: Arc<AuditLog>,
    pub normalizer: Arc<Normalizer>,
    pub config: Arc<ConfigManager>,
}

/// A pool of escalation workers with a shutdown fence.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` loops over shared dependencies.
    pub fn spawn(deps: Arc<WorkerDeps>, workers: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        let handles = (0..workers.max(1))
            .map(|id| {
                let deps = Arc::clone(&deps);
                let receiver = shutdown.subscribe();
                tokio::spawn(worker_loop(id, deps, receiver))
            })
            .collect();
        Self { shutdown, handles }
    }

    /// Signal shutdown and wait for every worker to finish its current
    /// message.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("worker pool drained");
    }
}

async fn worker_loop(id: usize, deps: Arc<WorkerDeps>, mut shutdown: watch::Receiver<bool>) {
    debug!(worker = id, "escalation worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let message = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            dequeued = deps.queue.dequeue(DEQUEUE_WAIT) => match dequeued {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker = id, error = %e, "dequeue failed");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    continue;
                }
            }
        };

        // Cancellation only happens at message boundaries; the message in
        // hand is always driven to an ack or a nack.
        process_message(&deps, message).await;
    }
    debug!(worker = id, "escalation worker stopped");
}

/// Process one leased message through cache, model, and validation.
pub async fn process_message(deps: &WorkerDeps, message: QueueMessage) {
    let request_id = message.request_id.clone();
    let _ = deps
        .status
        .transition(&request_id, RequestState::Processing, None, None, None)
        .await;

    let normalized = deps.normalizer.normalize(&message.payload.query);

    // A confident answer may have been cached since this was enqueued.
    if let Some(cached) = deps.cache.get(&normalized).await {
        debug!(request_id = %request_id, "served escalation from cache");
        let _ = deps.status.complete(&request_id, cached, None).await;
        let _ = deps.queue.acknowledge(&message).await;
        return;
    }

    let variant = deps.config.active();
    let request = EscalationRequest {
        query: message.payload.query.clone(),
        hint: message.payload.rule_based_hint.clone(),
        context: message.payload.context_snapshot.clone(),
        model: variant.llm_model.clone(),
    };

    match deps.llm.classify(&request).await {
        Ok(classification) => {
            let usage = UsageSummary {
                prompt_tokens: classification.usage.prompt_tokens,
                completion_tokens: classification.usage.completion_tokens,
                cost: classification.usage.cost,
            };

            let result = if classification.action_code.as_str() == "UNCLEAR" {
                let mut unclear = deps.fallback.unclear_response(LlmErrorKind::Unknown);
                unclear.confidence = classification.confidence.min(0.3);
                deps.audit.record(
                    AuditRecord::new(
                        "unclear",
                        &message.payload.query,
                        serde_json::json!({ "model_confidence": classification.confidence }),
                    )
                    .with_request_id(&request_id),
                );
                unclear
            } else {
                let calibrated = deps
                    .calibrator
                    .calibrate(&classification.action_code, classification.confidence);

                let mut entities = classification.entities.clone().unwrap_or_default();
                entities.backfill_from(deps.extractor.extract(&message.payload.query));
                let (entities, warnings) = deps.validator.finalize(entities);
                if !warnings.is_empty() {
                    debug!(request_id = %request_id, ?warnings, "entity warnings");
                }

                ClassificationResult::new(
                    classification.action_code.clone(),
                    calibrated,
                    ResultStatus::LlmClassification,
                    MatchSource::Llm,
                )
                .with_entities(entities)
                .with_variant(variant.name.clone())
            };

            if deps.cache.set(&normalized, &result).await {
                debug!(request_id = %request_id, "escalation result cached");
            }
            let _ = deps.status.complete(&request_id, result, Some(usage)).await;
            let _ = deps.queue.acknowledge(&message).await;
        }
        Err(error) => {
            let kind = error.llm_kind().unwrap_or(LlmErrorKind::Unknown);
            handle_llm_failure(deps, &message, &normalized, kind, &error.to_string()).await;
        }
    }
}

async fn handle_llm_failure(
    deps: &WorkerDeps,
    message: &QueueMessage,
    normalized: &Arc<crate::analysis::NormalizedQuery>,
    kind: LlmErrorKind,
    detail: &str,
) {
    let request_id = &message.request_id;
    let severity = match kind {
        LlmErrorKind::AuthError => Severity::Critical,
        _ => Severity::Warning,
    };
    deps.alerts
        .raise(severity, kind.alert_kind(), detail)
        .await;
    deps.audit.record(
        AuditRecord::new(
            "llm_failure",
            &message.payload.query,
            serde_json::json!({
                "kind": kind.alert_kind(),
                "attempt_count": message.attempt_count,
                "detail": detail,
            }),
        )
        .with_request_id(request_id),
    );

    // First rung of the ladder: a looser-threshold cache hit completes
    // the request without another round through the queue.
    let fallback_result = deps.fallback.on_llm_failure(normalized, kind).await;
    let served_from_cache = fallback_result.fallback_source.as_deref() == Some("cache");

    if served_from_cache || !kind.is_retryable() {
        let _ = deps
            .status
            .transition(
                request_id,
                RequestState::Completed,
                Some(user_message(kind).to_string()),
                Some(fallback_result),
                None,
            )
            .await;
        let _ = deps.queue.acknowledge(message).await;
        return;
    }

    // Retryable failure with nothing to serve: hand the message back to
    // the queue. The queue dead-letters and fails the status once the
    // retry budget is spent.
    match deps.queue.nack(message, detail).await {
        Ok(NackOutcome::Retrying(delay)) => {
            debug!(request_id = %request_id, ?delay, "escalation re-queued");
        }
        Ok(NackOutcome::DeadLettered) => {
            warn!(request_id = %request_id, "escalation dead-lettered");
        }
        Err(e) => warn!(request_id = %request_id, error = %e, "nack failed"),
    }
}
