//! End-to-end escalation scenarios: queueing, worker processing, the
//! cache fallback ladder, and the budget guard.

mod common;

use std::time::Duration;

use common::{build_fixture, FixtureOptions, ScriptedLlm};

use kestrel::cache::CacheConfig;
use kestrel::classify::engine::ClassifyRequest;
use kestrel::classify::{ClassificationResult, ClassifyOutcome, MatchSource, ResultStatus};
use kestrel::queue::worker::process_message;
use kestrel::queue::{EscalationQueue, QueuePayload, QueuePriority, WorkerPool};
use kestrel::status::RequestState;
use kestrel::taxonomy::ActionCode;

async fn wait_for_state(
    fixture: &common::Fixture,
    request_id: &str,
    state: RequestState,
) -> kestrel::status::RequestStatus {
    for _ in 0..100 {
        if let Some(status) = fixture.status.get(request_id).await.unwrap() {
            if status.state == state {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("request {request_id} never reached {state:?}");
}

#[tokio::test]
async fn ambiguous_query_escalates_and_worker_completes() {
    let transport = ScriptedLlm::new(vec![ScriptedLlm::ok_response("SEARCH_PRODUCT", 0.9)]);
    let fixture = build_fixture(FixtureOptions {
        transport,
        ..FixtureOptions::default()
    });

    // Under strict thresholds this keyword hit is not strong enough to
    // short-circuit, so the engine escalates.
    let outcome = fixture
        .engine
        .classify(&ClassifyRequest::text_only("show my cart or something"))
        .await
        .unwrap();
    let ClassifyOutcome::Queued { request_id } = outcome else {
        panic!("expected the query to queue");
    };

    let queued = fixture.status.get(&request_id).await.unwrap().unwrap();
    assert_eq!(queued.state, RequestState::Queued);

    let pool = WorkerPool::spawn(fixture.deps.clone(), 2);
    let completed = wait_for_state(&fixture, &request_id, RequestState::Completed).await;
    pool.shutdown().await;

    let result = completed.result.expect("completed requests carry a result");
    assert_eq!(result.action_code.as_str(), "SEARCH_PRODUCT");
    assert!((result.confidence - 0.9).abs() < 1e-6);
    assert_eq!(result.status, ResultStatus::LlmClassification);
    assert!(completed.usage.is_some());

    // The answer was cached for the next ask.
    let normalized = fixture.normalizer.normalize("show my cart or something");
    assert!(fixture.cache.get(&normalized).await.is_some());

    // Status transitions were monotonic: QUEUED before COMPLETED.
    assert!(completed.updated_at >= queued.updated_at);
}

#[tokio::test]
async fn llm_timeout_falls_back_to_cached_answer() {
    // Normal-tier semantic matching is disabled (threshold above 1) so
    // only the looser fallback tier can see the seeded entry.
    let transport = ScriptedLlm::always_timeout();
    let fixture = build_fixture(FixtureOptions {
        transport,
        cache_config: CacheConfig {
            similarity_threshold: 1.01,
            fallback_similarity_threshold: 0.90,
            ..CacheConfig::default()
        },
        ..FixtureOptions::default()
    });

    // Seed the cache under a different normalized text with the same
    // token bag, so the exact tier misses but cosine similarity is 1.
    let seeded = fixture.normalizer.normalize("find red shoes");
    let cached = ClassificationResult::new(
        ActionCode::from("SEARCH_PRODUCT"),
        0.92,
        ResultStatus::LlmClassification,
        MatchSource::Llm,
    );
    assert!(fixture.cache.set(&seeded, &cached).await);

    let request_id = fixture
        .deps
        .queue
        .enqueue(
            QueuePayload {
                query: "red shoes find".to_string(),
                rule_based_hint: None,
                context_snapshot: Default::default(),
            },
            QueuePriority::Normal,
        )
        .await
        .unwrap();

    let message = fixture
        .queue
        .dequeue(Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    process_message(&fixture.deps, message).await;

    // Three attempts went out before the client gave up.
    assert_eq!(fixture.llm_transport.calls(), 3);
    // One warning reached the alert sink; timeouts stay below the
    // escalation threshold.
    assert_eq!(fixture.alerts.raised(), 1);
    assert_eq!(fixture.alerts.escalated(), 0);

    let completed = wait_for_state(&fixture, &request_id, RequestState::Completed).await;
    let result = completed.result.unwrap();
    assert_eq!(result.action_code.as_str(), "SEARCH_PRODUCT");
    assert!((result.confidence - 0.92).abs() < 1e-6);
    assert_eq!(result.status, ResultStatus::LlmClassification);
    assert_eq!(result.fallback_source.as_deref(), Some("cache"));

    // Nothing was dead-lettered.
    assert!(fixture.queue.dead_letters().await.unwrap().is_empty());
}

#[tokio::test]
async fn budget_guard_skips_llm_and_returns_unclear() {
    let transport = ScriptedLlm::new(vec![ScriptedLlm::ok_response("SEARCH_PRODUCT", 0.9)]);
    let fixture = build_fixture(FixtureOptions {
        transport,
        max_cost_per_request: 0.000_01,
        ..FixtureOptions::default()
    });

    let request_id = fixture
        .deps
        .queue
        .enqueue(
            QueuePayload {
                query: "something vaguely shopping related".to_string(),
                rule_based_hint: None,
                context_snapshot: Default::default(),
            },
            QueuePriority::Normal,
        )
        .await
        .unwrap();

    let message = fixture
        .queue
        .dequeue(Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    process_message(&fixture.deps, message).await;

    // The model was never called, no tokens were logged, and the rate
    // limiter window is untouched.
    assert_eq!(fixture.llm_transport.calls(), 0);
    assert_eq!(fixture.usage.today().requests, 0);
    assert_eq!(fixture.rate_limiter.in_flight(), 0);

    let completed = wait_for_state(&fixture, &request_id, RequestState::Completed).await;
    let result = completed.result.unwrap();
    assert_eq!(result.status, ResultStatus::Unclear);
    assert!(result.requires_clarification);
    assert!((2..=4).contains(&result.clarifying_questions.len()));
}

#[tokio::test]
async fn exhausted_retries_without_cache_dead_letter() {
    let transport = ScriptedLlm::always_timeout();
    let fixture = build_fixture(FixtureOptions {
        transport,
        queue_config: kestrel::queue::QueueConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(5),
            ..kestrel::queue::QueueConfig::default()
        },
        ..FixtureOptions::default()
    });

    let request_id = fixture
        .deps
        .queue
        .enqueue(
            QueuePayload {
                query: "mystery utterance with no cache".to_string(),
                rule_based_hint: None,
                context_snapshot: Default::default(),
            },
            QueuePriority::Normal,
        )
        .await
        .unwrap();

    // First processing fails and re-queues; second dead-letters.
    for _ in 0..2 {
        let message = fixture
            .queue
            .dequeue(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        process_message(&fixture.deps, message).await;
    }

    let dead = fixture.queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].request_id, request_id);
    // Retry ceiling: max_retries + 1 processings, each with 3 client
    // attempts.
    assert_eq!(fixture.llm_transport.calls(), 6);

    let failed = wait_for_state(&fixture, &request_id, RequestState::Failed).await;
    let message = failed.message.unwrap();
    assert!(!message.contains("timeout"), "message must stay non-technical");
}
