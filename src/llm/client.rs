//! LLM clients: the HTTP transport and the resilient decorator.
//!
//! The decorator owns everything around the network call: prompt
//! assembly, the budget guard, the process-wide rate limiter, the
//! circuit breaker, retry with jittered exponential backoff, a hard
//! per-call timeout, and usage accounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::ContextSnapshot;
use crate::cost::{RateLimiter, UsageTracker};
use crate::error::{KestrelError, Result};
use crate::queue::RuleHint;
use crate::taxonomy::Taxonomy;

use super::circuit::CircuitBreaker;
use super::parser::parse_llm_response;
use super::prompt::PromptLibrary;
use super::types::{
    ChatMessage, Completion, CompletionRequest, LlmClassification, LlmErrorKind, LlmUsage,
};

/// Rough characters-per-token ratio used for cost projection.
const CHARS_PER_TOKEN: usize = 4;

/// Transport abstraction over the model endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Perform one completion call.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Client name for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------
// HTTP transport (OpenAI-style chat completions)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: ApiUsage,
}

/// Reqwest-based client for an OpenAI-compatible chat endpoint.
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpLlmClient {
    /// Create a client for the given endpoint and key. Call timeouts are
    /// enforced by the resilient wrapper, not here.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> LlmErrorKind {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            LlmErrorKind::RateLimit
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            LlmErrorKind::AuthError
        } else if status.is_server_error() {
            LlmErrorKind::ServerError
        } else if body.contains("context_length") || body.contains("maximum context") {
            LlmErrorKind::ContextLengthExceeded
        } else {
            LlmErrorKind::Unknown
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    LlmErrorKind::Timeout
                } else if e.is_connect() {
                    LlmErrorKind::ServerError
                } else {
                    LlmErrorKind::Unknown
                };
                KestrelError::llm(kind, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = Self::classify_status(status, &body);
            return Err(KestrelError::llm(
                kind,
                format!("endpoint returned {status}"),
            ));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| KestrelError::llm(LlmErrorKind::Unknown, e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| KestrelError::llm(LlmErrorKind::Unknown, "empty choices"))?;

        Ok(Completion {
            content,
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// ---------------------------------------------------------------------
// Resilient decorator
// ---------------------------------------------------------------------

/// Retry and timeout knobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff base; attempt n sleeps `base * 2^(n-1)` plus jitter.
    pub base_backoff: Duration,
    /// Jitter as a fraction of the computed backoff (up to 10%).
    pub jitter_frac: f64,
    /// Hard per-call timeout.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            jitter_frac: 0.10,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.base_backoff.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_frac) * base;
        Duration::from_secs_f64(base + jitter)
    }
}

/// One escalated classification request.
#[derive(Debug, Clone)]
pub struct EscalationRequest {
    pub query: String,
    pub hint: Option<RuleHint>,
    pub context: ContextSnapshot,
    pub model: String,
}

/// Decorator adding resilience and accounting around a transport.
pub struct ResilientLlmClient {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    prompts: Arc<PromptLibrary>,
    taxonomy: Arc<Taxonomy>,
    rate_limiter: Arc<RateLimiter>,
    usage: Arc<UsageTracker>,
    circuit: CircuitBreaker,
    max_cost_per_request: f64,
    max_tokens: u32,
    temperature: f32,
}

impl ResilientLlmClient {
    /// Wrap a transport with default policy and budget.
    pub fn new(
        inner: Arc<dyn LlmClient>,
        taxonomy: Arc<Taxonomy>,
        prompts: Arc<PromptLibrary>,
        rate_limiter: Arc<RateLimiter>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
            prompts,
            taxonomy,
            rate_limiter,
            usage,
            circuit: CircuitBreaker::default(),
            max_cost_per_request: 0.01,
            max_tokens: 400,
            temperature: 0.0,
        }
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the per-request cost ceiling.
    pub fn with_budget(mut self, max_cost_per_request: f64) -> Self {
        self.max_cost_per_request = max_cost_per_request;
        self
    }

    /// Replace the circuit breaker.
    pub fn with_circuit(mut self, circuit: CircuitBreaker) -> Self {
        self.circuit = circuit;
        self
    }

    /// The circuit breaker, for health reporting.
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    /// Active prompt version.
    pub fn prompt_version(&self) -> &str {
        self.prompts.version()
    }

    /// Classify an escalated query.
    ///
    /// Sequencing: budget guard first (a refused request must not consume
    /// a rate-limit slot), then circuit breaker, then per-attempt rate
    /// limiting and the call itself.
    pub async fn classify(&self, request: &EscalationRequest) -> Result<LlmClassification> {
        let messages = self
            .prompts
            .build(&request.query, request.hint.as_ref(), &request.context);
        let completion_request = CompletionRequest {
            model: request.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let projected_tokens =
            (completion_request.prompt_chars() / CHARS_PER_TOKEN) as u64 + self.max_tokens as u64;
        let projected_cost = self
            .usage
            .projected_cost(&request.model, projected_tokens);
        if projected_cost > self.max_cost_per_request {
            return Err(KestrelError::budget(format!(
                "projected cost ${projected_cost:.5} exceeds ceiling ${:.5}",
                self.max_cost_per_request
            )));
        }

        if !self.circuit.allow() {
            return Err(KestrelError::llm(
                LlmErrorKind::ServerError,
                "model endpoint circuit is open",
            ));
        }

        let mut last_error: Option<KestrelError> = None;
        for attempt in 1..=self.policy.max_attempts {
            if !self.rate_limiter.allow() {
                let error =
                    KestrelError::llm(LlmErrorKind::RateLimit, "process rate limit window full");
                if attempt == self.policy.max_attempts {
                    return Err(error);
                }
                last_error = Some(error);
                tokio::time::sleep(self.policy.backoff_for(attempt)).await;
                continue;
            }

            let started = Instant::now();
            let outcome = tokio::time::timeout(
                self.policy.call_timeout,
                self.inner.complete(&completion_request),
            )
            .await
            .unwrap_or_else(|_| {
                Err(KestrelError::llm(
                    LlmErrorKind::Timeout,
                    format!("call exceeded {:?}", self.policy.call_timeout),
                ))
            });
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(completion) => {
                    self.circuit.record_success();
                    let cost = self.usage.record(
                        &request.model,
                        completion.prompt_tokens,
                        completion.completion_tokens,
                        latency_ms,
                    );
                    match parse_llm_response(&completion.content, &self.taxonomy) {
                        Ok(parsed) => {
                            debug!(
                                action_code = %parsed.action_code,
                                confidence = parsed.confidence,
                                attempt,
                                "llm classification"
                            );
                            return Ok(LlmClassification {
                                action_code: parsed.action_code,
                                confidence: parsed.confidence,
                                entities: parsed.entities,
                                reasoning: parsed.reasoning,
                                usage: LlmUsage {
                                    prompt_tokens: completion.prompt_tokens,
                                    completion_tokens: completion.completion_tokens,
                                    cost,
                                },
                                latency_ms,
                                attempts: attempt,
                            });
                        }
                        Err(parse_error) => {
                            // Tokens were spent; the next attempt may
                            // still produce parseable output.
                            warn!(error = %parse_error, attempt, "unparseable llm response");
                            last_error = Some(parse_error);
                        }
                    }
                }
                Err(error) => {
                    let kind = error.llm_kind().unwrap_or(LlmErrorKind::Unknown);
                    self.circuit.record_failure();
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        kind = %kind,
                        error = %error,
                        "llm call failed"
                    );
                    if !kind.is_retryable() {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.backoff_for(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            KestrelError::AllRetriesFailed("llm call failed with no recorded error".to_string())
        }))
    }
}

/// Build a chat message list for direct transport tests.
pub fn simple_request(model: &str, content: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(content)],
        max_tokens: 64,
        temperature: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::PriceTable;
    use crate::taxonomy::{ActionCode, IntentDefinition, IntentPriority};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn taxonomy() -> Arc<Taxonomy> {
        Arc::new(
            Taxonomy::from_definitions(vec![IntentDefinition {
                action_code: ActionCode::from("SEARCH_PRODUCT"),
                category: "SEARCH_DISCOVERY".to_string(),
                description: String::new(),
                example_phrases: vec!["find shoes".to_string()],
                required_entities: vec![],
                optional_entities: vec![],
                confidence_threshold: 0.7,
                priority: IntentPriority::Medium,
            }])
            .unwrap(),
        )
    }

    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<Completion>>>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(KestrelError::llm(LlmErrorKind::Unknown, "script empty")))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn ok_completion() -> Result<Completion> {
        Ok(Completion {
            content: r#"{"action_code": "SEARCH_PRODUCT", "confidence": 0.9}"#.to_string(),
            prompt_tokens: 120,
            completion_tokens: 40,
        })
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            jitter_frac: 0.10,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn resilient(inner: Arc<ScriptedClient>) -> ResilientLlmClient {
        ResilientLlmClient::new(
            inner,
            taxonomy(),
            Arc::new(PromptLibrary::default()),
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
            Arc::new(UsageTracker::new(PriceTable::default(), None)),
        )
        .with_policy(fast_policy())
    }

    fn request() -> EscalationRequest {
        EscalationRequest {
            query: "red shoes maybe".to_string(),
            hint: None,
            context: ContextSnapshot::default(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let inner = ScriptedClient::new(vec![ok_completion()]);
        let client = resilient(Arc::clone(&inner));

        let classification = client.classify(&request()).await.unwrap();
        assert_eq!(classification.action_code.as_str(), "SEARCH_PRODUCT");
        assert_eq!(classification.attempts, 1);
        assert!(classification.usage.cost > 0.0);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let inner = ScriptedClient::new(vec![
            Err(KestrelError::llm(LlmErrorKind::Timeout, "slow")),
            ok_completion(),
        ]);
        let client = resilient(Arc::clone(&inner));

        let classification = client.classify(&request()).await.unwrap();
        assert_eq!(classification.attempts, 2);
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_preserves_kind() {
        let inner = ScriptedClient::new(vec![
            Err(KestrelError::llm(LlmErrorKind::Timeout, "slow")),
            Err(KestrelError::llm(LlmErrorKind::Timeout, "slow")),
            Err(KestrelError::llm(LlmErrorKind::Timeout, "slow")),
        ]);
        let client = resilient(Arc::clone(&inner));

        let error = client.classify(&request()).await.unwrap_err();
        assert_eq!(error.llm_kind(), Some(LlmErrorKind::Timeout));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_error_no_retry() {
        let inner = ScriptedClient::new(vec![Err(KestrelError::llm(
            LlmErrorKind::AuthError,
            "bad key",
        ))]);
        let client = resilient(Arc::clone(&inner));

        let error = client.classify(&request()).await.unwrap_err();
        assert_eq!(error.llm_kind(), Some(LlmErrorKind::AuthError));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_budget_guard_skips_call_and_rate_limit() {
        let inner = ScriptedClient::new(vec![ok_completion()]);
        let rate_limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(60)));
        let usage = Arc::new(UsageTracker::new(PriceTable::default(), None));
        let client = ResilientLlmClient::new(
            Arc::clone(&inner) as Arc<dyn LlmClient>,
            taxonomy(),
            Arc::new(PromptLibrary::default()),
            Arc::clone(&rate_limiter),
            Arc::clone(&usage),
        )
        .with_policy(fast_policy())
        .with_budget(0.0001);

        let error = client.classify(&request()).await.unwrap_err();
        assert_eq!(error.llm_kind(), Some(LlmErrorKind::BudgetExceeded));
        assert_eq!(inner.calls(), 0);
        assert_eq!(rate_limiter.in_flight(), 0);
        assert_eq!(usage.today().requests, 0);
    }

    #[tokio::test]
    async fn test_unknown_action_code_becomes_unclear() {
        let inner = ScriptedClient::new(vec![Ok(Completion {
            content: r#"{"action_code": "MYSTERY", "confidence": 0.8}"#.to_string(),
            prompt_tokens: 10,
            completion_tokens: 5,
        })]);
        let client = resilient(inner);

        let classification = client.classify(&request()).await.unwrap();
        assert_eq!(classification.action_code.as_str(), "UNCLEAR");
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits() {
        let inner = ScriptedClient::new(vec![ok_completion()]);
        let circuit = CircuitBreaker::new(1, Duration::from_secs(60));
        circuit.record_failure();
        let client = resilient(Arc::clone(&inner)).with_circuit(circuit);

        let error = client.classify(&request()).await.unwrap_err();
        assert_eq!(error.llm_kind(), Some(LlmErrorKind::ServerError));
        assert_eq!(inner.calls(), 0);
    }
}
