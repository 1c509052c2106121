//! Route handlers and wire shapes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::app::AppContext;
use crate::classify::engine::ClassifyRequest;
use crate::classify::{ClassificationResult, ClassifyOutcome};
use crate::error::KestrelError;
use crate::queue::types::EscalationQueue;

type AppState = Arc<AppContext>;

// ---------------------------------------------------------------------
// Classify
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Synchronous classification response.
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub action_code: String,
    pub confidence_score: f32,
    pub matched_keywords: Vec<String>,
    pub original_text: String,
    pub status: String,
    pub entities: Option<crate::entities::Entities>,
    pub intent: IntentView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_clarification: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub clarifying_questions: Vec<String>,
}

/// The nested intent object carried for downstream consumers.
#[derive(Debug, Serialize)]
pub struct IntentView {
    pub id: String,
    pub score: f32,
    pub source: crate::classify::MatchSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_variant: Option<String>,
}

impl ClassifyResponse {
    fn from_result(result: ClassificationResult, original_text: String) -> Self {
        Self {
            action_code: result.action_code.as_str().to_string(),
            confidence_score: result.confidence,
            matched_keywords: result.matched_keywords.clone(),
            original_text,
            status: result.status.as_wire(),
            entities: result.entities.clone(),
            intent: IntentView {
                id: result.action_code.as_str().to_string(),
                score: result.confidence,
                source: result.source,
                config_variant: result.config_variant.clone(),
            },
            requires_clarification: result.requires_clarification.then_some(true),
            clarifying_questions: result.clarifying_questions,
        }
    }
}

/// Asynchronous escalation response.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub request_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

pub fn classify_routes() -> Router<AppState> {
    Router::new().route("/v1/classify", post(classify))
}

async fn classify(
    State(context): State<AppState>,
    Json(body): Json<ClassifyBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let request = ClassifyRequest {
        text: body.text.clone(),
        session_id: body.session_id,
        user_id: body.user_id,
    };

    match context.engine.classify(&request).await {
        Ok(ClassifyOutcome::Resolved(result)) => {
            let response = ClassifyResponse::from_result(result, body.text);
            Ok(Json(serde_json::to_value(response).unwrap_or_default()))
        }
        Ok(ClassifyOutcome::Queued { request_id }) => {
            let response = QueuedResponse {
                request_id,
                status: "QUEUED",
                message: "Your request needs a closer look; poll the status endpoint.",
            };
            Ok(Json(serde_json::to_value(response).unwrap_or_default()))
        }
        Err(KestrelError::InvalidInput(message)) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": message,
                "retry_recommended": false,
            })),
        )),
        Err(e) => {
            error!(error = %e, "classification failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Something went wrong while processing your request.",
                    "retry_recommended": true,
                })),
            ))
        }
    }
}

// ---------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------

pub fn status_routes() -> Router<AppState> {
    Router::new().route("/v1/status/:request_id", get(request_status))
}

async fn request_status(
    State(context): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<crate::status::RequestStatus>, (StatusCode, Json<serde_json::Value>)> {
    match context.status.get(&request_id).await {
        Ok(Some(status)) => Ok(Json(status)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown or expired request id" })),
        )),
        Err(e) => {
            error!(error = %e, "status lookup failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "status lookup failed" })),
            ))
        }
    }
}

// ---------------------------------------------------------------------
// Operational endpoints
// ---------------------------------------------------------------------

pub fn ops_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/cache/stats", get(cache_stats))
        .route("/v1/metrics/costs", get(cost_metrics))
}

async fn health(State(context): State<AppState>) -> Json<serde_json::Value> {
    let queue_stats = context.queue.stats().await.unwrap_or_default();
    Json(json!({
        "status": "ok",
        "embedding_healthy": context.embeddings.is_healthy(),
        "cache_degraded": context.cache.is_degraded(),
        "status_store_degraded": context.status.is_degraded(),
        "active_variant": context.config.active().name,
        "queue": queue_stats,
    }))
}

async fn cache_stats(State(context): State<AppState>) -> Json<crate::cache::CacheStats> {
    Json(context.cache.stats())
}

async fn cost_metrics(State(context): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "today": context.usage.today(),
        "month": context.usage.this_month(),
        "rate_limit_in_flight": context.rate_limiter.in_flight(),
        "alerts_escalated": context.alerts.escalated(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppOptions;

    fn context() -> AppState {
        AppContext::build(AppOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_classify_handler_resolved() {
        let state = context();
        let response = classify(
            State(state),
            Json(ClassifyBody {
                text: "add to cart".to_string(),
                session_id: None,
                user_id: None,
            }),
        )
        .await
        .unwrap();

        let value = response.0;
        assert_eq!(value["action_code"], "ADD_TO_CART");
        assert_eq!(value["status"], "CONFIDENT_KEYWORD");
        assert_eq!(value["original_text"], "add to cart");
        assert_eq!(value["intent"]["id"], "ADD_TO_CART");
        assert_eq!(value["intent"]["source"], "keyword");
    }

    #[tokio::test]
    async fn test_classify_handler_rejects_empty() {
        let state = context();
        let error = classify(
            State(state),
            Json(ClassifyBody {
                text: "  ".to_string(),
                session_id: None,
                user_id: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(error.0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_status_handler_not_found() {
        let state = context();
        let error = request_status(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(error.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let state = context();
        let body = health(State(state)).await.0;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_variant"], "A");
    }
}
