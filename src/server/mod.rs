//! HTTP adapter.
//!
//! A thin axum surface over the decision engine and the stores. All
//! classification semantics live below this layer; handlers translate
//! wire shapes and map typed errors onto status codes.

pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::AppContext;
use crate::error::Result;

/// Build the router over an application context.
pub fn build_router(context: Arc<AppContext>) -> Router {
    Router::new()
        .merge(routes::classify_routes())
        .merge(routes::status_routes())
        .merge(routes::ops_routes())
        .with_state(context)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
pub async fn run(context: Arc<AppContext>, addr: &str) -> Result<()> {
    let app = build_router(context);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .map_err(crate::error::KestrelError::Io)?;
    Ok(())
}
