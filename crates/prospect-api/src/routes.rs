//! Router setup with all API routes and middleware.

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use prospect_core::error::ProspectError;

use crate::handlers;
use crate::state::AppState;

/// Request bodies carry a transcript at most; 256KB is plenty.
const BODY_LIMIT: usize = 256 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/calls/{call_id}", get(handlers::get_call).delete(handlers::end_call))
        .route("/calls/{call_id}/turns", post(handlers::post_turn))
        .route("/prompt/compile", post(handlers::compile_prompt))
        .route("/prompt/validate", post(handlers::validate_reply));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `host:port` and serve until `shutdown` resolves.
pub async fn start_server<F>(
    host: &str,
    port: u16,
    state: AppState,
    shutdown: F,
) -> Result<(), ProspectError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", host, port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ProspectError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ProspectError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
