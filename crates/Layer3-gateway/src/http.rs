//! HTTP surface for the request gateway.
//!
//! Endpoints:
//! - POST /api/execute                 - Submit an input, returns its request id
//! - GET  /api/status/{request_id}     - Poll a request (`?wait_ms=&since=` for long polling)
//! - GET  /api/stats                   - Record counts by state
//! - GET  /health                      - Liveness
//!
//! Errors are returned as `{"error": "..."}` with a 4xx/5xx status.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use taskrelay_foundation::{Error, Result};
use taskrelay_task::{RequestId, StatusView, StoreStats};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::gateway::RequestGateway;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub request_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Long-poll budget in milliseconds
    pub wait_ms: Option<u64>,
    /// Version the client already has
    pub since: Option<u64>,
}

/// Gateway error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            err if err.is_user_facing() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.0.is_user_facing() {
            error!("Request failed: {}", self.0);
        }
        json_error(status, &self.0.to_string()).into_response()
    }
}

fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Build the router with CORS and request tracing
pub fn router(gateway: Arc<RequestGateway>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/execute", post(handle_execute))
        .route("/api/status/{request_id}", get(handle_status))
        .route("/api/stats", get(handle_stats))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(gateway)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(gateway: Arc<RequestGateway>, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(gateway);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Gateway shut down");
    Ok(())
}

// ========== Handlers ==========

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// POST /api/execute
async fn handle_execute(
    State(gateway): State<Arc<RequestGateway>>,
    payload: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> std::result::Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected execute body: {}", rejection.body_text());
        Error::InvalidInput(rejection.body_text())
    })?;

    let id = gateway.submit(&request.input)?;
    Ok(Json(ExecuteResponse {
        request_id: id.to_string(),
    }))
}

/// GET /api/status/{request_id}
async fn handle_status(
    State(gateway): State<Arc<RequestGateway>>,
    Path(request_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> std::result::Result<Json<StatusView>, ApiError> {
    // an id we could never have issued is simply unknown
    let id: RequestId = request_id
        .parse()
        .map_err(|_| Error::not_found(format!("request {}", request_id)))?;

    let view = match query.wait_ms {
        Some(wait_ms) if wait_ms > 0 => {
            gateway
                .poll_wait(id, query.since, Duration::from_millis(wait_ms))
                .await?
        }
        _ => gateway.poll(id)?,
    };
    Ok(Json(view))
}

/// GET /api/stats
async fn handle_stats(State(gateway): State<Arc<RequestGateway>>) -> Json<StoreStats> {
    Json(gateway.stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::DuplicateId("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
