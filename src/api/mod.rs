// Operator HTTP API
// Token-protected triggers for single-project and full-fleet certificate updates

use crate::observability::request_span;
use crate::scheduler::UpdateExecutor;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const STATUS_OK: &str = "ok";
const STATUS_SCHEDULED: &str = "scheduled ssl update";

/// Shared state of the operator API
pub struct ApiState {
    pub executor: Arc<UpdateExecutor>,
    pub server_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerParams {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,

    #[serde(rename = "async")]
    pub run_async: Option<String>,
}

impl TriggerParams {
    fn is_async(&self) -> bool {
        self.run_async
            .as_deref()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }
}

/// Build the API router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ssl", post(update_project))
        .route("/api/v1/ssl/all", post(update_all))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<axum::body::Body>| {
                    request_span(req.method().as_str(), req.uri().path())
                }),
        )
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    bind_addr: &str,
    port: u16,
    state: Arc<ApiState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!("{}:{}", bind_addr, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Operator API listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Operator API stopped");
    Ok(())
}

fn reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn failure(message: &str, error: impl std::fmt::Display) -> Response {
    reply(
        StatusCode::BAD_REQUEST,
        json!({ "message": message, "error": error.to_string() }),
    )
}

/// Accepts `Authorization: Bearer <token>` or `X-Admin-Token: <token>`
fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let admin = headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());

    [bearer, admin]
        .into_iter()
        .flatten()
        .any(|token| token.trim() == expected)
}

fn unauthorized() -> Response {
    reply(
        StatusCode::UNAUTHORIZED,
        json!({ "message": "server token required", "error": "unauthorized" }),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": STATUS_OK }))
}

async fn update_project(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(params): Query<TriggerParams>,
) -> Response {
    if !authorized(&headers, &state.server_token) {
        warn!("Rejected unauthenticated ssl trigger");
        return unauthorized();
    }

    let Some(project_id) = params.project_id.clone().filter(|id| !id.is_empty()) else {
        return failure("projectId is required", "missing query parameter projectId");
    };

    if params.is_async() {
        state.executor.run_for_project_async(project_id);
        return reply(StatusCode::OK, json!({ "status": STATUS_SCHEDULED }));
    }

    match state.executor.run_for_project(&project_id).await {
        Ok(outcome) => reply(StatusCode::OK, json!({ "status": STATUS_OK, "outcome": outcome })),
        Err(e) => failure(&format!("failed to update ssl for project [{}]", project_id), e),
    }
}

async fn update_all(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(params): Query<TriggerParams>,
) -> Response {
    if !authorized(&headers, &state.server_token) {
        warn!("Rejected unauthenticated ssl sweep trigger");
        return unauthorized();
    }

    if params.is_async() {
        state.executor.run_sweep_async();
        return reply(StatusCode::OK, json!({ "status": STATUS_SCHEDULED }));
    }

    match state.executor.run_sweep().await {
        Ok(report) => reply(StatusCode::OK, json!({ "status": STATUS_OK, "report": report })),
        Err(e) => failure("failed to update ssl for all projects", e),
    }
}
