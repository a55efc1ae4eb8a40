//! HTTP surface of the lookup service.
//!
//! Uses axum to expose one lookup operation plus a liveness probe. Every
//! lookup gets its own correlation id and browser; nothing is shared between
//! calls except the configuration and the runner.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use ppsr_runner::{RunContext, Runner};
use ppsr_types::{LookupRequest, LookupResponse, LookupStatus, ServiceConfig};

/// Body of the liveness endpoints.
pub const RUNNING_MESSAGE: &str = "PPSR Automation API is running";

/// Message attached to every completed lookup.
pub const COMPLETED_MESSAGE: &str = "Login attempt completed";

/// Shared state for HTTP handlers.
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub runner: Runner,
}

impl AppState {
    pub fn new(config: Arc<ServiceConfig>, runner: Runner) -> Self {
        Self { config, runner }
    }
}

/// Error body, `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(root_handler))
        .route("/open_ppsr", post(open_ppsr_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "starting HTTP server");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
        .into_response()
}

async fn root_handler() -> impl IntoResponse {
    Json(MessageBody {
        message: RUNNING_MESSAGE,
    })
}

async fn open_ppsr_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LookupRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };
    if let Err(e) = request.validate() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
    }

    let ctx = RunContext::new(Arc::clone(&state.config));
    let span = ctx.span.clone();
    info!(parent: &span, "HTTP /open_ppsr received");

    match state.runner.run(&request, &ctx).await {
        Ok(outcome) => {
            info!(parent: &span, "HTTP /open_ppsr completed");
            let body = LookupResponse {
                status: LookupStatus::Success,
                message: COMPLETED_MESSAGE.to_string(),
                plate_number: outcome.plate_number,
                request_id: ctx.request_id.clone(),
                logs_dir: outcome.artifact_dir,
                trace: outcome.trace_path,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(parent: &span, error = %e, "HTTP /open_ppsr failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
