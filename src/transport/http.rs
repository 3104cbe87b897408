//! HTTP endpoints built on axum.
//!
//! - `POST /send-message`: ingest a submission; 200 when the log append
//!   succeeded, 500 otherwise, 400 for an undecodable body
//! - `GET /messages`: the cached message window, oldest first
//! - `GET /health`: liveness plus the number of live connections

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::app::Context;
use crate::pipeline::MessageSubmission;
use crate::transport::message::{ErrorResponse, HealthResponse, SendMessageResponse};
use crate::utils::Result;

pub fn router(ctx: Context) -> Router {
    Router::new()
        .route("/send-message", post(send_message))
        .route("/messages", get(get_messages))
        .route("/health", get(health))
        .with_state(ctx)
}

pub async fn start_http_server(addr: &str, ctx: Context) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

async fn send_message(State(ctx): State<Context>, body: Bytes) -> Response {
    let submission = match MessageSubmission::from_slice(&body) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(error = %e, "invalid request");
            return error_response(StatusCode::BAD_REQUEST, "invalid request");
        }
    };

    let outcome = ctx.pipeline.ingest(submission).await;
    let status = if outcome.is_durable() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(SendMessageResponse::from(&outcome))).into_response()
}

async fn get_messages(State(ctx): State<Context>) -> Response {
    match ctx.pipeline.recent().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to get messages from cache");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to get messages from cache",
            )
        }
    }
}

async fn health(State(ctx): State<Context>) -> Response {
    match ctx.hub.connection_count().await {
        Ok(connections) => Json(HealthResponse {
            status: "ok".to_string(),
            connections,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}
