//! HTTP transport: axum routes over the delivery gateway.
//!
//! - `POST /message`              -- `{"message": "..."}` → `{"success": true}`
//! - `GET  /messages/short-polling` -- full list, immediately
//! - `GET  /messages/long-polling?messageCount=N[&timeoutMs=T]`
//!                                 -- full list once it grows past N
//! - `GET  /health`               -- liveness plus counters

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pollcast_core::{DeliveryError, DeliveryGateway, GatewayStats, Snapshot};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Response header telling a long-poll client whether the wait ran out.
/// The body is the full list either way.
pub const TIMED_OUT_HEADER: &str = "x-poll-timed-out";

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    /// Kept loose so a non-string value maps to `INVALID_INPUT`, not a decode error.
    #[serde(default)]
    pub message: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub success: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LongPollQuery {
    #[serde(rename = "messageCount")]
    pub message_count: Option<String>,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub stats: GatewayStats,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Delivery(DeliveryError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Delivery(DeliveryError::TransportFailure { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        tracing::debug!(status = %status, error = %self, "request rejected");
        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<DeliveryGateway>,
    /// Fires on shutdown so parked long-polls answer instead of holding the
    /// graceful shutdown open.
    pub cancel: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/message", post(post_message))
        .route("/messages/short-polling", get(short_polling))
        .route("/messages/long-polling", get(long_polling))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        stats: state.gateway.stats().await,
    })
}

async fn post_message(
    State(state): State<AppState>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<Json<PostMessageResponse>, ApiError> {
    let Json(request) = payload?;
    let text = request.message.as_str().ok_or_else(|| {
        DeliveryError::InvalidInput("`message` must be a non-empty string".into())
    })?;

    let message = state.gateway.post_message(text).await?;
    tracing::info!(text = %message.text, timestamp = %message.timestamp, "new message via http");
    Ok(Json(PostMessageResponse { success: true }))
}

async fn short_polling(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.gateway.get_short().await)
}

async fn long_polling(State(state): State<AppState>, Query(query): Query<LongPollQuery>) -> Response {
    // A missing or non-numeric count never blocks.
    let Some(threshold) = parse_count(query.message_count.as_deref()) else {
        return poll_response(state.gateway.get_short().await, false);
    };
    let max_wait = parse_count(query.timeout_ms.as_deref()).map(|ms| Duration::from_millis(ms as u64));

    tokio::select! {
        outcome = state.gateway.get_long(threshold, max_wait) => {
            let timed_out = outcome.timed_out();
            poll_response(outcome.messages, timed_out)
        }
        _ = state.cancel.cancelled() => {
            poll_response(state.gateway.get_short().await, true)
        }
    }
}

fn parse_count(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse().ok()
}

fn poll_response(messages: Snapshot, timed_out: bool) -> Response {
    let flag = if timed_out { "true" } else { "false" };
    ([(TIMED_OUT_HEADER, flag)], Json(messages)).into_response()
}

// ---------------------------------------------------------------------------
// HttpServer
// ---------------------------------------------------------------------------

pub struct HttpServer {
    addr: SocketAddr,
    state: AppState,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, gateway: Arc<DeliveryGateway>, cancel: CancellationToken) -> Self {
        Self {
            addr,
            state: AppState { gateway, cancel },
        }
    }

    /// Bind to the configured address and return the actual local address.
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "http server bound");
        Ok((listener, local_addr))
    }

    /// Serve on a pre-bound listener until the cancellation token fires.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let cancel = self.state.cancel.clone();
        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("http server: cancellation requested, shutting down");
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
