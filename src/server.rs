use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::logging::SharedLogger;
use crate::relay::{self, transition, RelayState};
use crate::translate::assistant_types::{AssistantRequest, ErrorResponse};
use crate::translate::provider_types::ProviderRequest;
use crate::translate::request::assistant_to_provider;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub struct AppState {
    pub config: RelayConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: RelayConfig, logger: SharedLogger) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()?;

        Ok(Self {
            config,
            client,
            logger,
            started_at: Instant::now(),
        })
    }
}

/// Every path is served by the same handler; the HTTP method selects the behavior.
/// `OPTIONS` never reaches the handler: the CORS layer answers it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ]);

    Router::new()
        .fallback(handle_request)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> Response {
    match method {
        Method::GET => handle_info(&state).into_response(),
        Method::POST => handle_messages(state, body).await,
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": "Method not allowed" })),
        )
            .into_response(),
    }
}

fn handle_info(state: &AppState) -> Json<serde_json::Value> {
    let uptime = u64::try_from(state.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

    Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime,
        "endpoint": state.config.endpoint(),
        "model": state.config.default_model,
    }))
}

async fn handle_messages(state: Arc<AppState>, body: Bytes) -> Response {
    let request_id = relay::generate_request_id();

    transition(
        &state.logger,
        &request_id,
        RelayState::ReceivingBody,
        json!({ "bytes": body.len() }),
    );

    let req: AssistantRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                &state,
                &request_id,
                RelayError::invalid_request_body(e.to_string()),
            );
        }
    };

    transition(
        &state.logger,
        &request_id,
        RelayState::Transcoding,
        json!({
            "model": req.model,
            "stream": req.is_streaming(),
            "message_count": req.messages.len(),
        }),
    );

    let provider_req = assistant_to_provider(&req, &state.config.default_model);

    if req.is_streaming() {
        handle_streaming(state, provider_req, request_id)
    } else {
        handle_non_streaming(state, provider_req, request_id).await
    }
}

async fn handle_non_streaming(
    state: Arc<AppState>,
    req: ProviderRequest,
    request_id: String,
) -> Response {
    transition(
        &state.logger,
        &request_id,
        RelayState::AwaitingBufferedResponse,
        json!({ "model": req.model, "timeout_ms": state.config.timeout_ms }),
    );

    match relay::relay_buffered(&state, &req, &request_id).await {
        Ok(resp) => {
            transition(
                &state.logger,
                &request_id,
                RelayState::Completed,
                json!({
                    "input_tokens": resp.usage.input_tokens,
                    "output_tokens": resp.usage.output_tokens,
                }),
            );
            Json(resp).into_response()
        }
        Err(e) => error_response(&state, &request_id, e),
    }
}

/// Headers go out immediately; from here on failures travel inside the stream.
fn handle_streaming(state: Arc<AppState>, req: ProviderRequest, request_id: String) -> Response {
    transition(
        &state.logger,
        &request_id,
        RelayState::StreamingRelay,
        json!({ "model": req.model }),
    );

    let body = relay::relay_streaming(state, req, request_id);

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_response(state: &AppState, request_id: &str, err: RelayError) -> Response {
    transition(
        &state.logger,
        request_id,
        RelayState::Failed,
        json!({ "error": err.to_string() }),
    );

    let body = ErrorResponse::new(err.error_type(), err.to_string());
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
