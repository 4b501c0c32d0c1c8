//! Outbound side of the relay: one call to the provider per inbound request,
//! either buffered or streamed, with the result translated back.

use crate::error::{RelayError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::server::AppState;
use crate::translate::assistant_types::{AssistantResponse, ErrorBody, StreamEvent};
use crate::translate::provider_types::{ChatErrorResponse, ProviderRequest, ProviderResponse};
use crate::translate::response::{provider_error_to_assistant, provider_to_assistant};
use crate::translate::streaming::{SseFrame, StreamTranscoder};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Frames queued between the provider pump and the response body.
const FRAME_BUFFER: usize = 16;

/// Lifecycle of one inbound request. Every transition is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    ReceivingBody,
    Transcoding,
    AwaitingBufferedResponse,
    StreamingRelay,
    Completed,
    Failed,
}

impl RelayState {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayState::ReceivingBody => "receiving_body",
            RelayState::Transcoding => "transcoding",
            RelayState::AwaitingBufferedResponse => "awaiting_buffered_response",
            RelayState::StreamingRelay => "streaming_relay",
            RelayState::Completed => "completed",
            RelayState::Failed => "failed",
        }
    }
}

pub fn transition(
    logger: &SharedLogger,
    request_id: &str,
    state: RelayState,
    context: serde_json::Value,
) {
    let level = if state == RelayState::Failed {
        LogLevel::Error
    } else {
        LogLevel::Info
    };
    logger.request_with_context(level, "relay", request_id, state.as_str(), context);
}

/// `req_<unix millis>_<9 random characters>`
pub fn generate_request_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "req_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..9]
    )
}

/// Forward a non-streaming request and translate the provider's reply.
pub async fn relay_buffered(
    state: &AppState,
    req: &ProviderRequest,
    request_id: &str,
) -> Result<AssistantResponse> {
    let body = with_timeout(state.config.timeout(), async {
        let response = send_to_provider(state, req, request_id).await?;
        Ok::<_, RelayError>(response.text().await?)
    })
    .await?;

    state.logger.request(
        LogLevel::Debug,
        "relay",
        request_id,
        format!("Provider response body_len={}", body.len()),
    );

    let provider_resp: ProviderResponse = serde_json::from_str(&body).map_err(|e| {
        RelayError::invalid_response_format(format!(
            "Invalid JSON response: {}. Body: {}",
            e,
            truncate(&body, 300)
        ))
    })?;

    provider_to_assistant(&provider_resp, Some(request_id))
}

/// Start a streaming relay and return the body the caller reads from.
///
/// `message_start` is queued before the provider is contacted. The provider is
/// pumped on its own task; dropping the returned stream (caller went away)
/// cancels that task and releases the outbound connection.
pub fn relay_streaming(
    state: Arc<AppState>,
    req: ProviderRequest,
    request_id: String,
) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static {
    let (tx, mut rx) = mpsc::channel::<SseFrame>(FRAME_BUFFER);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    tokio::spawn(pump_stream(state, req, request_id, tx, cancel));

    async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(Bytes::from(frame.to_sse()));
        }
    }
}

enum StreamEnd {
    Completed { forwarded: usize },
    Disconnected,
}

async fn pump_stream(
    state: Arc<AppState>,
    req: ProviderRequest,
    request_id: String,
    tx: mpsc::Sender<SseFrame>,
    cancel: CancellationToken,
) {
    let logger = &state.logger;

    let start = StreamEvent::MessageStart {
        message: AssistantResponse::started(&request_id, &req.model),
    };
    if tx.send(start.into()).await.is_err() {
        log_disconnect(logger, &request_id);
        return;
    }

    let mut transcoder = StreamTranscoder::new();
    let outcome = tokio::select! {
        () = cancel.cancelled() => Ok(StreamEnd::Disconnected),
        result = forward_provider_stream(&state, &req, &request_id, &tx, &mut transcoder) => result,
    };

    let failure = match outcome {
        Ok(StreamEnd::Disconnected) => {
            log_disconnect(logger, &request_id);
            return;
        }
        Ok(StreamEnd::Completed { forwarded }) => {
            logger.request(
                LogLevel::Debug,
                "stream",
                &request_id,
                format!("Forwarded {forwarded} frames"),
            );
            None
        }
        Err(e) => {
            let message = e.to_string();
            logger.request(
                LogLevel::Error,
                "stream",
                &request_id,
                format!("Streaming error: {message}"),
            );
            let frame = StreamEvent::Error {
                error: ErrorBody {
                    error_type: e.error_type().to_string(),
                    message: message.clone(),
                },
            };
            let _ = tx.send(frame.into()).await;
            Some(message)
        }
    };

    if !transcoder.is_done() {
        let _ = tx.send(SseFrame::Done).await;
    }

    match failure {
        None => transition(
            logger,
            &request_id,
            RelayState::Completed,
            serde_json::json!({ "stream": true }),
        ),
        Some(error) => transition(
            logger,
            &request_id,
            RelayState::Failed,
            serde_json::json!({ "stream": true, "error": error }),
        ),
    }
}

async fn forward_provider_stream(
    state: &AppState,
    req: &ProviderRequest,
    request_id: &str,
    tx: &mpsc::Sender<SseFrame>,
    transcoder: &mut StreamTranscoder,
) -> Result<StreamEnd> {
    let limit = state.config.timeout();
    let response = with_timeout(limit, send_to_provider(state, req, request_id)).await?;

    let byte_stream = response.bytes_stream();
    tokio::pin!(byte_stream);

    let mut forwarded = 0;

    loop {
        let next = tokio::time::timeout(limit, byte_stream.next())
            .await
            .map_err(|_| timeout_error(limit))?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;

        let frames = transcoder.push(&chunk);
        log_diagnostics(&state.logger, request_id, transcoder);
        for frame in frames {
            if tx.send(frame).await.is_err() {
                return Ok(StreamEnd::Disconnected);
            }
            forwarded += 1;
        }

        if transcoder.is_done() {
            return Ok(StreamEnd::Completed { forwarded });
        }
    }

    for frame in transcoder.finish() {
        if tx.send(frame).await.is_err() {
            return Ok(StreamEnd::Disconnected);
        }
        forwarded += 1;
    }
    log_diagnostics(&state.logger, request_id, transcoder);

    Ok(StreamEnd::Completed { forwarded })
}

/// POST the request to the provider; statuses >= 400 become `RelayError::Provider`.
async fn send_to_provider(
    state: &AppState,
    req: &ProviderRequest,
    request_id: &str,
) -> Result<reqwest::Response> {
    let url = state.config.completions_url();

    state.logger.request(
        LogLevel::Info,
        "relay",
        request_id,
        format!(
            "POST {} model={} stream={} messages={}",
            url,
            req.model,
            req.stream,
            req.messages.len()
        ),
    );

    let response = state
        .client
        .post(&url)
        .header("Authorization", format!("Bearer {}", state.config.api_key))
        .header("X-Request-Id", request_id)
        .json(req)
        .send()
        .await?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(provider_status_error(status, &body));
    }

    Ok(response)
}

fn provider_status_error(status: u16, body: &str) -> RelayError {
    match serde_json::from_str::<ChatErrorResponse>(body) {
        Ok(err) => {
            let mapped = provider_error_to_assistant(&err);
            RelayError::Provider {
                status,
                error_type: mapped.error.error_type,
                message: mapped.error.message,
            }
        }
        Err(_) => RelayError::Provider {
            status,
            error_type: "api_error".to_string(),
            message: truncate(body, 500).to_string(),
        },
    }
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| timeout_error(limit))?
}

fn timeout_error(limit: Duration) -> RelayError {
    RelayError::RequestTimeout {
        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
    }
}

fn log_diagnostics(logger: &SharedLogger, request_id: &str, transcoder: &mut StreamTranscoder) {
    for note in transcoder.take_diagnostics() {
        logger.request(LogLevel::Debug, "stream", request_id, note);
    }
}

fn log_disconnect(logger: &SharedLogger, request_id: &str) {
    logger.request(
        LogLevel::Warn,
        "stream",
        request_id,
        "Caller disconnected, provider call abandoned",
    );
    transition(
        logger,
        request_id,
        RelayState::Failed,
        serde_json::json!({ "stream": true, "reason": "caller_disconnected" }),
    );
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
