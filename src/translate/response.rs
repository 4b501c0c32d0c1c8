//! Translate buffered provider responses (and provider error bodies) back into
//! the assistant dialect.

use super::assistant_types::{AssistantResponse, ErrorResponse, ResponseContentBlock, Usage};
use super::provider_types::{ChatErrorResponse, ProviderResponse};
use crate::error::{RelayError, Result};

/// Translate a buffered provider response into an assistant response.
/// Fails only when `choices` is missing or empty.
pub fn provider_to_assistant(
    resp: &ProviderResponse,
    request_id: Option<&str>,
) -> Result<AssistantResponse> {
    let choice = resp
        .choices
        .as_deref()
        .and_then(|choices| choices.first())
        .ok_or_else(|| RelayError::invalid_response_format("response has no choices"))?;

    let text = choice
        .message
        .as_ref()
        .and_then(|m| m.content.clone())
        .unwrap_or_default();

    let stop_reason = choice
        .finish_reason
        .clone()
        .unwrap_or_else(|| "end_turn".to_string());

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.prompt_tokens.unwrap_or(0),
        output_tokens: u.completion_tokens.unwrap_or(0),
    });

    let id = request_id.map_or_else(
        || format!("msg_{}", chrono::Utc::now().timestamp_millis()),
        ToString::to_string,
    );

    Ok(AssistantResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content: vec![ResponseContentBlock::Text { text }],
        model: resp.model.clone().unwrap_or_default(),
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage,
    })
}

/// Translate a provider error body into an assistant error response
pub fn provider_error_to_assistant(err: &ChatErrorResponse) -> ErrorResponse {
    let error_type = match err.error.error_type.as_deref() {
        Some("invalid_request_error") => "invalid_request_error",
        Some("rate_limit_error" | "rate_limit_exceeded") => "rate_limit_error",
        _ => "api_error",
    };

    ErrorResponse::new(error_type, &err.error.message)
}
