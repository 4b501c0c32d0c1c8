//! Error types for the relay.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid request body: {message}")]
    InvalidRequestBody { message: String },

    #[error("Invalid provider response format: {message}")]
    InvalidResponseFormat { message: String },

    #[error("Provider returned status {status}: {message}")]
    Provider {
        status: u16,
        error_type: String,
        message: String,
    },

    #[error("Request timeout after {after_ms}ms")]
    RequestTimeout { after_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_request_body(msg: impl Into<String>) -> Self {
        Self::InvalidRequestBody {
            message: msg.into(),
        }
    }

    pub fn invalid_response_format(msg: impl Into<String>) -> Self {
        Self::InvalidResponseFormat {
            message: msg.into(),
        }
    }

    /// The assistant-dialect `error.type` this failure is reported as.
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequestBody { .. } => "invalid_request_error",
            Self::Provider { error_type, .. } => error_type,
            _ => "api_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        assert_eq!(
            RelayError::invalid_request_body("bad").error_type(),
            "invalid_request_error"
        );
        assert_eq!(
            RelayError::invalid_response_format("no choices").error_type(),
            "api_error"
        );
        assert_eq!(
            RelayError::RequestTimeout { after_ms: 10 }.error_type(),
            "api_error"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = RelayError::RequestTimeout { after_ms: 120_000 };
        assert_eq!(err.to_string(), "Request timeout after 120000ms");
    }
}
