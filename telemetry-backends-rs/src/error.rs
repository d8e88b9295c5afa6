// telemetry-backends-rs/src/error.rs

use rca_engine::CollaboratorError;
use thiserror::Error;

/// Failures of the reasoning client. Only some of them are worth retrying.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// 400, 401, 403, 404: retrying will not help.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// 500, 502, 503, 504.
    #[error("Server error: {0}")]
    ServerError(String),

    /// Connect failures and request timeouts.
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::ServerError(_) | LlmError::NetworkError(_) | LlmError::RateLimitExceeded(_)
        )
    }
}

impl From<LlmError> for CollaboratorError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ParseError(msg) => CollaboratorError::Decode(msg),
            other => CollaboratorError::Unavailable(other.to_string()),
        }
    }
}

/// Map a transport failure from reqwest onto the engine's error type.
pub(crate) fn transport_error(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Unavailable(format!("request timed out: {}", err))
    } else if err.is_connect() {
        CollaboratorError::Unavailable(format!("connection failed: {}", err))
    } else if err.is_decode() {
        CollaboratorError::Decode(err.to_string())
    } else {
        CollaboratorError::Unavailable(err.to_string())
    }
}

/// Turn a non-success response into `CollaboratorError::Backend`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Backend {
        status: status.as_u16(),
        message: truncate(&body, 300),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::ServerError("502".into()).is_retryable());
        assert!(LlmError::NetworkError("reset".into()).is_retryable());
        assert!(LlmError::RateLimitExceeded("slow down".into()).is_retryable());
        assert!(!LlmError::InvalidRequest("401".into()).is_retryable());
        assert!(!LlmError::ParseError("eof".into()).is_retryable());
        assert!(!LlmError::ModelNotAvailable("gone".into()).is_retryable());
    }

    #[test]
    fn test_parse_errors_become_decode_failures() {
        let err: CollaboratorError = LlmError::ParseError("no choices".into()).into();
        assert_eq!(err, CollaboratorError::Decode("no choices".into()));

        let err: CollaboratorError = LlmError::ServerError("503".into()).into();
        assert!(matches!(err, CollaboratorError::Unavailable(msg) if msg.contains("503")));
    }

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
