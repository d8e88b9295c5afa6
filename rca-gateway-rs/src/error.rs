// rca-gateway-rs/src/error.rs

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::increment_counter;
use rca_engine::RcaError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] RcaError),

    /// The body was not a valid analysis request.
    #[error("malformed request body: {}", .0.body_text())]
    MalformedBody(#[from] JsonRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::MalformedBody(_) | ApiError::Engine(RcaError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(RcaError::UnknownContinuation(_)) => StatusCode::NOT_FOUND,
            ApiError::Engine(RcaError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        increment_counter!("rca_http_errors_total", "status" => status.as_u16().to_string());
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rca_engine::ConfigError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(RcaError::InvalidRequest("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(RcaError::UnknownContinuation("abc".into())).status(),
            StatusCode::NOT_FOUND
        );
        let config = RcaError::Config(ConfigError::InvalidValue {
            field: "max_loops",
            reason: "must be at least 1".into(),
        });
        assert_eq!(ApiError::from(config).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
