//! Mapping of crate errors onto HTTP responses

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use tracing::error;
use tracing::warn;

use crate::api::rate_limit::RetryAfter;
use crate::api::types::ErrorResponse;
use crate::api::types::RateLimitedResponse;
use crate::errors::CampusRagError;
use crate::errors::UpstreamErrorKind;

/// Seconds suggested to clients after a provider quota error
const QUOTA_RETRY_SECS: u64 = 60;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    RateLimited {
        error: String,
        message: String,
        retry_after: RetryAfter,
    },
    Upstream(CampusRagError),
}

impl From<CampusRagError> for ApiError {
    fn from(err: CampusRagError) -> Self {
        match err {
            CampusRagError::InvalidRequest(message) => Self::BadRequest(message),
            other => Self::Upstream(other),
        }
    }
}

fn error_body(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn rate_limited_body(error: String, message: String, retry_after: RetryAfter) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitedResponse {
            error,
            message,
            retry_after,
            rate_limited: true,
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                error_body(StatusCode::BAD_REQUEST, "invalid_request", &message)
            }
            Self::RateLimited {
                error,
                message,
                retry_after,
            } => rate_limited_body(error, message, retry_after),
            Self::Upstream(err) => match err.upstream_kind() {
                UpstreamErrorKind::Quota => {
                    warn!("Upstream quota exhausted: {err}");
                    rate_limited_body(
                        "quota_exceeded".to_string(),
                        "The assistant is handling too many requests right now. Please try again in a minute."
                            .to_string(),
                        RetryAfter::Seconds(QUOTA_RETRY_SECS),
                    )
                }
                // Provider detail stays in the log
                UpstreamErrorKind::Auth => {
                    error!("Upstream authentication failed: {err}");
                    error_body(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "service_unavailable",
                        "The assistant service is temporarily unavailable.",
                    )
                }
                UpstreamErrorKind::Safety => {
                    warn!("Upstream content filter: {err}");
                    error_body(
                        StatusCode::BAD_REQUEST,
                        "content_blocked",
                        "Your message couldn't be processed. Please try rephrasing your question.",
                    )
                }
                UpstreamErrorKind::Other => {
                    error!("Request failed: {err}");
                    error_body(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "Something went wrong while answering. Please try again.",
                    )
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: CampusRagError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_upstream_classification() {
        assert_eq!(
            status_of(CampusRagError::Upstream {
                status: 429,
                message: "RESOURCE_EXHAUSTED".to_string()
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(CampusRagError::Upstream {
                status: 400,
                message: "API key not valid. Please pass a valid API key.".to_string()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(CampusRagError::LlmError(
                "Prompt blocked by safety filters: SAFETY".to_string()
            )),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CampusRagError::HttpError("connection reset".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(CampusRagError::InvalidRequest("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
