//! HTTP error response handling for the API
//!
//! This module provides conversions from domain errors to HTTP responses
//! with appropriate status codes and JSON error bodies.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};

/// Implement IntoResponse for Error to automatically convert errors to HTTP responses
///
/// Capacity rejections also carry a `Retry-After` header in whole seconds, rounded up.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let retry_after = match &self {
            Error::Rejected(r) => r.retry_after_secs(),
            _ => None,
        };

        let api_error: ApiError = self.into();
        let mut response = (status_code, Json(api_error)).into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

/// Implement IntoResponse for ApiError for explicit error responses
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Default to 500 if we're directly converting an ApiError
        // (usually errors go through Error::into_response which has the status code)
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, DownloadError, Rejection};
    use crate::types::{RequestId, RequestState};
    use std::time::Duration;

    async fn body_of(response: Response) -> ApiError {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_error_to_http_status_not_found() {
        let error = Error::Download(DownloadError::NotFound { id: RequestId(123) });
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), "request_not_found");
    }

    #[test]
    fn test_error_to_http_status_validation() {
        let error = Error::Rejected(Rejection::UnsupportedPlatform {
            url: "https://example.com/clip".into(),
        });
        assert_eq!(error.status_code(), 422);

        let error = Error::Rejected(Rejection::BlockedDomain {
            domain: "blocked.example".into(),
        });
        assert_eq!(error.status_code(), 403);
        assert_eq!(error.error_code(), "blocked_domain");
    }

    #[test]
    fn test_error_to_http_status_internal_server() {
        let error = Error::Database(DatabaseError::QueryFailed("query failed".to_string()));
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), "database_error");
    }

    #[tokio::test]
    async fn test_error_into_response() {
        let error = Error::Download(DownloadError::NotFound { id: RequestId(9) });
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(RETRY_AFTER).is_none());

        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "request_not_found");
        assert!(api_error.error.message.contains('9'));
        assert_eq!(api_error.error.details.unwrap()["request_id"], 9);
    }

    #[tokio::test]
    async fn test_already_terminal_into_response() {
        let error = Error::Download(DownloadError::AlreadyTerminal {
            id: RequestId(456),
            state: RequestState::Cancelled,
        });
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "already_terminal");
        let details = api_error.error.details.unwrap();
        assert_eq!(details["request_id"], 456);
        assert_eq!(details["state"], "cancelled");
    }

    #[tokio::test]
    async fn test_capacity_rejection_sets_retry_after() {
        let error = Error::Rejected(Rejection::QueueFull {
            capacity: 20,
            retry_after: Duration::from_secs(30),
        });
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "30");

        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "queue_full");
        assert_eq!(api_error.error.details.unwrap()["retry_after_secs"], 30);
    }

    #[tokio::test]
    async fn test_retry_after_header_rounds_partial_seconds_up() {
        let error = Error::Rejected(Rejection::RateLimited {
            retry_after: Duration::from_millis(59_400),
        });
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "60");
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.details.unwrap()["retry_after_secs"], 60);
    }

    #[tokio::test]
    async fn test_shutting_down_has_no_retry_hint() {
        let response = Error::Rejected(Rejection::ShuttingDown).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
