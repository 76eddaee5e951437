//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reconciler::ReconcileError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Webhook could not be reconciled.
    Webhook(ReconcileError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Webhook(err) => webhook_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn webhook_error_to_response(err: ReconcileError) -> (StatusCode, String) {
    if err.is_rejection() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        // Details stay in the logs; the sender only needs to retry.
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook handler failed".to_string(),
        )
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Webhook(err)
    }
}

#[cfg(test)]
mod tests {
    use reconciler::SignatureError;

    use super::*;

    #[test]
    fn signature_errors_are_bad_requests() {
        let response =
            ApiError::from(ReconcileError::Signature(SignatureError::Mismatch)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let response = ApiError::BadRequest("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
