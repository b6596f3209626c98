use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Every variant is terminal for the current evaluation attempt. Nothing retries.
#[derive(Debug, Error)]
pub enum AppError {
    /// No credential or no application text. No request was sent.
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// The completion endpoint rejected the credential.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The reply could not be turned into an evaluation. `raw_reply` is the untouched model output.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String, raw_reply: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn malformed(message: impl Into<String>, raw_reply: &str) -> Self {
        AppError::MalformedResponse {
            message: message.into(),
            raw_reply: raw_reply.to_string(),
        }
    }

    /// Stable machine-readable code used in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingInput(_) => "MISSING_INPUT",
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::Transport(_) => "TRANSPORT_ERROR",
            AppError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Authentication { message, .. } => AppError::Authentication(message),
            LlmError::EmptyContent => AppError::malformed("completion returned no text", ""),
            other => AppError::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message, raw_reply) = match self {
            AppError::MissingInput(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Authentication(msg) => {
                tracing::warn!("Completion endpoint rejected credential: {msg}");
                (StatusCode::UNAUTHORIZED, msg, None)
            }
            AppError::Transport(msg) => {
                tracing::error!("Transport error: {msg}");
                (StatusCode::BAD_GATEWAY, msg, None)
            }
            AppError::MalformedResponse { message, raw_reply } => {
                tracing::warn!(
                    reply_len = raw_reply.len(),
                    "Malformed completion reply: {message}"
                );
                (StatusCode::BAD_GATEWAY, message, Some(raw_reply))
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(raw) = raw_reply {
            error["raw_reply"] = json!(raw);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_response_surfaces_raw_reply() {
        let response =
            AppError::malformed("no JSON object found", "lo siento, no puedo").into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "MALFORMED_RESPONSE");
        assert_eq!(body["error"]["raw_reply"], "lo siento, no puedo");
    }

    #[tokio::test]
    async fn test_missing_input_is_bad_request() {
        let response = AppError::MissingInput("api key is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "MISSING_INPUT");
        assert!(body["error"].get("raw_reply").is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AppError::Internal(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "An internal server error occurred");
    }

    #[tokio::test]
    async fn test_payload_too_large_is_413() {
        let response = AppError::PayloadTooLarge("Upload exceeds the limit".into()).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_llm_authentication_maps_verbatim() {
        let err: AppError = LlmError::Authentication {
            status: 401,
            message: "Incorrect API key provided".into(),
        }
        .into();
        match err {
            AppError::Authentication(msg) => assert_eq!(msg, "Incorrect API key provided"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_llm_api_failure_maps_to_transport() {
        let err: AppError = LlmError::Api {
            status: 503,
            message: "overloaded".into(),
        }
        .into();
        assert_eq!(err.code(), "TRANSPORT_ERROR");
    }
}
