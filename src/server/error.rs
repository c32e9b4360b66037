use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::Ah32Error;

/// Structured error body for the HTTP API.
/// Carries error_code + suggestion so the task pane can show a fix.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error_code: String,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn invalid_params(field: &str, message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error_code: "INVALID_PARAMS".into(),
            message: message.into(),
            suggestion: "Check parameter format and valid values.".into(),
            field: Some(field.to_string()),
        }
    }

    pub fn unsupported_host(value: &str) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error_code: "UNSUPPORTED_HOST".into(),
            message: format!("Unsupported host_app '{}'", value),
            suggestion: "Use one of: wps, et, wpp.".into(),
            field: Some("host_app".into()),
        }
    }
}

impl From<Ah32Error> for ApiError {
    fn from(err: Ah32Error) -> Self {
        let message = err.to_string();
        match err {
            Ah32Error::Validation(_) => ApiError {
                status: StatusCode::BAD_REQUEST,
                error_code: "VALIDATION_ERROR".into(),
                message,
                suggestion: "Check field values and required fields.".into(),
                field: None,
            },
            Ah32Error::NotFound { .. } => ApiError {
                status: StatusCode::NOT_FOUND,
                error_code: "NOT_FOUND".into(),
                message,
                suggestion: "Check the id. Session ids come from /agentic/session/generate.".into(),
                field: None,
            },
            Ah32Error::Conflict(_) => ApiError {
                status: StatusCode::CONFLICT,
                error_code: "CONFLICT".into(),
                message,
                suggestion: "Make the request consistent with the active host and document.".into(),
                field: None,
            },
            Ah32Error::Timeout { .. } => ApiError {
                status: StatusCode::GATEWAY_TIMEOUT,
                error_code: "TIMEOUT".into(),
                message,
                suggestion: "Retry, or shorten the request.".into(),
                field: None,
            },
            Ah32Error::Llm(_) => ApiError {
                status: StatusCode::BAD_GATEWAY,
                error_code: "LLM_ERROR".into(),
                message,
                suggestion: "The model provider failed. Retry in a moment.".into(),
                field: None,
            },
            Ah32Error::Config(_) | Ah32Error::Storage(_) => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error_code: "INTERNAL_ERROR".into(),
                message,
                suggestion: "Retry the operation or check the server log.".into(),
                field: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(code = %self.error_code, "API error: {}", self.message);
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err: ApiError = Ah32Error::Validation("bad".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code, "VALIDATION_ERROR");

        let err: ApiError = Ah32Error::timeout("plan").into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_body_omits_status() {
        let body = serde_json::to_value(ApiError::unsupported_host("notepad")).unwrap();
        assert_eq!(body["error_code"], "UNSUPPORTED_HOST");
        assert_eq!(body["field"], "host_app");
        assert!(body.get("status").is_none());
    }
}
