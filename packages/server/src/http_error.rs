//! HTTP error handling for the sync server
//!
//! Error bodies carry the same machine-readable codes as protocol `error`
//! messages, so clients handle both transports alike.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use kintree_core::FamilyError;
use serde::{Deserialize, Serialize};

/// JSON error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// User-facing error message
    pub message: String,
    /// Machine-readable error code
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(
        message: impl Into<String>,
        code: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            details: Some(details.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "STRUCTURAL_ERROR" | "CODEC_ERROR" | "PROTOCOL_ERROR" => {
                StatusCode::BAD_REQUEST
            }
            "INVALID_CREDENTIALS" => StatusCode::UNAUTHORIZED,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<FamilyError> for HttpError {
    fn from(err: FamilyError) -> Self {
        match err {
            FamilyError::Storage(ref details) => {
                HttpError::with_details("Storage failure", err.code(), details.clone())
            }
            FamilyError::Credential(ref details) => HttpError::with_details(
                "Credential processing failed",
                err.code(),
                details.clone(),
            ),
            _ => HttpError::new(err.to_string(), err.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kintree_core::ValidationError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (FamilyError::account_not_found("a@x.org"), StatusCode::NOT_FOUND),
            (FamilyError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (FamilyError::conflict("taken"), StatusCode::CONFLICT),
            (
                ValidationError::MissingField("email".to_string()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (FamilyError::storage("disk"), StatusCode::INTERNAL_SERVER_ERROR),
            (FamilyError::credential("rng"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(HttpError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_details_omitted_when_absent() {
        let body = serde_json::to_value(HttpError::new("nope", "CONFLICT")).unwrap();

        assert_eq!(body, serde_json::json!({"message": "nope", "code": "CONFLICT"}));
    }

    #[test]
    fn test_credential_errors_are_not_reported_as_storage() {
        let err = HttpError::from(FamilyError::credential("bad salt"));

        assert_eq!(err.code, "CREDENTIAL_ERROR");
        assert_eq!(err.message, "Credential processing failed");
    }

    #[test]
    fn test_storage_errors_keep_details() {
        let err = HttpError::from(FamilyError::storage("disk full"));

        assert_eq!(err.code, "STORAGE_ERROR");
        assert_eq!(err.details.as_deref(), Some("disk full"));
    }
}
