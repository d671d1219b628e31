use crate::services::{
    evidence_service::EvidenceError,
    validator::{ALLOWED_MIME_TYPES, ValidationError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use std::fmt;

/// An API error rendered as `{ "error": code, "message": ..., "status": n }`
/// plus any extra detail fields.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Map<String, Value>,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
            details: Map::new(),
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, msg)
    }

    /// Attach an extra field to the response body.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        }

        let mut body = json!({
            "error": self.code,
            "message": self.message,
            "status": self.status.as_u16()
        });
        if let Value::Object(map) = &mut body {
            map.extend(self.details);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<EvidenceError> for AppError {
    fn from(err: EvidenceError) -> Self {
        let code = err.code();
        match &err {
            EvidenceError::InvalidTrackingNumber(raw) => {
                AppError::new(StatusCode::BAD_REQUEST, code, "Invalid tracking number format")
                    .with_detail("trackingNumber", raw.as_str())
            }
            EvidenceError::TrackingNotFound(tn) => {
                AppError::new(StatusCode::NOT_FOUND, code, "Tracking number not found")
                    .with_detail("trackingNumber", tn.as_str())
            }
            EvidenceError::Invalid(invalid) => validation_error(invalid),
            EvidenceError::UploadFailed { size, .. } => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                code,
                "Failed to save evidence file",
            )
            .with_detail("details", err.to_string())
            .with_detail("size", *size),
            EvidenceError::DeletionFailed { .. } => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                code,
                "Failed to delete evidence file",
            )
            .with_detail("details", err.to_string()),
            EvidenceError::EvidenceNotFound { tracking_number, id } => {
                AppError::new(StatusCode::NOT_FOUND, code, "Evidence not found")
                    .with_detail("trackingNumber", tracking_number.as_str())
                    .with_detail("evidenceId", id.as_str())
            }
            EvidenceError::StorageUnavailable(_) => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                code,
                "Evidence storage is unavailable",
            )
            .with_detail("details", err.to_string()),
        }
    }
}

fn validation_error(err: &ValidationError) -> AppError {
    let code = err.code();
    match err {
        ValidationError::MissingFile => {
            AppError::new(StatusCode::BAD_REQUEST, code, "No image file provided")
                .with_detail("field", "image")
        }
        ValidationError::FileTooLarge { actual, limit } => AppError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            code,
            err.to_string(),
        )
        .with_detail("maxSize", format!("{} bytes", limit))
        .with_detail("actualSize", format!("{} bytes", actual)),
        ValidationError::InvalidFile { declared } => AppError::new(
            StatusCode::BAD_REQUEST,
            code,
            "Invalid file format. Only JPEG, PNG, GIF, WebP are allowed",
        )
        .with_detail("allowedTypes", ALLOWED_MIME_TYPES.to_vec())
        .with_detail("actualType", declared.as_str()),
        ValidationError::InvalidImage { declared, detected } => {
            AppError::new(StatusCode::BAD_REQUEST, code, "File is not a valid image")
                .with_detail("declaredType", declared.as_str())
                .with_detail("detectedType", detected.map(Value::from).unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tracking::TrackingNumber;

    #[test]
    fn taxonomy_maps_to_http_status() {
        let tn = TrackingNumber::parse("1Z999AA1234567890").unwrap();
        let cases: Vec<(EvidenceError, StatusCode)> = vec![
            (
                EvidenceError::InvalidTrackingNumber("BADID".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                EvidenceError::TrackingNotFound(tn.clone()),
                StatusCode::NOT_FOUND,
            ),
            (
                ValidationError::FileTooLarge {
                    actual: 6,
                    limit: 5,
                }
                .into(),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ValidationError::InvalidFile {
                    declared: "text/plain".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                EvidenceError::EvidenceNotFound {
                    tracking_number: tn,
                    id: "x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
        ];

        for (err, status) in cases {
            let code = err.code();
            let app: AppError = err.into();
            assert_eq!(app.status, status, "{code}");
            assert_eq!(app.code, code);
        }
    }
}
