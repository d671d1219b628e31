//! HTTP handlers for delivery evidence.
//! Parses multipart uploads into an [`UploadedFile`] and delegates every rule
//! to `EvidenceService`; responses expose only the public view of a record.

use crate::{
    errors::AppError,
    models::evidence::{EvidenceMetadata, PublicEvidence, UploadedFile},
    services::evidence_service::{EvidenceService, EvidenceStats},
};
use axum::{
    Json,
    body::Body,
    extract::{
        Path, State,
        multipart::{Field, Multipart, MultipartError, MultipartRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use serde::Serialize;
use tokio_util::io::ReaderStream;

/// Multipart field carrying the image payload.
const IMAGE_FIELD: &str = "image";

/// IMF-fixdate, as HTTP date headers require.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCreatedResponse {
    pub success: bool,
    pub message: String,
    pub tracking_number: String,
    pub evidence: PublicEvidence,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceListResponse {
    pub tracking_number: String,
    pub evidence_count: usize,
    pub evidence: Vec<PublicEvidence>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceDeletedResponse {
    pub success: bool,
    pub message: String,
    pub tracking_number: String,
    pub evidence_id: String,
}

/// `POST /api/v1/tracking/{tracking_number}/evidence`
///
/// Fields: `image` (file, required), `description` and `location` (text, optional).
pub async fn upload_evidence(
    State(service): State<EvidenceService>,
    Path(tracking_number): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    // Report a bad or unknown shipment before looking at the body.
    service.tracking_info(&tracking_number)?;
    let mut multipart = multipart.map_err(|rejection| {
        AppError::bad_request(
            "invalid_request",
            format!("Expected a multipart/form-data body: {}", rejection.body_text()),
        )
    })?;

    let mut file = None;
    let mut metadata = EvidenceMetadata::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some(IMAGE_FIELD) => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let declared_mime = field.content_type().unwrap_or_default().to_string();
                let bytes = read_field(field).await?;
                file = Some(UploadedFile::new(original_name, declared_mime, bytes));
            }
            Some("description") => {
                metadata.description = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("location") => {
                metadata.location = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let record = service
        .save_evidence(&tracking_number, file, metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(EvidenceCreatedResponse {
            success: true,
            message: "Delivery evidence uploaded successfully".into(),
            tracking_number: record.tracking_number.to_string(),
            evidence: record.to_public(),
        }),
    ))
}

/// `GET /api/v1/tracking/{tracking_number}/evidence`
pub async fn list_evidence(
    State(service): State<EvidenceService>,
    Path(tracking_number): Path<String>,
) -> Result<Json<EvidenceListResponse>, AppError> {
    let records = service.get_evidence_by_tracking(&tracking_number).await?;
    let evidence: Vec<PublicEvidence> = records.iter().map(|r| r.to_public()).collect();

    Ok(Json(EvidenceListResponse {
        tracking_number,
        evidence_count: evidence.len(),
        evidence,
    }))
}

/// `DELETE /api/v1/tracking/{tracking_number}/evidence/{evidence_id}`
pub async fn delete_evidence(
    State(service): State<EvidenceService>,
    Path((tracking_number, evidence_id)): Path<(String, String)>,
) -> Result<Json<EvidenceDeletedResponse>, AppError> {
    service
        .delete_evidence(&tracking_number, &evidence_id)
        .await?;

    Ok(Json(EvidenceDeletedResponse {
        success: true,
        message: "Evidence deleted successfully".into(),
        tracking_number,
        evidence_id,
    }))
}

/// `GET /api/v1/evidence/stats`
pub async fn evidence_stats(
    State(service): State<EvidenceService>,
) -> Result<Json<EvidenceStats>, AppError> {
    Ok(Json(service.stats().await?))
}

/// `GET /uploads/evidence/{tracking_number}/{filename}`: stream a stored image.
pub async fn get_evidence_file(
    State(service): State<EvidenceService>,
    Path((tracking_number, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (record, reader) = service.open_evidence(&tracking_number, &filename).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size));
    let last_modified = record.uploaded_at.format(HTTP_DATE_FORMAT).to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    Ok(response)
}

async fn read_field(mut field: Field<'_>) -> Result<BytesMut, AppError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Bodies over the transport limit surface as `file_too_large`.
fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "file_too_large",
            "Request body exceeds the upload limit",
        )
        .with_detail("details", err.body_text())
    } else {
        AppError::bad_request("invalid_request", format!("Multipart error: {}", err.body_text()))
    }
}
