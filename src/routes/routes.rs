//! Defines routes for the tracking and evidence API.
//!
//! ## Structure
//! - `GET    /api/v1/tracking/{tracking_number}`: shipment status
//! - `POST   /api/v1/tracking/{tracking_number}/evidence`: upload evidence (multipart)
//! - `GET    /api/v1/tracking/{tracking_number}/evidence`: list evidence
//! - `DELETE /api/v1/tracking/{tracking_number}/evidence/{evidence_id}`: delete evidence
//! - `GET    /api/v1/evidence/stats`: totals across shipments
//! - `GET    /uploads/evidence/{tracking_number}/{filename}`: stored image
//! - `GET    /healthz`, `GET /readyz`: probes

use crate::{
    handlers::{
        evidence_handlers::{
            delete_evidence, evidence_stats, get_evidence_file, list_evidence, upload_evidence,
        },
        health_handlers::{healthz, readyz},
        tracking_handlers::get_tracking,
    },
    services::evidence_service::EvidenceService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get},
};
use tower_http::trace::TraceLayer;

/// Build the router. Upload requests may carry up to `upload_body_limit`
/// bytes so oversized images reach the validator instead of being cut off
/// by the transport.
pub fn routes(upload_body_limit: usize) -> Router<EvidenceService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/v1/tracking/{tracking_number}", get(get_tracking))
        .route(
            "/api/v1/tracking/{tracking_number}/evidence",
            get(list_evidence)
                .post(upload_evidence)
                .layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route(
            "/api/v1/tracking/{tracking_number}/evidence/{evidence_id}",
            delete(delete_evidence),
        )
        .route("/api/v1/evidence/stats", get(evidence_stats))
        .route(
            "/uploads/evidence/{tracking_number}/{filename}",
            get(get_evidence_file),
        )
        .layer(TraceLayer::new_for_http())
}
