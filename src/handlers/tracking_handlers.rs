//! Read-only shipment status.

use crate::{
    errors::AppError, models::tracking::TrackingInfo,
    services::evidence_service::EvidenceService,
};
use axum::{
    Json,
    extract::{Path, State},
};

/// `GET /api/v1/tracking/{tracking_number}`
pub async fn get_tracking(
    State(service): State<EvidenceService>,
    Path(tracking_number): Path<String>,
) -> Result<Json<TrackingInfo>, AppError> {
    Ok(Json(service.tracking_info(&tracking_number)?))
}
