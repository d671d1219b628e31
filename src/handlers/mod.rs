pub mod evidence_handlers;
pub mod health_handlers;
pub mod tracking_handlers;
