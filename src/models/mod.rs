//! Core data models for the evidence service.
//!
//! Evidence records serialize as camelCase JSON both for the API and for the
//! file-backed metadata store.

pub mod evidence;
pub mod tracking;
