//! Evidence storage subsystem, leaves first: validation, identity, layout,
//! blob and metadata storage, then the orchestrating service.

pub mod evidence_service;
pub mod file_store;
pub mod identity;
pub mod metadata_store;
pub mod path_resolver;
pub mod tracking_lookup;
pub mod validator;
