/// Authenticated command surface with transient retry.
pub mod command_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Game references accepted at lobby creation.
pub mod game_catalog;
/// Health check service.
pub mod health_service;
/// Caller identity resolution.
pub mod identity;
/// Read-only lobby listing and details.
pub mod lobby_query_service;
/// Transactional membership engine.
pub mod membership_service;
/// Post-commit lobby event publishing.
pub mod notification;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
