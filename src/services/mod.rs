/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Planning-poker engine operations.
pub mod poker_service;
/// Inactivity and finalization timer handlers.
pub mod session_timers;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
