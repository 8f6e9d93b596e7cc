/// Admission control over plan-tier limits.
pub mod capacity;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Participant lifecycle tracking.
pub mod presence;
/// The session façade: every room operation the application may call.
pub mod session_service;
/// Server-Sent Events message generation and streaming.
pub mod sse_events;
/// The shared countdown coordinator.
pub mod timer;
