use crate::dto::health::HealthResponse;

/// Respond with the static health payload. The in-memory store has no
/// connection to lose, so there is no degraded variant to report.
pub fn health_status() -> HealthResponse {
    HealthResponse::ok()
}
