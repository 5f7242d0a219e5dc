use serde::Serialize;
use utoipa::ToSchema;

/// Payload returned by `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when storage answers, `degraded` otherwise.
    pub status: &'static str,
    /// Whether planning-poker operations are currently rejected.
    pub degraded: bool,
}

impl HealthResponse {
    /// Build the payload from the degraded flag.
    pub fn from_degraded(degraded: bool) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" },
            degraded,
        }
    }
}
