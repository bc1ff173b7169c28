use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when the last poll cycle failed
    pub status: String,
    pub symbol: String,
    pub last_run_ms: Option<u64>,
}
