use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::models::health::HealthResponse;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let status = state.status.status.read().await;
    let degraded = status.as_ref().is_some_and(|s| s.last_error.is_some());

    Ok(Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        symbol: state.symbol.clone(),
        last_run_ms: status.as_ref().map(|s| s.last_run_ms),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::status::new_shared_status;

    #[tokio::test]
    async fn healthy_before_first_cycle() {
        let state = AppState {
            status: new_shared_status(),
            symbol: "PAXG".to_string(),
            interval: "5m".to_string(),
        };

        let Json(response) = health(State(state)).await.unwrap();
        assert_eq!(response.status, "healthy");
        assert_eq!(response.symbol, "PAXG");
        assert!(response.last_run_ms.is_none());
    }
}
