use axum::{
    extract::{Query, State},
    Json,
};
use validator::Validate;

use crate::errors::AppError;
use crate::models::market::{CandlesQuery, CandlesResponse};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/candles",
    params(CandlesQuery),
    responses(
        (status = 200, description = "Most recent candles in the rolling window", body = CandlesResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    )
)]
pub async fn get_candles(
    State(state): State<AppState>,
    Query(query): Query<CandlesQuery>,
) -> Result<Json<CandlesResponse>, AppError> {
    query
        .validate()
        .map_err(|err| AppError::Validation(err.to_string()))?;

    let candles = state.status.candles.read().await;
    let start = candles.len().saturating_sub(query.limit);

    Ok(Json(CandlesResponse {
        symbol: state.symbol.clone(),
        interval: state.interval.clone(),
        total: candles.len(),
        candles: candles[start..].to_vec(),
    }))
}
