use axum::{routing::get, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers;
use crate::models::health::HealthResponse;
use crate::models::market::CandlesResponse;
use crate::models::reversal::{MonitorStatus, ReversalResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::reversal::get_reversal_status,
        handlers::reversal::get_reversal_stream,
        handlers::candles::get_candles
    ),
    components(schemas(
        HealthResponse,
        ReversalResponse,
        MonitorStatus,
        CandlesResponse,
        ErrorResponse
    ))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/reversal", get(handlers::reversal::get_reversal_status))
        .route("/reversal/stream", get(handlers::reversal::get_reversal_stream))
        .route("/candles", get(handlers::candles::get_candles))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
