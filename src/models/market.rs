use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::candle::Candle;

pub fn interval_ms(interval: &str) -> Option<u64> {
    match interval {
        "1m" => Some(60_000),
        "3m" => Some(180_000),
        "5m" => Some(300_000),
        "15m" => Some(900_000),
        "30m" => Some(1_800_000),
        "1h" => Some(3_600_000),
        "2h" => Some(7_200_000),
        "4h" => Some(14_400_000),
        "8h" => Some(28_800_000),
        "12h" => Some(43_200_000),
        "1d" => Some(86_400_000),
        "3d" => Some(259_200_000),
        "1w" => Some(604_800_000),
        "1M" => Some(2_592_000_000),
        _ => None,
    }
}

/// Query for the stored candle window
#[derive(Debug, Clone, Deserialize, Validate, ToSchema, IntoParams)]
pub struct CandlesQuery {
    /// Most recent N candles
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 5000))]
    #[param(example = 200, default = 200)]
    pub limit: usize,
}

fn default_limit() -> usize {
    200
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CandlesResponse {
    pub symbol: String,
    pub interval: String,
    /// Candles in the store, before `limit` is applied
    pub total: usize,
    pub candles: Vec<Candle>,
}
