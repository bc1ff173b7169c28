use serde::Serialize;
use utoipa::ToSchema;

use crate::business_logic::reversal::ReversalSignal;

/// Latest view of the monitored symbol
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonitorStatus {
    pub symbol: String,
    pub interval: String,
    /// Dominant pattern kind held by the engine: RISING, FALLING or NONE
    pub state: String,
    pub candle_count: usize,
    pub latest_close: Option<f64>,
    pub latest_candle_time: Option<u64>,
    pub swing_count: usize,
    pub latest_pattern_kind: Option<String>,
    pub latest_pattern_strength: Option<f64>,
    pub pattern_low: Option<f64>,
    pub pattern_high: Option<f64>,
    pub last_signal: Option<ReversalSignal>,
    pub signal_count: u64,
    pub last_run_ms: u64,
    /// Set when the most recent cycle failed
    pub last_error: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReversalResponse {
    /// Empty until the first poll cycle completes
    pub status: Option<MonitorStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusSnapshot {
    pub as_of_ms: u64,
    pub status: MonitorStatus,
}
