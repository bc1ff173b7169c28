use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::business_logic::candle_store::MS_PER_HOUR;
use crate::business_logic::config::{ConfigError, DetectorParams, ScoringConfig};
use crate::models::market::interval_ms;

/// Runtime configuration derived from environment variables.
///
/// Variable names follow the existing deployment env file so it can be
/// reused as-is.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Hyperliquid coin; PAXG tracks spot gold
    pub symbol: String,
    pub interval: String,
    pub window_hours: u64,
    /// Candles requested per fetch
    pub fetch_count: usize,
    pub detector: DetectorParams,
    pub scoring: ScoringConfig,
    pub check_interval: Duration,
    /// Empty ⇒ notifications are only logged
    pub webhook_url: Option<String>,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub bind_addr: String,
    pub lock_stale: Duration,
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn env_str(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn env_u64(&self, name: &str, default: u64) -> u64 {
        self.get(name).and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    fn env_usize(&self, name: &str, default: usize) -> usize {
        self.get(name).and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    fn env_f64(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    fn env_bool(&self, name: &str, default: bool) -> bool {
        self.get(name)
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
            .unwrap_or(default)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let interval = vars.env_str("KLINE_PERIOD", "5m");
        let step = interval_ms(&interval).ok_or_else(|| ConfigError::Interval(interval.clone()))?;

        let window_hours = vars.env_u64("KLINE_HOURS", 48);
        if window_hours == 0 {
            return Err(ConfigError::NonPositive { name: "KLINE_HOURS" });
        }
        let derived_count = (window_hours * MS_PER_HOUR / step).max(1) as usize;

        let detector = DetectorParams::new(
            vars.env_f64("MIN_REVERSAL_THRESHOLD", 0.003),
            vars.env_usize("SWING_WINDOW_SIZE", 2),
            vars.env_f64("MIN_STRENGTH", 0.5),
        )?;
        let scoring = ScoringConfig::new(
            vars.env_f64("STRENGTH_SATURATION_MULTIPLE", 4.0),
            vars.env_bool("CONFIRM_MIDDLE_LEG", false),
        )?;

        let check_secs = vars.env_u64("CHECK_INTERVAL", 300);
        if check_secs == 0 {
            return Err(ConfigError::NonPositive { name: "CHECK_INTERVAL" });
        }

        Ok(Self {
            symbol: vars.env_str("GOLD_SYMBOL", "PAXG"),
            interval,
            window_hours,
            fetch_count: vars.env_usize("KLINE_COUNT", derived_count),
            detector,
            scoring,
            check_interval: Duration::from_secs(check_secs),
            webhook_url: vars.get("FEISHU_WEBHOOK_URL"),
            data_dir: PathBuf::from(vars.env_str("DATA_DIR", "data")),
            log_dir: PathBuf::from(vars.env_str("LOG_DIR", "logs")),
            bind_addr: vars.env_str("BIND_ADDR", "0.0.0.0:3000"),
            lock_stale: Duration::from_secs(vars.env_u64("LOCK_STALE_SECS", 900)),
        })
    }
}
