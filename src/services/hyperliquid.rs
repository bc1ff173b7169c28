use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::market::interval_ms;

const HYPERLIQUID_API_URL: &str = "https://api.hyperliquid.xyz/info";

/// Source of OHLCV candles, in any order.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, symbol: &str, interval: &str, count: usize)
        -> Result<Vec<Candle>, AppError>;
}

#[derive(Debug, Serialize)]
struct CandleRequest {
    #[serde(rename = "type")]
    request_type: String,
    req: CandleRequestInner,
}

#[derive(Debug, Serialize)]
struct CandleRequestInner {
    coin: String,
    interval: String,
    #[serde(rename = "startTime")]
    start_time: u64,
    #[serde(rename = "endTime")]
    end_time: u64,
}

/// Candle as returned by `candleSnapshot`; prices arrive as strings.
#[derive(Debug, Clone, Deserialize)]
struct RawCandle {
    /// Open time (epoch ms)
    #[serde(rename = "t")]
    open_time: u64,
    /// Close time (epoch ms)
    #[serde(rename = "T")]
    close_time: u64,
    #[serde(rename = "o", deserialize_with = "deserialize_string_to_f64")]
    open: f64,
    #[serde(rename = "h", deserialize_with = "deserialize_string_to_f64")]
    high: f64,
    #[serde(rename = "l", deserialize_with = "deserialize_string_to_f64")]
    low: f64,
    #[serde(rename = "c", deserialize_with = "deserialize_string_to_f64")]
    close: f64,
    #[serde(rename = "v", deserialize_with = "deserialize_string_to_f64")]
    volume: f64,
}

impl From<RawCandle> for Candle {
    fn from(raw: RawCandle) -> Self {
        Candle::new(raw.open_time, raw.open, raw.high, raw.low, raw.close, raw.volume)
    }
}

fn deserialize_string_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

#[derive(Clone)]
pub struct HyperliquidClient {
    client: reqwest::Client,
    base_url: String,
}

impl HyperliquidClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: HYPERLIQUID_API_URL.to_string(),
        }
    }

    /// Fetch candles for a coin within a time range
    async fn fetch_range(
        &self,
        coin: &str,
        interval: &str,
        start_time: u64,
        end_time: u64,
    ) -> Result<Vec<RawCandle>, reqwest::Error> {
        let request = CandleRequest {
            request_type: "candleSnapshot".to_string(),
            req: CandleRequestInner {
                coin: coin.to_string(),
                interval: interval.to_string(),
                start_time,
                end_time,
            },
        };

        self.client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RawCandle>>()
            .await
    }
}

impl Default for HyperliquidClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for HyperliquidClient {
    async fn fetch(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>, AppError> {
        let step = interval_ms(interval)
            .ok_or_else(|| AppError::Validation(format!("unsupported interval: {interval}")))?;
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let (start_time, end_time) = build_time_range(now_ms, step, count);

        let raw = self
            .fetch_range(symbol, interval, start_time, end_time)
            .await
            .map_err(|err| AppError::Upstream(format!("candleSnapshot {symbol} {interval}: {err}")))?;

        let fetched = raw.len();
        let candles = closed_candles(raw, now_ms);
        tracing::debug!(
            "[{}] fetched {} candles ({} closed)",
            symbol,
            fetched,
            candles.len()
        );
        Ok(candles)
    }
}

fn build_time_range(now_ms: u64, interval_ms: u64, limit: usize) -> (u64, u64) {
    let span = interval_ms.saturating_mul(limit as u64);
    let start_time = now_ms.saturating_sub(span);
    (start_time, now_ms)
}

/// The still-forming candle would repaint the latest swing; keep closed ones only.
fn closed_candles(raw: Vec<RawCandle>, now_ms: u64) -> Vec<Candle> {
    raw.into_iter()
        .filter(|c| c.close_time < now_ms)
        .map(Candle::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"[
        {"t": 1700000000000, "T": 1700000299999, "s": "PAXG", "i": "5m",
         "o": "2650.1", "c": "2651.4", "h": "2652.0", "l": "2649.8", "v": "12.5", "n": 42},
        {"t": 1700000300000, "T": 1700000599999, "s": "PAXG", "i": "5m",
         "o": "2651.4", "c": "2650.9", "h": "2651.9", "l": "2650.2", "v": "3.1", "n": 7}
    ]"#;

    #[test]
    fn raw_candles_parse_string_prices() {
        let raw: Vec<RawCandle> = serde_json::from_str(SNAPSHOT).unwrap();
        let candle = Candle::from(raw[0].clone());

        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.open, 2650.1);
        assert_eq!(candle.high, 2652.0);
        assert_eq!(candle.low, 2649.8);
        assert_eq!(candle.close, 2651.4);
        assert_eq!(candle.volume, 12.5);
    }

    #[test]
    fn raw_candle_rejects_non_numeric_price() {
        let bad = r#"[{"t": 1, "T": 2, "o": "x", "c": "1", "h": "1", "l": "1", "v": "1"}]"#;
        assert!(serde_json::from_str::<Vec<RawCandle>>(bad).is_err());
    }

    #[test]
    fn forming_candle_is_dropped() {
        let raw: Vec<RawCandle> = serde_json::from_str(SNAPSHOT).unwrap();
        let candles = closed_candles(raw, 1_700_000_400_000);

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
    }

    #[test]
    fn build_time_range_uses_limit_and_interval() {
        let now_ms = 1_000_000;
        let interval_ms = 60_000;
        let (start_time, end_time) = build_time_range(now_ms, interval_ms, 5);

        assert_eq!(end_time, now_ms);
        assert_eq!(start_time, now_ms - (interval_ms * 5));
    }

    #[test]
    fn build_time_range_saturates() {
        let (start_time, _) = build_time_range(1_000, 60_000, 10);
        assert_eq!(start_time, 0);
    }

    #[tokio::test]
    async fn unsupported_interval_is_validation_error() {
        let client = HyperliquidClient::new();
        let result = client.fetch("PAXG", "7m", 10).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
