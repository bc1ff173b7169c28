use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::DataIntegrityError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Candle {
    /// Candle open time (epoch ms)
    pub timestamp: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: u64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Check `low <= min(open, close) <= max(open, close) <= high`.
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataIntegrityError::NonFinite {
                timestamp: self.timestamp,
            });
        }

        if self.low <= 0.0 {
            return Err(DataIntegrityError::NonPositivePrice {
                timestamp: self.timestamp,
                low: self.low,
            });
        }

        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if self.low > body_low || body_high > self.high {
            return Err(DataIntegrityError::OhlcViolation {
                timestamp: self.timestamp,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        Ok(())
    }
}

/// Parse one stored record, rejecting anything that is not a valid candle.
pub fn candle_from_value(value: serde_json::Value) -> Result<Candle, DataIntegrityError> {
    let candle: Candle = serde_json::from_value(value)
        .map_err(|err| DataIntegrityError::Malformed(err.to_string()))?;
    candle.validate()?;
    Ok(candle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_accepts_well_formed_candle() {
        let candle = Candle::new(1, 100.0, 101.0, 99.0, 100.5, 10.0);
        assert!(candle.validate().is_ok());
    }

    #[test]
    fn validate_accepts_flat_candle() {
        let candle = Candle::new(1, 100.0, 100.0, 100.0, 100.0, 0.0);
        assert!(candle.validate().is_ok());
    }

    #[test]
    fn validate_rejects_close_above_high() {
        let candle = Candle::new(7, 100.0, 101.0, 99.0, 102.0, 10.0);
        assert!(matches!(
            candle.validate(),
            Err(DataIntegrityError::OhlcViolation { timestamp: 7, .. })
        ));
    }

    #[test]
    fn validate_rejects_nan() {
        let candle = Candle::new(3, f64::NAN, 101.0, 99.0, 100.0, 10.0);
        assert_eq!(
            candle.validate(),
            Err(DataIntegrityError::NonFinite { timestamp: 3 })
        );
    }

    #[test]
    fn validate_rejects_zero_low() {
        let candle = Candle::new(5, 1.0, 1.0, 0.0, 0.5, 10.0);
        assert!(matches!(
            candle.validate(),
            Err(DataIntegrityError::NonPositivePrice { timestamp: 5, .. })
        ));
        let negative = Candle::new(6, -1.0, -0.5, -2.0, -1.0, 10.0);
        assert!(negative.validate().is_err());
    }

    #[test]
    fn candle_from_value_rejects_missing_field() {
        let value = json!({"timestamp": 1, "open": 1.0, "high": 2.0, "close": 1.5, "volume": 0.0});
        assert!(matches!(
            candle_from_value(value),
            Err(DataIntegrityError::Malformed(_))
        ));
    }
}
