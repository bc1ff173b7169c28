use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min_reversal_threshold must be in (0, 1), got {0}")]
    Threshold(f64),
    #[error("window_size must be at least 1, got {0}")]
    WindowSize(usize),
    #[error("min_strength must be in [0, 1], got {0}")]
    Strength(f64),
    #[error("saturation_multiple must be positive, got {0}")]
    SaturationMultiple(f64),
    #[error("parameter grid axis `{0}` is empty")]
    EmptyAxis(&'static str),
    #[error("ideal signal band is invalid: {min}..={max}")]
    IdealBand { min: usize, max: usize },
    #[error("unsupported candle interval `{0}`")]
    Interval(String),
    #[error("{name} must be positive")]
    NonPositive { name: &'static str },
}

/// Validated detection thresholds. Only constructible through [`DetectorParams::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Min fractional move between consecutive swing points (0.003 = 0.3%)
    min_reversal_threshold: f64,
    /// Candles compared on each side of a swing candidate
    window_size: usize,
    /// Min pattern strength to qualify
    min_strength: f64,
}

impl DetectorParams {
    pub fn new(
        min_reversal_threshold: f64,
        window_size: usize,
        min_strength: f64,
    ) -> Result<Self, ConfigError> {
        if !(min_reversal_threshold.is_finite()
            && min_reversal_threshold > 0.0
            && min_reversal_threshold < 1.0)
        {
            return Err(ConfigError::Threshold(min_reversal_threshold));
        }
        if window_size == 0 {
            return Err(ConfigError::WindowSize(window_size));
        }
        if !(0.0..=1.0).contains(&min_strength) {
            return Err(ConfigError::Strength(min_strength));
        }

        Ok(Self {
            min_reversal_threshold,
            window_size,
            min_strength,
        })
    }

    pub fn min_reversal_threshold(&self) -> f64 {
        self.min_reversal_threshold
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn min_strength(&self) -> f64 {
        self.min_strength
    }

    /// Smallest candle count that can contain a swing point
    pub fn min_candles(&self) -> usize {
        2 * self.window_size + 1
    }
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_reversal_threshold: 0.003,
            window_size: 2,
            min_strength: 0.5,
        }
    }
}

/// Pattern strength scoring knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Magnitude saturates at this multiple of the reversal threshold
    pub saturation_multiple: f64,
    /// Require the middle point to extend past the previous same-kind swing
    pub confirm_middle_leg: bool,
}

impl ScoringConfig {
    pub fn new(saturation_multiple: f64, confirm_middle_leg: bool) -> Result<Self, ConfigError> {
        if !(saturation_multiple.is_finite() && saturation_multiple > 0.0) {
            return Err(ConfigError::SaturationMultiple(saturation_multiple));
        }
        Ok(Self {
            saturation_multiple,
            confirm_middle_leg,
        })
    }

    pub fn reference_scale(&self, params: &DetectorParams) -> f64 {
        self.saturation_multiple * params.min_reversal_threshold()
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            saturation_multiple: 4.0,
            confirm_middle_leg: false,
        }
    }
}

/// Composite score weighting for backtest ranking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestScoring {
    /// Lower edge of the ideal signal-count band
    pub ideal_min_signals: usize,
    /// Upper edge of the ideal signal-count band
    pub ideal_max_signals: usize,
    /// Score lost per signal above the band
    pub excess_penalty: f64,
    pub count_weight: f64,
    pub strength_weight: f64,
}

impl BacktestScoring {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ideal_min_signals == 0 || self.ideal_min_signals > self.ideal_max_signals {
            return Err(ConfigError::IdealBand {
                min: self.ideal_min_signals,
                max: self.ideal_max_signals,
            });
        }
        Ok(())
    }
}

impl Default for BacktestScoring {
    fn default() -> Self {
        Self {
            ideal_min_signals: 3,
            ideal_max_signals: 8,
            excess_penalty: 0.1,
            count_weight: 0.4,
            strength_weight: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_params_validates_ranges() {
        assert!(DetectorParams::new(0.003, 2, 0.5).is_ok());
        assert_eq!(
            DetectorParams::new(0.0, 2, 0.5),
            Err(ConfigError::Threshold(0.0))
        );
        assert!(matches!(
            DetectorParams::new(f64::NAN, 2, 0.5),
            Err(ConfigError::Threshold(_))
        ));
        assert_eq!(
            DetectorParams::new(0.003, 0, 0.5),
            Err(ConfigError::WindowSize(0))
        );
        assert_eq!(
            DetectorParams::new(0.003, 2, 1.5),
            Err(ConfigError::Strength(1.5))
        );
    }

    #[test]
    fn min_candles_covers_both_sides() {
        let params = DetectorParams::new(0.003, 3, 0.5).unwrap();
        assert_eq!(params.min_candles(), 7);
    }

    #[test]
    fn reference_scale_tracks_threshold() {
        let params = DetectorParams::new(0.005, 2, 0.5).unwrap();
        let scoring = ScoringConfig::default();
        assert!((scoring.reference_scale(&params) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn backtest_scoring_rejects_inverted_band() {
        let scoring = BacktestScoring {
            ideal_min_signals: 9,
            ..BacktestScoring::default()
        };
        assert!(scoring.validate().is_err());
        assert!(BacktestScoring::default().validate().is_ok());
    }
}
