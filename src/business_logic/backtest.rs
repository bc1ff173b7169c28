use chrono::{DateTime, Utc};
use itertools::iproduct;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::business_logic::config::{BacktestScoring, ConfigError, DetectorParams, ScoringConfig};
use crate::business_logic::reversal::ReversalDetector;
use crate::models::candle::Candle;

pub const DEFAULT_THRESHOLDS: [f64; 5] = [0.001, 0.003, 0.005, 0.007, 0.01];
pub const DEFAULT_WINDOWS: [usize; 3] = [2, 3, 4];
pub const DEFAULT_STRENGTHS: [f64; 3] = [0.3, 0.5, 0.7];

/// Cartesian grid of detector parameters. Every axis value is validated up
/// front, so iteration never fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGrid {
    thresholds: Vec<f64>,
    windows: Vec<usize>,
    strengths: Vec<f64>,
}

impl ParameterGrid {
    pub fn new(
        thresholds: Vec<f64>,
        windows: Vec<usize>,
        strengths: Vec<f64>,
    ) -> Result<Self, ConfigError> {
        if thresholds.is_empty() {
            return Err(ConfigError::EmptyAxis("thresholds"));
        }
        if windows.is_empty() {
            return Err(ConfigError::EmptyAxis("windows"));
        }
        if strengths.is_empty() {
            return Err(ConfigError::EmptyAxis("strengths"));
        }

        // Validate each axis on its own against a known-good baseline
        let base = DetectorParams::default();
        for &t in &thresholds {
            DetectorParams::new(t, base.window_size(), base.min_strength())?;
        }
        for &w in &windows {
            DetectorParams::new(base.min_reversal_threshold(), w, base.min_strength())?;
        }
        for &s in &strengths {
            DetectorParams::new(base.min_reversal_threshold(), base.window_size(), s)?;
        }

        Ok(Self {
            thresholds,
            windows,
            strengths,
        })
    }

    pub fn len(&self) -> usize {
        self.thresholds.len() * self.windows.len() * self.strengths.len()
    }

    /// Threshold-major order: (t0, w0, s0), (t0, w0, s1), ...
    pub fn iter(&self) -> impl Iterator<Item = DetectorParams> + '_ {
        iproduct!(
            self.thresholds.iter(),
            self.windows.iter(),
            self.strengths.iter()
        )
        .filter_map(|(&t, &w, &s)| DetectorParams::new(t, w, s).ok())
    }
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            windows: DEFAULT_WINDOWS.to_vec(),
            strengths: DEFAULT_STRENGTHS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub parameters: DetectorParams,
    pub signal_count: usize,
    /// Mean confidence of emitted signals, 0 when there are none
    pub average_strength: f64,
    pub composite_score: f64,
    pub swing_count: usize,
    pub pattern_count: usize,
    pub min_strength_seen: f64,
    pub max_strength_seen: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl RangeStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Self {
        let (mut min, mut max, mut sum, mut n) = (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize);
        for v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            n += 1;
        }
        if n == 0 {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        Self {
            min,
            max,
            mean: sum / n as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStatistics {
    pub signal_count: RangeStats,
    pub average_strength: RangeStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub total_tests: usize,
    pub candle_count: usize,
    pub statistics: BacktestStatistics,
    /// Highest composite scores first
    pub best_by_score: Vec<BacktestResult>,
    pub best_by_strength: BacktestResult,
    /// Most signals
    pub most_sensitive: BacktestResult,
    /// Fewest signals
    pub least_sensitive: BacktestResult,
    /// Every cell in grid order
    pub all_results: Vec<BacktestResult>,
    pub created_at: DateTime<Utc>,
}

/// Replays a static candle window through the detector for each grid cell
#[derive(Debug, Clone, Default)]
pub struct BacktestEngine {
    scoring: ScoringConfig,
    ranking: BacktestScoring,
}

impl BacktestEngine {
    pub fn new(scoring: ScoringConfig, ranking: BacktestScoring) -> Result<Self, ConfigError> {
        ranking.validate()?;
        Ok(Self { scoring, ranking })
    }

    pub fn run_single(&self, candles: &[Candle], params: DetectorParams) -> BacktestResult {
        let replay = ReversalDetector::new(params, self.scoring).replay(candles);

        let strengths: Vec<f64> = replay.signals.iter().map(|s| s.confidence).collect();
        let signal_count = strengths.len();
        let stats = RangeStats::from_values(strengths.iter().copied());

        BacktestResult {
            parameters: params,
            signal_count,
            average_strength: stats.mean,
            composite_score: composite_score(signal_count, stats.mean, &self.ranking),
            swing_count: replay.swing_count,
            pattern_count: replay.pattern_count,
            min_strength_seen: stats.min,
            max_strength_seen: stats.max,
        }
    }

    /// Evaluate every cell in parallel. Results come back in grid order.
    pub fn run_grid(&self, candles: &[Candle], grid: &ParameterGrid) -> Vec<BacktestResult> {
        let cells: Vec<DetectorParams> = grid.iter().collect();
        tracing::info!(
            "Running backtest grid: {} combinations over {} candles",
            cells.len(),
            candles.len()
        );

        cells
            .into_par_iter()
            .map(|params| self.run_single(candles, params))
            .collect()
    }

    pub fn run(&self, candles: &[Candle], grid: &ParameterGrid, top: usize) -> Option<BacktestReport> {
        let results = self.run_grid(candles, grid);
        build_report(results, candles.len(), top)
    }
}

/// Favours a moderate signal count backed by strong patterns.
pub fn composite_score(signal_count: usize, average_strength: f64, ranking: &BacktestScoring) -> f64 {
    if signal_count == 0 {
        return 0.0;
    }

    let count_score = if signal_count < ranking.ideal_min_signals {
        signal_count as f64 / ranking.ideal_min_signals as f64
    } else if signal_count <= ranking.ideal_max_signals {
        1.0
    } else {
        let excess = (signal_count - ranking.ideal_max_signals) as f64;
        (1.0 - excess * ranking.excess_penalty).max(0.0)
    };

    ranking.count_weight * count_score + ranking.strength_weight * average_strength
}

/// Rank grid results. Sorting is stable, so ties keep grid order.
pub fn build_report(
    results: Vec<BacktestResult>,
    candle_count: usize,
    top: usize,
) -> Option<BacktestReport> {
    if results.is_empty() {
        return None;
    }

    let statistics = BacktestStatistics {
        signal_count: RangeStats::from_values(results.iter().map(|r| r.signal_count as f64)),
        average_strength: RangeStats::from_values(results.iter().map(|r| r.average_strength)),
    };

    let mut by_score = results.clone();
    by_score.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
    by_score.truncate(top.max(1));

    // min_by keeps the first of equal elements
    let best_by_strength = results
        .iter()
        .min_by(|a, b| b.average_strength.total_cmp(&a.average_strength))?
        .clone();
    let most_sensitive = results
        .iter()
        .min_by(|a, b| b.signal_count.cmp(&a.signal_count))?
        .clone();
    let least_sensitive = results
        .iter()
        .min_by(|a, b| a.signal_count.cmp(&b.signal_count))?
        .clone();

    Some(BacktestReport {
        total_tests: results.len(),
        candle_count,
        statistics,
        best_by_score: by_score,
        best_by_strength,
        most_sensitive,
        least_sensitive,
        all_results: results,
        created_at: Utc::now(),
    })
}

fn describe(result: &BacktestResult) -> String {
    let p = &result.parameters;
    format!(
        "MIN_REVERSAL_THRESHOLD={} SWING_WINDOW_SIZE={} MIN_STRENGTH={} | signals {} | avg strength {:.3} | score {:.3}",
        p.min_reversal_threshold(),
        p.window_size(),
        p.min_strength(),
        result.signal_count,
        result.average_strength,
        result.composite_score
    )
}

/// Plain-text summary for the terminal
pub fn render_report(report: &BacktestReport) -> String {
    let stats = &report.statistics;
    let mut lines = vec![
        format!(
            "Backtest: {} combinations over {} candles",
            report.total_tests, report.candle_count
        ),
        format!(
            "Signal count: min {:.0}, max {:.0}, mean {:.1}",
            stats.signal_count.min, stats.signal_count.max, stats.signal_count.mean
        ),
        format!(
            "Average strength: min {:.3}, max {:.3}, mean {:.3}",
            stats.average_strength.min, stats.average_strength.max, stats.average_strength.mean
        ),
        String::new(),
        "Best by composite score:".to_string(),
    ];

    for (rank, result) in report.best_by_score.iter().enumerate() {
        lines.push(format!("  {}. {}", rank + 1, describe(result)));
    }

    lines.push(String::new());
    lines.push(format!("Best by strength: {}", describe(&report.best_by_strength)));
    lines.push(format!("Most sensitive:   {}", describe(&report.most_sensitive)));
    lines.push(format!("Least sensitive:  {}", describe(&report.least_sensitive)));

    lines.join("\n")
}
