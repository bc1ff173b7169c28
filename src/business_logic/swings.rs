use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::business_logic::config::DetectorParams;
use crate::models::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SwingPoint {
    /// Index into the candle sequence the point was detected in
    pub index: usize,
    pub timestamp: u64,
    /// Candle high for a swing high, candle low for a swing low
    pub price: f64,
    pub kind: SwingKind,
}

/// Extracts alternating swing highs/lows from a candle sequence
#[derive(Debug, Clone)]
pub struct SwingDetector {
    window_size: usize,
    min_reversal_threshold: f64,
}

impl SwingDetector {
    pub fn new(params: &DetectorParams) -> Self {
        Self {
            window_size: params.window_size(),
            min_reversal_threshold: params.min_reversal_threshold(),
        }
    }

    /// Scan `candles` and return a strictly alternating swing sequence.
    /// Too few candles is not an error; the result is just empty.
    pub fn detect(&self, candles: &[Candle]) -> Vec<SwingPoint> {
        let w = self.window_size;
        let n = candles.len();
        if n < 2 * w + 1 {
            tracing::debug!("Not enough candles for swing detection ({} < {})", n, 2 * w + 1);
            return Vec::new();
        }

        let mut swings: Vec<SwingPoint> = Vec::new();

        for i in w..n - w {
            let window = &candles[i - w..=i + w];
            let is_high = is_strict_high(window, w);
            let is_low = is_strict_low(window, w);

            // An outside bar can be both; take the kind that continues the alternation
            let kind = match (is_high, is_low) {
                (true, true) => match swings.last().map(|s| s.kind) {
                    Some(SwingKind::High) => SwingKind::Low,
                    _ => SwingKind::High,
                },
                (true, false) => SwingKind::High,
                (false, true) => SwingKind::Low,
                (false, false) => continue,
            };

            let candle = &candles[i];
            let candidate = SwingPoint {
                index: i,
                timestamp: candle.timestamp,
                price: match kind {
                    SwingKind::High => candle.high,
                    SwingKind::Low => candle.low,
                },
                kind,
            };

            self.collapse(&mut swings, candidate);
        }

        tracing::debug!("Detected {} swing points", swings.len());
        swings
    }

    fn collapse(&self, swings: &mut Vec<SwingPoint>, candidate: SwingPoint) {
        let Some(last) = swings.last_mut() else {
            swings.push(candidate);
            return;
        };

        if candidate.kind == last.kind {
            let more_extreme = match candidate.kind {
                SwingKind::High => candidate.price > last.price,
                SwingKind::Low => candidate.price < last.price,
            };
            if more_extreme {
                *last = candidate;
            }
            return;
        }

        let change = (candidate.price - last.price).abs() / last.price;
        if change >= self.min_reversal_threshold {
            swings.push(candidate);
        }
    }
}

fn is_strict_high(window: &[Candle], center: usize) -> bool {
    let pivot = window[center].high;
    window
        .iter()
        .enumerate()
        .all(|(j, c)| j == center || c.high < pivot)
}

fn is_strict_low(window: &[Candle], center: usize) -> bool {
    let pivot = window[center].low;
    window
        .iter()
        .enumerate()
        .all(|(j, c)| j == center || c.low > pivot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::fixtures::{flat_candles, zigzag_candles};

    fn detector(threshold: f64, window: usize) -> SwingDetector {
        SwingDetector::new(&DetectorParams::new(threshold, window, 0.5).unwrap())
    }

    fn assert_alternating(swings: &[SwingPoint]) {
        for pair in swings.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind, "adjacent swings share a kind");
        }
    }

    #[test]
    fn short_input_is_empty_not_error() {
        let candles = zigzag_candles(&[100.0, 103.0], 1);
        assert!(detector(0.003, 2).detect(&candles).is_empty());
    }

    #[test]
    fn flat_market_has_no_swings() {
        let candles = flat_candles(50, 100.0);
        assert!(detector(0.003, 2).detect(&candles).is_empty());
    }

    #[test]
    fn detects_low_high_low() {
        let candles = zigzag_candles(&[102.0, 100.0, 103.0, 101.0, 102.5], 3);
        let swings = detector(0.003, 2).detect(&candles);

        let kinds: Vec<SwingKind> = swings.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SwingKind::Low, SwingKind::High, SwingKind::Low]);
        assert_eq!(swings[0].price, 100.0);
        assert_eq!(swings[1].price, 103.0);
        assert_eq!(swings[2].price, 101.0);
        assert_eq!(swings[1].timestamp, candles[swings[1].index].timestamp);
    }

    #[test]
    fn small_moves_are_filtered() {
        // 100 -> 100.2 is 0.2%, under the 0.3% threshold
        let candles = zigzag_candles(&[101.0, 100.0, 100.2, 99.0, 101.0], 3);
        let swings = detector(0.003, 2).detect(&candles);

        assert_alternating(&swings);
        assert!(swings.iter().all(|s| s.price != 100.2));
    }

    #[test]
    fn same_kind_keeps_more_extreme() {
        // Second low (99) is deeper; the bounce between is too small to count
        let candles = zigzag_candles(&[101.0, 100.0, 100.1, 99.0, 102.0], 3);
        let swings = detector(0.003, 2).detect(&candles);

        assert_eq!(swings[0].kind, SwingKind::Low);
        assert_eq!(swings[0].price, 99.0);
    }

    #[test]
    fn output_alternates_on_noisy_series() {
        let pivots: Vec<f64> = (0..40)
            .map(|i| 100.0 + ((i * 37) % 11) as f64 * 0.4 - if i % 2 == 0 { 2.0 } else { 0.0 })
            .collect();
        let candles = zigzag_candles(&pivots, 2);

        for window in 1..=4 {
            for threshold in [0.001, 0.003, 0.01] {
                assert_alternating(&detector(threshold, window).detect(&candles));
            }
        }
    }

    #[test]
    fn ties_are_not_swings() {
        let mut candles = zigzag_candles(&[100.0, 103.0, 100.0], 3);
        // Duplicate the peak high on its neighbour
        let peak = candles.iter().position(|c| c.high == 103.0).unwrap();
        candles[peak + 1].high = 103.0;
        let swings = detector(0.003, 2).detect(&candles);

        assert!(swings.iter().all(|s| s.kind != SwingKind::High));
    }
}
