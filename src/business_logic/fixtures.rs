//! Candle builders shared by the detection tests.

use crate::models::candle::Candle;

pub const BASE_TIME_MS: u64 = 1_700_000_000_000;
pub const STEP_MS: u64 = 300_000;

/// A flat candle (open = high = low = close) at `price`
pub fn flat_candle(index: usize, price: f64) -> Candle {
    Candle::new(
        BASE_TIME_MS + index as u64 * STEP_MS,
        price,
        price,
        price,
        price,
        1.0,
    )
}

pub fn flat_candles(count: usize, price: f64) -> Vec<Candle> {
    (0..count).map(|i| flat_candle(i, price)).collect()
}

/// Walk linearly between `pivots`, `steps` candles per leg. Every interior
/// pivot lands exactly on a candle and is a strict extremum for any window
/// up to `steps`.
pub fn zigzag_candles(pivots: &[f64], steps: usize) -> Vec<Candle> {
    let mut prices = Vec::new();
    for leg in pivots.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        for s in 0..steps {
            prices.push(from + (to - from) * s as f64 / steps as f64);
        }
    }
    if let Some(&last) = pivots.last() {
        prices.push(last);
    }

    prices
        .into_iter()
        .enumerate()
        .map(|(i, price)| flat_candle(i, price))
        .collect()
}

/// Pivots tracing a downtrend, a turn up, an uptrend and a turn down:
/// exactly two genuine reversals (one bullish, one bearish).
pub const TWO_REVERSAL_PIVOTS: [f64; 15] = [
    101.0, 105.0, 100.0, 103.0, 98.0, 101.0, 99.0, 104.0, 102.0, 106.0, 103.0, 105.0, 100.0,
    102.0, 101.0,
];
