use std::collections::{BTreeMap, HashSet};

use crate::models::candle::Candle;

pub const MS_PER_HOUR: u64 = 3_600_000;

/// Bookkeeping for one merge, used for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub replaced: usize,
    pub rejected: usize,
    pub pruned: usize,
}

/// Rolling window of candles: ascending, unique by timestamp, at most
/// `window_hours` behind the latest candle.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleStore {
    window_hours: u64,
    candles: Vec<Candle>,
}

impl CandleStore {
    pub fn new(window_hours: u64) -> Self {
        Self {
            window_hours,
            candles: Vec::new(),
        }
    }

    /// Build a store from records of unknown quality (e.g. a loaded snapshot)
    pub fn from_candles(window_hours: u64, candles: &[Candle]) -> (Self, MergeStats) {
        let mut store = Self::new(window_hours);
        let stats = store.merge(candles);
        (store, stats)
    }

    /// Union `incoming` into the store; incoming wins on timestamp collision.
    pub fn merge(&mut self, incoming: &[Candle]) -> MergeStats {
        let (candles, stats) = merge_candles(&self.candles, incoming, self.window_hours);
        self.candles = candles;
        stats
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn window_hours(&self) -> u64 {
        self.window_hours
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

pub fn merge_candles(
    existing: &[Candle],
    incoming: &[Candle],
    window_hours: u64,
) -> (Vec<Candle>, MergeStats) {
    let mut stats = MergeStats::default();
    let mut by_time: BTreeMap<u64, Candle> = BTreeMap::new();

    for candle in existing.iter().chain(incoming.iter()) {
        if let Err(err) = candle.validate() {
            tracing::warn!("Dropping candle: {}", err);
            stats.rejected += 1;
            continue;
        }
        by_time.insert(candle.timestamp, candle.clone());
    }

    // Classify incoming against what existed before the merge
    let existing_times: HashSet<u64> =
        existing.iter().map(|c| c.timestamp).collect();
    let mut seen_incoming = HashSet::new();
    for candle in incoming {
        if candle.validate().is_err() || !seen_incoming.insert(candle.timestamp) {
            continue;
        }
        if existing_times.contains(&candle.timestamp) {
            stats.replaced += 1;
        } else {
            stats.added += 1;
        }
    }

    let Some(&latest) = by_time.keys().next_back() else {
        return (Vec::new(), stats);
    };

    let cutoff = latest.saturating_sub(window_hours.saturating_mul(MS_PER_HOUR));
    let before = by_time.len();
    let retained = by_time.split_off(&cutoff);
    stats.pruned = before - retained.len();

    (retained.into_values().collect(), stats)
}
