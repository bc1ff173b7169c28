use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::business_logic::backtest::BacktestReport;
use crate::business_logic::candle_store::CandleStore;
use crate::business_logic::patterns::PatternKind;
use crate::business_logic::reversal::{ReversalSignal, ReversalState, SignalType};
use crate::errors::AppError;
use crate::models::candle::{candle_from_value, Candle};

pub const SNAPSHOT_FILE: &str = "candles.json";
pub const STATE_FILE: &str = "reversal_state.json";
pub const HISTORY_FILE: &str = "reversal_history.json";
pub const REPORT_FILE: &str = "backtest_report.json";
pub const LOCK_FILE: &str = "monitor.lock";

/// Entries kept in the reversal history file
pub const HISTORY_LIMIT: usize = 100;

/// File layout under the data directory
#[derive(Debug, Clone)]
pub struct DataPaths {
    dir: PathBuf,
}

impl DataPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn state(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn history(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn report(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    pub fn lock(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub symbol: String,
    pub interval: String,
    pub count: usize,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub updated_at: DateTime<Utc>,
    pub window_hours: u64,
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    metadata: SnapshotMetadata,
    candles: &'a [Candle],
}

/// Records stay untyped so one bad candle cannot fail the whole load
#[derive(Deserialize)]
struct SnapshotIn {
    #[serde(default)]
    candles: Vec<serde_json::Value>,
}

/// Load the candle window. A missing file is an empty store; invalid
/// records are dropped with a warning.
pub fn load_store(path: &Path, window_hours: u64) -> Result<CandleStore> {
    let Some(snapshot) = read_json::<SnapshotIn>(path)? else {
        tracing::info!("No candle snapshot at {}, starting empty", path.display());
        return Ok(CandleStore::new(window_hours));
    };

    let mut candles = Vec::with_capacity(snapshot.candles.len());
    for value in snapshot.candles {
        match candle_from_value(value) {
            Ok(candle) => candles.push(candle),
            Err(err) => tracing::warn!("Skipping stored candle: {}", err),
        }
    }

    let (store, stats) = CandleStore::from_candles(window_hours, &candles);
    tracing::debug!(
        "Loaded {} candles from {} (pruned {})",
        store.len(),
        path.display(),
        stats.pruned
    );
    Ok(store)
}

pub fn persist_store(path: &Path, store: &CandleStore, symbol: &str, interval: &str) -> Result<()> {
    let snapshot = SnapshotOut {
        metadata: SnapshotMetadata {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            count: store.len(),
            start_time: store.first().map(|c| c.timestamp),
            end_time: store.latest().map(|c| c.timestamp),
            updated_at: Utc::now(),
            window_hours: store.window_hours(),
        },
        candles: store.candles(),
    };
    write_json_atomic(path, &snapshot)
}

/// Missing or unreadable state starts fresh: the first pattern is adopted
/// without signalling.
pub fn load_state(path: &Path) -> ReversalState {
    match read_json::<ReversalState>(path) {
        Ok(Some(state)) => state,
        Ok(None) => ReversalState::default(),
        Err(err) => {
            tracing::warn!("Ignoring unreadable reversal state: {:#}", err);
            ReversalState::default()
        }
    }
}

pub fn save_state(path: &Path, state: &ReversalState) -> Result<()> {
    write_json_atomic(path, state)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub symbol: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub from: PatternKind,
    pub to: PatternKind,
    pub trigger_price: f64,
    pub confidence: f64,
    pub magnitude: f64,
    pub timestamp: u64,
}

impl HistoryEntry {
    pub fn from_signal(symbol: &str, signal: &ReversalSignal) -> Self {
        Self {
            recorded_at: Utc::now(),
            symbol: symbol.to_string(),
            signal_type: signal.signal_type,
            from: signal.from_pattern_kind,
            to: signal.to_pattern_kind,
            trigger_price: signal.triggering_pattern.end_price(),
            confidence: signal.confidence,
            magnitude: signal.magnitude,
            timestamp: signal.timestamp,
        }
    }
}

pub fn load_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    Ok(read_json(path)?.unwrap_or_default())
}

/// Append and keep the most recent [`HISTORY_LIMIT`] entries.
pub fn append_history(path: &Path, entry: HistoryEntry) -> Result<Vec<HistoryEntry>> {
    let mut history = match load_history(path) {
        Ok(history) => history,
        Err(err) => {
            tracing::warn!("Resetting unreadable reversal history: {:#}", err);
            Vec::new()
        }
    };

    history.push(entry);
    if history.len() > HISTORY_LIMIT {
        history.drain(..history.len() - HISTORY_LIMIT);
    }

    write_json_atomic(path, &history)?;
    Ok(history)
}

pub fn save_report(path: &Path, report: &BacktestReport) -> Result<()> {
    write_json_atomic(path, report)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).context(format!("Failed to open {}", path.display())),
    };
    let value = serde_json::from_reader(BufReader::new(file))
        .context(format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write to a sibling temp file, then rename over the target.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("json.tmp");
    {
        let file =
            File::create(&tmp).context(format!("Failed to create file: {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .context(format!("Failed to serialize to: {}", tmp.display()))?;
        writer
            .flush()
            .context(format!("Failed to flush: {}", tmp.display()))?;
    }

    std::fs::rename(&tmp, path)
        .context(format!("Failed to move {} into place", path.display()))
}

/// Single-writer guard for a poll cycle. Removed on drop.
#[derive(Debug)]
pub struct MonitorLock {
    path: PathBuf,
}

impl MonitorLock {
    /// Take the lock, replacing one older than `stale_after`.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Self::create(path) {
            Ok(lock) => return Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }

        let age = lock_age(path)?;
        if age < stale_after {
            return Err(AppError::Locked(format!(
                "{} held for {}s",
                path.display(),
                age.as_secs()
            )));
        }

        tracing::warn!(
            "Taking over stale lock {} ({}s old)",
            path.display(),
            age.as_secs()
        );
        std::fs::remove_file(path)?;
        Self::create(path).map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => AppError::Locked(format!("{} was re-taken", path.display())),
            _ => err.into(),
        })
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for MonitorLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), err);
        }
    }
}

fn lock_age(path: &Path) -> Result<Duration, AppError> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::fixtures::zigzag_candles;
    use crate::business_logic::reversal::ReversalEngine;
    use crate::business_logic::{config::DetectorParams, patterns::Pattern};
    use tempfile::TempDir;

    fn paths() -> (TempDir, DataPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().join("data"));
        (dir, paths)
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let (_dir, paths) = paths();
        let store = load_store(&paths.snapshot(), 48).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_round_trip_keeps_metadata() {
        let (_dir, paths) = paths();
        let mut store = CandleStore::new(48);
        store.merge(&zigzag_candles(&[100.0, 103.0, 101.0], 4));

        persist_store(&paths.snapshot(), &store, "PAXG", "5m").unwrap();
        let loaded = load_store(&paths.snapshot(), 48).unwrap();
        assert_eq!(loaded, store);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(paths.snapshot()).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["symbol"], "PAXG");
        assert_eq!(raw["metadata"]["count"], store.len());
        assert_eq!(raw["metadata"]["end_time"], store.latest().unwrap().timestamp);
        assert!(!paths.snapshot().with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_records_are_skipped() {
        let (_dir, paths) = paths();
        std::fs::create_dir_all(paths.dir()).unwrap();
        let body = serde_json::json!({
            "metadata": {},
            "candles": [
                {"timestamp": 1000, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 1.0},
                {"timestamp": 2000, "open": 1.0, "high": 2.0, "close": 1.5, "volume": 1.0},
                {"timestamp": 3000, "open": 1.0, "high": 0.9, "low": 0.5, "close": 1.5, "volume": 1.0},
                {"timestamp": 4000, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 1.0}
            ]
        });
        std::fs::write(paths.snapshot(), body.to_string()).unwrap();

        let store = load_store(&paths.snapshot(), 48).unwrap();
        let times: Vec<u64> = store.candles().iter().map(|c| c.timestamp).collect();
        assert_eq!(times, vec![1000, 4000]);
    }

    #[test]
    fn state_round_trip_and_missing_default() {
        let (_dir, paths) = paths();
        assert_eq!(load_state(&paths.state()), ReversalState::default());

        let state = ReversalState {
            last_pattern_kind: Some(PatternKind::Rising),
            last_pattern_timestamp: Some(42),
            last_signal_timestamp: Some(42),
            signal_count: 3,
        };
        save_state(&paths.state(), &state).unwrap();
        assert_eq!(load_state(&paths.state()), state);
    }

    #[test]
    fn garbage_state_starts_fresh() {
        let (_dir, paths) = paths();
        std::fs::create_dir_all(paths.dir()).unwrap();
        std::fs::write(paths.state(), "not json").unwrap();
        assert_eq!(load_state(&paths.state()), ReversalState::default());
    }

    fn sample_signal() -> ReversalSignal {
        let candles = zigzag_candles(&[102.0, 100.0, 103.0, 101.0, 102.5], 3);
        let params = DetectorParams::default();
        let swings = crate::business_logic::swings::SwingDetector::new(&params).detect(&candles);
        let pattern: Pattern = crate::business_logic::patterns::PatternClassifier::new(
            &params,
            &Default::default(),
        )
        .latest(&swings)
        .unwrap();
        let state = ReversalState {
            last_pattern_kind: Some(PatternKind::Falling),
            ..ReversalState::default()
        };
        ReversalEngine::new(&params).observe(state, &pattern).1.unwrap()
    }

    #[test]
    fn history_is_bounded() {
        let (_dir, paths) = paths();
        let signal = sample_signal();

        for _ in 0..HISTORY_LIMIT + 5 {
            append_history(&paths.history(), HistoryEntry::from_signal("PAXG", &signal)).unwrap();
        }

        let history = load_history(&paths.history()).unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].signal_type, SignalType::Bullish);
        assert_eq!(history[0].trigger_price, 101.0);
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let (_dir, paths) = paths();
        let stale = Duration::from_secs(900);

        let lock = MonitorLock::acquire(&paths.lock(), stale).unwrap();
        assert!(matches!(
            MonitorLock::acquire(&paths.lock(), stale),
            Err(AppError::Locked(_))
        ));

        drop(lock);
        assert!(!paths.lock().exists());
        assert!(MonitorLock::acquire(&paths.lock(), stale).is_ok());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let (_dir, paths) = paths();
        std::fs::create_dir_all(paths.dir()).unwrap();
        std::fs::write(paths.lock(), "12345 leftover").unwrap();

        let lock = MonitorLock::acquire(&paths.lock(), Duration::ZERO);
        assert!(lock.is_ok());
    }
}
