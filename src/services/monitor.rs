use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::business_logic::candle_store::MergeStats;
use crate::business_logic::patterns::Pattern;
use crate::business_logic::reversal::{ReversalDetector, ReversalSignal, ReversalState};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::reversal::MonitorStatus;
use crate::services::hyperliquid::MarketDataSource;
use crate::services::notifier::{
    format_timestamp, render_signal, render_test_message, Notifier, SignalContext,
};
use crate::services::persistence::{self, DataPaths, HistoryEntry, MonitorLock};
use crate::services::status::SharedStatus;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub symbol: String,
    pub interval: String,
    pub fetch_count: usize,
    pub window_hours: u64,
    pub check_interval: Duration,
    pub lock_stale: Duration,
}

impl From<&AppConfig> for MonitorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            interval: config.interval.clone(),
            fetch_count: config.fetch_count,
            window_hours: config.window_hours,
            check_interval: config.check_interval,
            lock_stale: config.lock_stale,
        }
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub symbol: String,
    pub fetched: usize,
    pub merge: MergeStats,
    pub candle_count: usize,
    pub latest_candle: Option<Candle>,
    pub swing_count: usize,
    pub latest_pattern: Option<Pattern>,
    pub state: ReversalState,
    pub signal: Option<ReversalSignal>,
    /// Rendered notification text for `signal`
    pub message: Option<String>,
    /// `Some(false)` when a signal was produced but delivery failed
    pub delivered: Option<bool>,
}

impl CycleReport {
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!(
                "{}: {} candles in window ({} fetched, {} new, {} replaced, {} rejected, {} pruned)",
                self.symbol,
                self.candle_count,
                self.fetched,
                self.merge.added,
                self.merge.replaced,
                self.merge.rejected,
                self.merge.pruned
            ),
            build_summary(
                &self.symbol,
                &self.state,
                self.latest_pattern.as_ref(),
                self.latest_candle.as_ref(),
            ),
            format!("Swing points: {}", self.swing_count),
        ];

        match (&self.message, self.delivered) {
            (Some(message), Some(false)) => {
                lines.push(String::new());
                lines.push(message.clone());
                lines.push("(notification delivery failed)".to_string());
            }
            (Some(message), _) => {
                lines.push(String::new());
                lines.push(message.clone());
            }
            (None, _) => lines.push("No reversal this cycle.".to_string()),
        }

        lines.join("\n")
    }
}

/// Poll, merge, detect and notify for a single symbol
pub struct MonitorService {
    source: Arc<dyn MarketDataSource>,
    notifier: Arc<dyn Notifier>,
    detector: ReversalDetector,
    paths: DataPaths,
    settings: MonitorSettings,
    shared_state: Option<SharedStatus>,
}

impl MonitorService {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        notifier: Arc<dyn Notifier>,
        detector: ReversalDetector,
        paths: DataPaths,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            detector,
            paths,
            settings,
            shared_state: None,
        }
    }

    /// Publish a status snapshot after every cycle
    pub fn with_shared_state(mut self, shared_state: SharedStatus) -> Self {
        self.shared_state = Some(shared_state);
        self
    }

    /// One cycle: lock, load, fetch, merge, persist, detect, save state,
    /// record history, notify. A failed fetch leaves every file untouched.
    pub async fn run_once(&self) -> Result<CycleReport, AppError> {
        let symbol = &self.settings.symbol;
        let _lock = MonitorLock::acquire(&self.paths.lock(), self.settings.lock_stale)?;

        let mut store = persistence::load_store(&self.paths.snapshot(), self.settings.window_hours)
            .map_err(storage_error)?;
        let state = persistence::load_state(&self.paths.state());

        let fetched = self
            .source
            .fetch(symbol, &self.settings.interval, self.settings.fetch_count)
            .await?;

        let merge = store.merge(&fetched);
        tracing::info!(
            "[{}] merged {} candles: {} new, {} replaced, {} rejected, {} pruned ({} in window)",
            symbol,
            fetched.len(),
            merge.added,
            merge.replaced,
            merge.rejected,
            merge.pruned,
            store.len()
        );
        persistence::persist_store(
            &self.paths.snapshot(),
            &store,
            symbol,
            &self.settings.interval,
        )
        .map_err(storage_error)?;

        let evaluation = self.detector.evaluate(store.candles(), state);
        persistence::save_state(&self.paths.state(), &evaluation.state).map_err(storage_error)?;

        let (message, delivered) = match &evaluation.signal {
            Some(signal) => {
                let context = SignalContext {
                    swings: &evaluation.swings,
                    candles: store.candles(),
                    window_hours: self.settings.window_hours,
                };
                let message = render_signal(symbol, signal, &context);
                let delivered = self.handle_signal(signal, &message).await;
                (Some(message), Some(delivered))
            }
            None => (None, None),
        };

        let report = CycleReport {
            symbol: symbol.clone(),
            fetched: fetched.len(),
            merge,
            candle_count: store.len(),
            latest_candle: store.latest().cloned(),
            swing_count: evaluation.swings.len(),
            latest_pattern: evaluation.latest_pattern,
            state: evaluation.state,
            signal: evaluation.signal,
            message,
            delivered,
        };

        if let Some(shared) = &self.shared_state {
            // A quiet cycle keeps the last published signal
            let last_signal = match &report.signal {
                Some(signal) => Some(signal.clone()),
                None => shared
                    .status
                    .read()
                    .await
                    .as_ref()
                    .and_then(|status| status.last_signal.clone()),
            };
            shared
                .publish(
                    self.status_from(&report, last_signal),
                    Some(store.candles().to_vec()),
                )
                .await;
        }

        Ok(report)
    }

    /// Record the signal, then try to deliver it. Returns whether delivery succeeded.
    async fn handle_signal(&self, signal: &ReversalSignal, message: &str) -> bool {
        let symbol = &self.settings.symbol;
        tracing::warn!(
            "[{}] {:?} reversal at {} (confidence {:.1}%)",
            symbol,
            signal.signal_type,
            format_timestamp(signal.timestamp),
            signal.confidence * 100.0
        );

        if let Err(err) = persistence::append_history(
            &self.paths.history(),
            HistoryEntry::from_signal(symbol, signal),
        ) {
            tracing::error!("[{}] failed to record reversal history: {:#}", symbol, err);
        }

        match self.notifier.send_text(message).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("[{}] notification delivery failed: {}", symbol, err);
                false
            }
        }
    }

    /// Repeat [`run_once`](Self::run_once) every `check_interval`; errors are logged, not fatal.
    pub async fn run(&self) {
        let mut ticker = interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.run_once().await {
                Ok(report) => {
                    if report.signal.is_none() {
                        tracing::info!(
                            "[{}] cycle done, state {}",
                            report.symbol,
                            state_label(&report.state)
                        );
                    }
                }
                Err(err) => {
                    tracing::error!("[{}] cycle failed: {}", self.settings.symbol, err);
                    self.publish_error(&err).await;
                }
            }
        }
    }

    /// Fetch once and push a test message through the notifier.
    pub async fn check_connectivity(&self) -> Result<String, AppError> {
        let candles = self
            .source
            .fetch(
                &self.settings.symbol,
                &self.settings.interval,
                self.settings.fetch_count,
            )
            .await?;
        let text = render_test_message(
            &self.settings.symbol,
            candles.len(),
            candles.iter().max_by_key(|c| c.timestamp).map(|c| c.close),
        );
        self.notifier.send_text(&text).await?;
        Ok(text)
    }

    async fn publish_error(&self, err: &AppError) {
        let Some(shared) = &self.shared_state else {
            return;
        };

        let previous = shared.status.read().await.clone();
        let status = match previous {
            Some(mut status) => {
                status.last_error = Some(err.to_string());
                status.last_run_ms = now_ms();
                status
            }
            None => MonitorStatus {
                symbol: self.settings.symbol.clone(),
                interval: self.settings.interval.clone(),
                state: state_label(&ReversalState::default()),
                candle_count: 0,
                latest_close: None,
                latest_candle_time: None,
                swing_count: 0,
                latest_pattern_kind: None,
                latest_pattern_strength: None,
                pattern_low: None,
                pattern_high: None,
                last_signal: None,
                signal_count: 0,
                last_run_ms: now_ms(),
                last_error: Some(err.to_string()),
                summary: format!("{}: waiting for the first successful cycle.", self.settings.symbol),
            },
        };
        shared.publish(status, None).await;
    }

    fn status_from(
        &self,
        report: &CycleReport,
        last_signal: Option<ReversalSignal>,
    ) -> MonitorStatus {
        let pattern = report.latest_pattern.as_ref();
        MonitorStatus {
            symbol: report.symbol.clone(),
            interval: self.settings.interval.clone(),
            state: state_label(&report.state),
            candle_count: report.candle_count,
            latest_close: report.latest_candle.as_ref().map(|c| c.close),
            latest_candle_time: report.latest_candle.as_ref().map(|c| c.timestamp),
            swing_count: report.swing_count,
            latest_pattern_kind: pattern.map(|p| p.kind.into()),
            latest_pattern_strength: pattern.map(|p| p.strength),
            pattern_low: pattern.map(|p| p.low_price()),
            pattern_high: pattern.map(|p| p.high_price()),
            last_signal,
            signal_count: report.state.signal_count,
            last_run_ms: now_ms(),
            last_error: None,
            summary: build_summary(
                &report.symbol,
                &report.state,
                pattern,
                report.latest_candle.as_ref(),
            ),
        }
    }
}

fn storage_error(err: anyhow::Error) -> AppError {
    AppError::Storage(format!("{err:#}"))
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

fn state_label(state: &ReversalState) -> String {
    state
        .last_pattern_kind
        .map(String::from)
        .unwrap_or_else(|| "NONE".to_string())
}

fn build_summary(
    symbol: &str,
    state: &ReversalState,
    latest_pattern: Option<&Pattern>,
    latest_candle: Option<&Candle>,
) -> String {
    let Some(candle) = latest_candle else {
        return format!("{symbol}: no candles yet.");
    };
    let price = format_price(candle.close);

    match (state.last_pattern_kind, latest_pattern) {
        (None, _) => format!("{symbol}: ${price}, no qualifying N-pattern yet."),
        (Some(kind), Some(pattern)) => format!(
            "{symbol}: ${price}, {} N-pattern dominant (latest {} between ${} and ${}, strength {:.2}).",
            String::from(kind).to_lowercase(),
            String::from(pattern.kind).to_lowercase(),
            format_price(pattern.low_price()),
            format_price(pattern.high_price()),
            pattern.strength
        ),
        (Some(kind), None) => format!(
            "{symbol}: ${price}, {} N-pattern dominant; no qualifying pattern in the current window.",
            String::from(kind).to_lowercase()
        ),
    }
}

fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::config::{DetectorParams, ScoringConfig};
    use crate::business_logic::fixtures::zigzag_candles;
    use crate::business_logic::patterns::PatternKind;
    use crate::business_logic::reversal::SignalType;
    use crate::services::status::new_shared_status;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Falling N: H100, L97, H99
    const FALLING: [f64; 5] = [98.0, 100.0, 97.0, 99.0, 96.5];
    /// Same prefix, then a rising N: L96.5, H99.5, L97.5
    const FALLING_THEN_RISING: [f64; 8] = [98.0, 100.0, 97.0, 99.0, 96.5, 99.5, 97.5, 98.5];

    struct QueuedSource {
        batches: Mutex<VecDeque<Vec<Candle>>>,
    }

    impl QueuedSource {
        fn new(batches: Vec<Vec<Candle>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
            }
        }
    }

    #[async_trait]
    impl MarketDataSource for QueuedSource {
        async fn fetch(&self, _: &str, _: &str, _: usize) -> Result<Vec<Candle>, AppError> {
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::Upstream("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, text: &str) -> Result<(), AppError> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(AppError::Delivery("webhook returned 500".to_string()));
            }
            Ok(())
        }
    }

    fn make_service(
        dir: &TempDir,
        batches: Vec<Vec<Candle>>,
        notifier: Arc<RecordingNotifier>,
    ) -> MonitorService {
        let settings = MonitorSettings {
            symbol: "PAXG".to_string(),
            interval: "5m".to_string(),
            fetch_count: 576,
            window_hours: 48,
            check_interval: Duration::from_secs(300),
            lock_stale: Duration::from_secs(900),
        };
        MonitorService::new(
            Arc::new(QueuedSource::new(batches)),
            notifier,
            ReversalDetector::new(DetectorParams::default(), ScoringConfig::default()),
            DataPaths::new(dir.path()),
            settings,
        )
    }

    fn batches() -> Vec<Vec<Candle>> {
        vec![
            zigzag_candles(&FALLING, 3),
            zigzag_candles(&FALLING_THEN_RISING, 3),
        ]
    }

    #[tokio::test]
    async fn first_cycle_adopts_then_flip_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = make_service(&dir, batches(), notifier.clone());

        let first = service.run_once().await.unwrap();
        assert!(first.signal.is_none());
        assert_eq!(first.state.last_pattern_kind, Some(PatternKind::Falling));
        assert!(notifier.sent.lock().unwrap().is_empty());

        let second = service.run_once().await.unwrap();
        let signal = second.signal.as_ref().unwrap();
        assert_eq!(signal.signal_type, SignalType::Bullish);
        assert_eq!(second.delivered, Some(true));
        assert_eq!(second.merge.replaced, first.candle_count);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("FALLING -> RISING"));
        assert!(sent[0].contains("Recent swing points:"));
        assert!(sent[0].contains(&format!("Candles used: {}", second.candle_count)));
        assert_eq!(second.message.as_deref(), Some(sent[0].as_str()));

        let saved = persistence::load_state(&DataPaths::new(dir.path()).state());
        assert_eq!(saved.last_pattern_kind, Some(PatternKind::Rising));
        assert_eq!(saved.signal_count, 1);
        let history = persistence::load_history(&DataPaths::new(dir.path()).history()).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_leaves_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let service = make_service(
            &dir,
            vec![zigzag_candles(&FALLING, 3)],
            Arc::new(RecordingNotifier::default()),
        );

        service.run_once().await.unwrap();
        let snapshot_before = std::fs::read(paths.snapshot()).unwrap();
        let state_before = std::fs::read(paths.state()).unwrap();

        let result = service.run_once().await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(std::fs::read(paths.snapshot()).unwrap(), snapshot_before);
        assert_eq!(std::fs::read(paths.state()).unwrap(), state_before);
        assert!(!paths.lock().exists());
    }

    #[tokio::test]
    async fn delivery_failure_still_saves_state() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let service = make_service(&dir, batches(), notifier);

        service.run_once().await.unwrap();
        let report = service.run_once().await.unwrap();

        assert!(report.signal.is_some());
        assert_eq!(report.delivered, Some(false));
        let saved = persistence::load_state(&DataPaths::new(dir.path()).state());
        assert_eq!(saved.last_pattern_kind, Some(PatternKind::Rising));
        assert!(report.render().contains("delivery failed"));
    }

    #[tokio::test]
    async fn held_lock_rejects_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let service = make_service(&dir, batches(), Arc::new(RecordingNotifier::default()));

        let _held = MonitorLock::acquire(&paths.lock(), Duration::from_secs(900)).unwrap();
        assert!(matches!(service.run_once().await, Err(AppError::Locked(_))));
    }

    #[tokio::test]
    async fn cycle_publishes_status() {
        let dir = tempfile::tempdir().unwrap();
        let shared = new_shared_status();
        let service = make_service(&dir, batches(), Arc::new(RecordingNotifier::default()))
            .with_shared_state(shared.clone());
        let mut rx = shared.broadcaster.subscribe();

        service.run_once().await.unwrap();

        let status = shared.status.read().await.clone().unwrap();
        assert_eq!(status.state, "FALLING");
        assert_eq!(status.latest_pattern_kind.as_deref(), Some("FALLING"));
        assert_eq!(status.pattern_high, Some(100.0));
        assert_eq!(shared.candles.read().await.len(), status.candle_count);
        assert_eq!(rx.recv().await.unwrap().status.symbol, "PAXG");
    }

    #[tokio::test]
    async fn quiet_cycle_keeps_last_signal() {
        let dir = tempfile::tempdir().unwrap();
        let shared = new_shared_status();
        let mut batches = batches();
        batches.push(zigzag_candles(&FALLING_THEN_RISING, 3));
        let service = make_service(&dir, batches, Arc::new(RecordingNotifier::default()))
            .with_shared_state(shared.clone());

        service.run_once().await.unwrap();
        let flip = service.run_once().await.unwrap();
        let quiet = service.run_once().await.unwrap();
        assert!(flip.signal.is_some());
        assert!(quiet.signal.is_none());

        let status = shared.status.read().await.clone().unwrap();
        assert_eq!(status.signal_count, 1);
        let last_signal = status.last_signal.unwrap();
        assert_eq!(last_signal.signal_type, SignalType::Bullish);
        assert_eq!(Some(last_signal), flip.signal);
    }

    #[tokio::test]
    async fn connectivity_check_sends_test_message() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = make_service(&dir, batches(), notifier.clone());

        let text = service.check_connectivity().await.unwrap();
        assert!(text.contains("PAXG"));
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn summary_mentions_dominant_pattern() {
        let candles = zigzag_candles(&FALLING, 3);
        let state = ReversalState {
            last_pattern_kind: Some(PatternKind::Falling),
            ..ReversalState::default()
        };
        let summary = build_summary("PAXG", &state, None, candles.last());
        assert!(summary.contains("falling N-pattern dominant"));
        assert_eq!(
            build_summary("PAXG", &ReversalState::default(), None, None),
            "PAXG: no candles yet."
        );
    }
}
