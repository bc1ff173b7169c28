use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::business_logic::config::{DetectorParams, ScoringConfig};
use crate::business_logic::patterns::{Pattern, PatternClassifier, PatternKind};
use crate::business_logic::swings::{SwingDetector, SwingPoint};
use crate::models::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    /// FALLING -> RISING
    Bullish,
    /// RISING -> FALLING
    Bearish,
}

impl From<SignalType> for String {
    fn from(signal_type: SignalType) -> Self {
        match signal_type {
            SignalType::Bullish => "BULLISH".to_string(),
            SignalType::Bearish => "BEARISH".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReversalSignal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub from_pattern_kind: PatternKind,
    pub to_pattern_kind: PatternKind,
    /// Strength of the triggering pattern
    pub confidence: f64,
    /// Signed fractional price change of the triggering pattern
    pub magnitude: f64,
    /// Time of the triggering pattern's last swing point (epoch ms)
    pub timestamp: u64,
    pub triggering_pattern: Pattern,
}

/// Engine state carried across polling runs. Persisted by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReversalState {
    pub last_pattern_kind: Option<PatternKind>,
    /// End time of the last pattern the engine accepted
    pub last_pattern_timestamp: Option<u64>,
    pub last_signal_timestamp: Option<u64>,
    #[serde(default)]
    pub signal_count: u64,
}

/// Flip detector over a stream of qualifying patterns
#[derive(Debug, Clone)]
pub struct ReversalEngine {
    min_reversal_threshold: f64,
}

impl ReversalEngine {
    pub fn new(params: &DetectorParams) -> Self {
        Self {
            min_reversal_threshold: params.min_reversal_threshold(),
        }
    }

    /// Apply one pattern to `state`, returning the next state and any signal.
    pub fn observe(
        &self,
        state: ReversalState,
        pattern: &Pattern,
    ) -> (ReversalState, Option<ReversalSignal>) {
        let pattern_time = pattern.end_timestamp();
        if state
            .last_pattern_timestamp
            .is_some_and(|seen| pattern_time < seen)
        {
            tracing::debug!(
                "Ignoring stale {:?} pattern ending at {} (already saw {:?})",
                pattern.kind,
                pattern_time,
                state.last_pattern_timestamp
            );
            return (state, None);
        }

        let Some(previous) = state.last_pattern_kind else {
            tracing::debug!("First pattern observed: {:?}", pattern.kind);
            let next = ReversalState {
                last_pattern_kind: Some(pattern.kind),
                last_pattern_timestamp: Some(pattern_time),
                ..state
            };
            return (next, None);
        };

        if previous == pattern.kind {
            let next = ReversalState {
                last_pattern_timestamp: Some(pattern_time),
                ..state
            };
            return (next, None);
        }

        let magnitude = pattern.magnitude();
        if magnitude.abs() < self.min_reversal_threshold {
            tracing::debug!(
                "Flip {:?} -> {:?} too small ({:.4} < {:.4})",
                previous,
                pattern.kind,
                magnitude.abs(),
                self.min_reversal_threshold
            );
            return (state, None);
        }

        let signal_type = match pattern.kind {
            PatternKind::Rising => SignalType::Bullish,
            PatternKind::Falling => SignalType::Bearish,
        };

        tracing::info!(
            "{:?} reversal: {:?} -> {:?} (confidence {:.2}, magnitude {:+.4})",
            signal_type,
            previous,
            pattern.kind,
            pattern.strength,
            magnitude
        );

        let signal = ReversalSignal {
            signal_type,
            from_pattern_kind: previous,
            to_pattern_kind: pattern.kind,
            confidence: pattern.strength,
            magnitude,
            timestamp: pattern_time,
            triggering_pattern: pattern.clone(),
        };

        let next = ReversalState {
            last_pattern_kind: Some(pattern.kind),
            last_pattern_timestamp: Some(pattern_time),
            last_signal_timestamp: Some(pattern_time),
            signal_count: state.signal_count + 1,
        };

        (next, Some(signal))
    }
}

/// Result of running the full pipeline over one candle window
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub swings: Vec<SwingPoint>,
    pub latest_pattern: Option<Pattern>,
    pub state: ReversalState,
    pub signal: Option<ReversalSignal>,
}

/// Swing detection, classification and flip detection with one parameter set
#[derive(Debug, Clone)]
pub struct ReversalDetector {
    swings: SwingDetector,
    classifier: PatternClassifier,
    engine: ReversalEngine,
}

impl ReversalDetector {
    pub fn new(params: DetectorParams, scoring: ScoringConfig) -> Self {
        Self {
            swings: SwingDetector::new(&params),
            classifier: PatternClassifier::new(&params, &scoring),
            engine: ReversalEngine::new(&params),
        }
    }

    /// Live mode: only the most recent qualifying pattern drives the engine.
    pub fn evaluate(&self, candles: &[Candle], state: ReversalState) -> Evaluation {
        let swings = self.swings.detect(candles);
        let latest_pattern = self.classifier.latest(&swings);

        let (state, signal) = match &latest_pattern {
            Some(pattern) => self.engine.observe(state, pattern),
            None => {
                tracing::debug!("No qualifying pattern this cycle");
                (state, None)
            }
        };

        Evaluation {
            swings,
            latest_pattern,
            state,
            signal,
        }
    }

    /// Replay mode: every qualifying pattern, oldest first, from a fresh state.
    pub fn replay(&self, candles: &[Candle]) -> Replay {
        let swings = self.swings.detect(candles);
        let patterns = self.classifier.classify(&swings);

        let mut state = ReversalState::default();
        let mut signals = Vec::new();
        for pattern in &patterns {
            let (next, signal) = self.engine.observe(state, pattern);
            state = next;
            signals.extend(signal);
        }

        Replay {
            swing_count: swings.len(),
            pattern_count: patterns.len(),
            signals,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Replay {
    pub swing_count: usize,
    pub pattern_count: usize,
    pub signals: Vec<ReversalSignal>,
}
