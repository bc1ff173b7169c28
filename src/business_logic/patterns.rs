use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::business_logic::config::{DetectorParams, ScoringConfig};
use crate::business_logic::swings::{SwingKind, SwingPoint};

const MAGNITUDE_WEIGHT: f64 = 0.7;
const CONSISTENCY_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternKind {
    /// LOW, HIGH, higher LOW
    Rising,
    /// HIGH, LOW, lower HIGH
    Falling,
}

impl From<PatternKind> for String {
    fn from(kind: PatternKind) -> Self {
        match kind {
            PatternKind::Rising => "RISING".to_string(),
            PatternKind::Falling => "FALLING".to_string(),
        }
    }
}

/// Three alternating swing points forming an N (or mirrored N)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Pattern {
    pub kind: PatternKind,
    pub points: [SwingPoint; 3],
    /// Blend of magnitude and middle-leg consistency, in [0, 1]
    pub strength: f64,
}

impl Pattern {
    /// Signed fractional change from the first to the last point
    pub fn magnitude(&self) -> f64 {
        let [p0, _, p2] = &self.points;
        (p2.price - p0.price) / p0.price
    }

    pub fn end_price(&self) -> f64 {
        self.points[2].price
    }

    pub fn end_timestamp(&self) -> u64 {
        self.points[2].timestamp
    }

    /// Lowest point of the N
    pub fn low_price(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.price)
            .fold(f64::INFINITY, f64::min)
    }

    /// Highest point of the N
    pub fn high_price(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.price)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Labels consecutive swing triples and keeps those strong enough
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    min_strength: f64,
    reference_scale: f64,
    confirm_middle_leg: bool,
}

impl PatternClassifier {
    pub fn new(params: &DetectorParams, scoring: &ScoringConfig) -> Self {
        Self {
            min_strength: params.min_strength(),
            reference_scale: scoring.reference_scale(params),
            confirm_middle_leg: scoring.confirm_middle_leg,
        }
    }

    /// All qualifying patterns, in chronological order
    pub fn classify(&self, swings: &[SwingPoint]) -> Vec<Pattern> {
        if swings.len() < 3 {
            return Vec::new();
        }

        let mut patterns = Vec::new();
        for (k, triple) in swings.windows(3).enumerate() {
            let Some(kind) = classify_triple(&triple[0], &triple[1], &triple[2]) else {
                continue;
            };

            // Needs five swings of history before the middle leg is checked
            if self.confirm_middle_leg && k >= 2 && !middle_leg_extends(kind, &swings[k - 1], &triple[1]) {
                continue;
            }

            let points = [triple[0].clone(), triple[1].clone(), triple[2].clone()];
            let strength = pattern_strength(&points, self.reference_scale);
            if strength < self.min_strength {
                tracing::trace!(
                    "Discarding {:?} pattern ending at {} (strength {:.3} < {:.3})",
                    kind,
                    triple[2].timestamp,
                    strength,
                    self.min_strength
                );
                continue;
            }

            patterns.push(Pattern {
                kind,
                points,
                strength,
            });
        }

        patterns
    }

    /// The most recent qualifying pattern, if any
    pub fn latest(&self, swings: &[SwingPoint]) -> Option<Pattern> {
        self.classify(swings).pop()
    }
}

pub fn classify_triple(p0: &SwingPoint, p1: &SwingPoint, p2: &SwingPoint) -> Option<PatternKind> {
    match (p0.kind, p1.kind, p2.kind) {
        (SwingKind::Low, SwingKind::High, SwingKind::Low) if p2.price > p0.price => {
            Some(PatternKind::Rising)
        }
        (SwingKind::High, SwingKind::Low, SwingKind::High) if p2.price < p0.price => {
            Some(PatternKind::Falling)
        }
        _ => None,
    }
}

/// Higher high for a rising N, lower low for a falling N
fn middle_leg_extends(kind: PatternKind, previous: &SwingPoint, middle: &SwingPoint) -> bool {
    match kind {
        PatternKind::Rising => middle.price > previous.price,
        PatternKind::Falling => middle.price < previous.price,
    }
}

pub fn pattern_strength(points: &[SwingPoint; 3], reference_scale: f64) -> f64 {
    let strength = MAGNITUDE_WEIGHT * magnitude_score(points, reference_scale)
        + CONSISTENCY_WEIGHT * consistency_score(points);
    strength.clamp(0.0, 1.0)
}

fn magnitude_score(points: &[SwingPoint; 3], reference_scale: f64) -> f64 {
    let [p0, _, p2] = points;
    let change = (p2.price - p0.price).abs() / p0.price;
    (change / reference_scale).min(1.0)
}

/// Shallower leg over deeper leg: near 0 when the middle point barely
/// clears one neighbour.
fn consistency_score(points: &[SwingPoint; 3]) -> f64 {
    let [p0, p1, p2] = points;
    let first_leg = (p1.price - p0.price).abs();
    let second_leg = (p1.price - p2.price).abs();
    let deeper = first_leg.max(second_leg);
    if deeper == 0.0 {
        return 0.0;
    }
    first_leg.min(second_leg) / deeper
}
