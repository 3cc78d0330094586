//! Scoring of directed product pairs.

use chrono::{DateTime, Utc};

use crate::domain::association::AssociationScore;
use crate::domain::settings::{CalculationSettings, ScoringWeights};

use super::matrix::ProductPair;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Score returned when every order in a pair's history has the same total.
pub const UNIFORM_VALUE_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringEngine {
    weights: ScoringWeights,
    window_days: u32,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights, window_days: u32) -> Self {
        Self { weights, window_days }
    }

    pub fn from_settings(settings: &CalculationSettings) -> Self {
        Self::new(settings.weights, settings.time_window_days)
    }

    /// Score one pair. `target_line_count` is the number of order lines carrying
    /// the target product across the corpus; `None` leaves lift absent.
    pub fn score(
        &self,
        pair: &ProductPair,
        total_orders: usize,
        target_line_count: Option<u64>,
        now: DateTime<Utc>,
    ) -> AssociationScore {
        let frequency = frequency_score(pair.cooccurrence_count, total_orders);
        let recency = self.recency_score(&pair.timestamps, now);
        let value = value_score(&pair.order_totals);

        AssociationScore {
            frequency,
            recency,
            value,
            final_score: self.final_score(frequency, recency, value),
            lift: target_line_count
                .and_then(|lines| lift(pair.cooccurrence_count, lines, total_orders)),
        }
    }

    pub fn final_score(&self, frequency: f64, recency: f64, value: f64) -> f64 {
        self.weights.frequency * frequency
            + self.weights.recency * recency
            + self.weights.value * value
    }

    /// Mean of `e^(-days_ago / window_days)` over every co-occurrence, capped at 1.0.
    pub fn recency_score(&self, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> f64 {
        if timestamps.is_empty() {
            return 0.0;
        }

        let window = f64::from(self.window_days.max(1));
        let total_weight: f64 = timestamps
            .iter()
            .map(|placed_at| {
                let days_ago = (now - *placed_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
                (-days_ago / window).exp()
            })
            .sum();

        (total_weight / timestamps.len() as f64).min(1.0)
    }
}

/// `count / total_orders`, capped (not rescaled) at 1.0.
pub fn frequency_score(cooccurrence_count: u32, total_orders: usize) -> f64 {
    if total_orders == 0 {
        return 0.0;
    }
    (f64::from(cooccurrence_count) / total_orders as f64).min(1.0)
}

/// Average order total, min-max normalised against the pair's own range.
pub fn value_score(order_totals: &[i64]) -> f64 {
    let (Some(min), Some(max)) = (order_totals.iter().min(), order_totals.iter().max()) else {
        return UNIFORM_VALUE_SCORE;
    };
    if min == max {
        return UNIFORM_VALUE_SCORE;
    }

    let average = order_totals.iter().map(|total| *total as f64).sum::<f64>()
        / order_totals.len() as f64;
    let (min, max) = (*min as f64, *max as f64);

    ((average - min) / (max - min)).clamp(0.0, 1.0)
}

/// Ratio of confidence to target support. Both share the `total_orders`
/// denominator, so this reduces to `count / target_line_count`.
pub fn lift(cooccurrence_count: u32, target_line_count: u64, total_orders: usize) -> Option<f64> {
    if total_orders == 0 {
        return None;
    }

    let total = total_orders as f64;
    let support = target_line_count as f64 / total;
    if support <= 0.0 {
        return None;
    }

    let confidence = f64::from(cooccurrence_count) / total;
    Some(confidence / support)
}
