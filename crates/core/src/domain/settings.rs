use serde::{Deserialize, Serialize};

use crate::errors::AssociationError;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A century of order history.
pub const MAX_TIME_WINDOW_DAYS: u32 = 36_500;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub frequency: f64,
    pub recency: f64,
    pub value: f64,
}

pub const DEFAULT_WEIGHTS: ScoringWeights =
    ScoringWeights { frequency: 0.5, recency: 0.3, value: 0.2 };

impl Default for ScoringWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.frequency + self.recency + self.value
    }
}

/// Immutable snapshot of the calculation settings for one run or one query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationSettings {
    pub time_window_days: u32,
    pub min_cooccurrence: u32,
    pub min_score: f64,
    pub max_recommendations: usize,
    pub fallback_to_related_products: bool,
    pub weights: ScoringWeights,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            time_window_days: 90,
            min_cooccurrence: 3,
            min_score: 0.1,
            max_recommendations: 5,
            fallback_to_related_products: true,
            weights: DEFAULT_WEIGHTS,
        }
    }
}

impl CalculationSettings {
    pub fn validate(&self) -> Result<(), AssociationError> {
        let weights = [
            ("frequency", self.weights.frequency),
            ("recency", self.weights.recency),
            ("value", self.weights.value),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(AssociationError::InvalidSettings(format!(
                    "{name} weight must be a non-negative number, got {weight}"
                )));
            }
        }

        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AssociationError::InvalidSettings(format!(
                "scoring weights must sum to 1.0, got {sum:.6}"
            )));
        }

        if self.time_window_days == 0 {
            return Err(AssociationError::InvalidSettings(
                "time_window_days must be greater than zero".to_string(),
            ));
        }

        if self.time_window_days > MAX_TIME_WINDOW_DAYS {
            return Err(AssociationError::InvalidSettings(format!(
                "time_window_days must be at most {MAX_TIME_WINDOW_DAYS}, got {}",
                self.time_window_days
            )));
        }

        if self.min_cooccurrence == 0 {
            return Err(AssociationError::InvalidSettings(
                "min_cooccurrence must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(AssociationError::InvalidSettings(
                "min_score must be in range 0.0..=1.0".to_string(),
            ));
        }

        if self.max_recommendations == 0 {
            return Err(AssociationError::InvalidSettings(
                "max_recommendations must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
