use thiserror::Error;

use crate::domain::product::ProductId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssociationError {
    #[error("order corpus unavailable: {0}")]
    CorpusUnavailable(String),
    #[error("bundle classifier unavailable: {0}")]
    ClassifierUnavailable(String),
    #[error("lift computation failed for target {product_id}: {reason}")]
    LiftComputationFailed { product_id: ProductId, reason: String },
    #[error("association persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("recommendation query failed: {0}")]
    QueryFailed(String),
    #[error("invalid calculation settings: {0}")]
    InvalidSettings(String),
}

impl AssociationError {
    /// Stable label surfaced to operators and the scheduler.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::CorpusUnavailable(_) => "corpus_unavailable",
            Self::ClassifierUnavailable(_) => "classifier_unavailable",
            Self::LiftComputationFailed { .. } => "lift_computation_failed",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::QueryFailed(_) => "query_failed",
            Self::InvalidSettings(_) => "invalid_settings",
        }
    }

    /// Whether this error aborts a pipeline run. Lift failures only drop the
    /// lift value of a single pair; query failures never reach the pipeline.
    pub fn is_fatal_to_run(&self) -> bool {
        !matches!(self, Self::LiftComputationFailed { .. } | Self::QueryFailed(_))
    }
}
