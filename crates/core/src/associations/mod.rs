//! Product association engine
//!
//! Mines completed orders for products bought together, scores each directed
//! pair on frequency, recency, and order value, and serves ranked
//! "frequently bought together" recommendations from the persisted table.

#[cfg(test)]
pub(crate) mod fakes;
mod matrix;
mod pipeline;
mod ports;
mod recommend;
mod scoring;

pub use matrix::{CooccurrenceMatrix, CooccurrenceMatrixBuilder, PairKey, ProductPair};
pub use pipeline::{AssociationCalculationPipeline, CalculationOutcome, PipelineRunSummary};
pub use ports::{
    AssociationStore, BundleClassifier, CalculationSettingsStore, OrderCorpusReader,
    RelatedProductsSource,
};
pub use recommend::{DisplayContext, RecommendationQueryService};
pub use scoring::{frequency_score, lift, value_score, ScoringEngine, UNIFORM_VALUE_SCORE};
