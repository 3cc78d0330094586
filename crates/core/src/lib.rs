pub mod associations;
pub mod config;
pub mod domain;
pub mod errors;

pub use associations::{
    AssociationCalculationPipeline, AssociationStore, BundleClassifier, CalculationSettingsStore,
    CooccurrenceMatrixBuilder, DisplayContext, OrderCorpusReader, PipelineRunSummary,
    RecommendationQueryService, RelatedProductsSource, ScoringEngine,
};
pub use domain::association::{AssociationScore, ProductAssociation};
pub use domain::order::{OrderId, OrderLine, OrderRecord};
pub use domain::product::{ChannelId, Product, ProductId};
pub use domain::settings::{CalculationSettings, ScoringWeights};
pub use errors::AssociationError;
