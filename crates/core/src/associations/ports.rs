//! Collaborators the engine talks to. SQL implementations live in `copurchase-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::association::ProductAssociation;
use crate::domain::order::OrderRecord;
use crate::domain::product::{ChannelId, ProductId};
use crate::domain::settings::CalculationSettings;
use crate::errors::AssociationError;

use super::pipeline::PipelineRunSummary;

#[async_trait]
pub trait OrderCorpusReader: Send + Sync {
    /// Completed orders for `channel` placed at or after `since`, lines resolved
    /// to parent products with bundle sub-component lines removed.
    async fn load_orders(
        &self,
        channel: &ChannelId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, AssociationError>;

    /// Number of non-bundle order lines carrying `product` within the same corpus.
    async fn count_product_lines(
        &self,
        channel: &ChannelId,
        since: DateTime<Utc>,
        product: &ProductId,
    ) -> Result<u64, AssociationError>;
}

#[async_trait]
pub trait BundleClassifier: Send + Sync {
    async fn is_bundle(&self, product: &ProductId) -> Result<bool, AssociationError>;
}

#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// Atomically supersede every association of `channel` with `associations`.
    /// Readers must observe either the previous or the new complete set.
    async fn replace_channel_associations(
        &self,
        channel: &ChannelId,
        associations: Vec<ProductAssociation>,
    ) -> Result<usize, AssociationError>;

    /// Associations with `source` as source, highest final score first.
    async fn top_associations(
        &self,
        channel: &ChannelId,
        source: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductAssociation>, AssociationError>;

    async fn associations_for_sources(
        &self,
        channel: &ChannelId,
        sources: &[ProductId],
    ) -> Result<Vec<ProductAssociation>, AssociationError>;
}

/// Secondary recommendation source used when associations run short.
#[async_trait]
pub trait RelatedProductsSource: Send + Sync {
    async fn related_products(
        &self,
        channel: &ChannelId,
        product: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductId>, AssociationError>;
}

/// Owner of the persisted settings snapshot and of the run audit trail.
#[async_trait]
pub trait CalculationSettingsStore: Send + Sync {
    /// Create the settings record from `defaults` if none exists, then return
    /// the stored snapshot.
    async fn ensure_defaults(
        &self,
        defaults: &CalculationSettings,
    ) -> Result<CalculationSettings, AssociationError>;

    async fn load(&self) -> Result<Option<CalculationSettings>, AssociationError>;

    async fn save(&self, settings: &CalculationSettings) -> Result<(), AssociationError>;

    async fn record_run(&self, summary: &PipelineRunSummary) -> Result<(), AssociationError>;
}
