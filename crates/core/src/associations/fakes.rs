//! In-process collaborators for engine tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::association::ProductAssociation;
use crate::domain::order::{OrderId, OrderLine, OrderRecord};
use crate::domain::product::{ChannelId, ProductId};
use crate::errors::AssociationError;

use super::ports::{AssociationStore, BundleClassifier, OrderCorpusReader, RelatedProductsSource};

pub fn order(
    id: &str,
    placed_at: DateTime<Utc>,
    total_minor: Option<i64>,
    products: &[&str],
) -> OrderRecord {
    OrderRecord {
        id: OrderId(id.to_string()),
        placed_at,
        total_minor,
        lines: products
            .iter()
            .map(|product| OrderLine { product_id: ProductId::new(*product), quantity: 1 })
            .collect(),
    }
}

pub fn association(source: &str, target: &str, final_score: f64) -> ProductAssociation {
    ProductAssociation {
        source_product_id: ProductId::new(source),
        target_product_id: ProductId::new(target),
        channel_id: ChannelId::new("web"),
        cooccurrence_count: 5,
        frequency_score: final_score,
        recency_score: final_score,
        value_score: final_score,
        final_score,
        lift: None,
        last_calculated: Utc::now(),
    }
}

pub struct FakeCorpus {
    orders: Option<Vec<OrderRecord>>,
    line_counts: HashMap<ProductId, u64>,
    failing_line_counts: HashSet<ProductId>,
    count_lines: bool,
}

impl FakeCorpus {
    pub fn new(orders: Vec<OrderRecord>) -> Self {
        Self {
            orders: Some(orders),
            line_counts: HashMap::new(),
            failing_line_counts: HashSet::new(),
            count_lines: true,
        }
    }

    pub fn unavailable() -> Self {
        Self { orders: None, ..Self::new(Vec::new()) }
    }

    /// Report zero lines for every product, which leaves lift absent.
    pub fn without_line_counts(mut self) -> Self {
        self.count_lines = false;
        self
    }

    pub fn with_line_count(mut self, product: &str, count: u64) -> Self {
        self.line_counts.insert(ProductId::new(product), count);
        self
    }

    pub fn with_failing_line_count(mut self, product: &str) -> Self {
        self.failing_line_counts.insert(ProductId::new(product));
        self
    }
}

#[async_trait]
impl OrderCorpusReader for FakeCorpus {
    async fn load_orders(
        &self,
        _channel: &ChannelId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, AssociationError> {
        let orders = self
            .orders
            .as_ref()
            .ok_or_else(|| AssociationError::CorpusUnavailable("fake corpus offline".to_owned()))?;
        Ok(orders.iter().filter(|order| order.placed_at >= since).cloned().collect())
    }

    async fn count_product_lines(
        &self,
        _channel: &ChannelId,
        since: DateTime<Utc>,
        product: &ProductId,
    ) -> Result<u64, AssociationError> {
        if self.failing_line_counts.contains(product) {
            return Err(AssociationError::CorpusUnavailable("line count timed out".to_owned()));
        }
        if !self.count_lines {
            return Ok(0);
        }
        if let Some(count) = self.line_counts.get(product) {
            return Ok(*count);
        }

        let orders = self.orders.as_deref().unwrap_or_default();
        let count = orders
            .iter()
            .filter(|order| order.placed_at >= since)
            .flat_map(|order| order.lines.iter())
            .filter(|line| &line.product_id == product)
            .count();
        Ok(count as u64)
    }
}

#[derive(Default)]
pub struct FakeBundleClassifier {
    bundles: HashSet<ProductId>,
    unavailable: bool,
}

impl FakeBundleClassifier {
    pub fn with_bundles(bundles: &[&str]) -> Self {
        Self { bundles: bundles.iter().map(|id| ProductId::new(*id)).collect(), unavailable: false }
    }

    pub fn unavailable() -> Self {
        Self { bundles: HashSet::new(), unavailable: true }
    }
}

#[async_trait]
impl BundleClassifier for FakeBundleClassifier {
    async fn is_bundle(&self, product: &ProductId) -> Result<bool, AssociationError> {
        if self.unavailable {
            return Err(AssociationError::ClassifierUnavailable("fake classifier offline".to_owned()));
        }
        Ok(self.bundles.contains(product))
    }
}

#[derive(Default)]
pub struct FakeAssociationStore {
    rows: RwLock<BTreeMap<ChannelId, Vec<ProductAssociation>>>,
    replace_calls: RwLock<usize>,
    failing: bool,
}

impl FakeAssociationStore {
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub async fn seeded(rows: Vec<ProductAssociation>) -> Self {
        let store = Self::default();
        store.rows.write().await.insert(ChannelId::new("web"), rows);
        store
    }

    pub async fn rows(&self, channel: &ChannelId) -> Vec<ProductAssociation> {
        self.rows.read().await.get(channel).cloned().unwrap_or_default()
    }

    pub async fn pairs(&self, channel: &ChannelId) -> Vec<(ProductId, ProductId)> {
        self.rows(channel)
            .await
            .into_iter()
            .map(|row| (row.source_product_id, row.target_product_id))
            .collect()
    }

    pub async fn replace_calls(&self) -> usize {
        *self.replace_calls.read().await
    }

    fn unavailable(&self) -> Result<(), AssociationError> {
        if self.failing {
            return Err(AssociationError::PersistenceFailed("fake store offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssociationStore for FakeAssociationStore {
    async fn replace_channel_associations(
        &self,
        channel: &ChannelId,
        associations: Vec<ProductAssociation>,
    ) -> Result<usize, AssociationError> {
        *self.replace_calls.write().await += 1;
        self.unavailable()?;
        let written = associations.len();
        self.rows.write().await.insert(channel.clone(), associations);
        Ok(written)
    }

    async fn top_associations(
        &self,
        channel: &ChannelId,
        source: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductAssociation>, AssociationError> {
        self.unavailable().map_err(|error| AssociationError::QueryFailed(error.to_string()))?;
        let mut rows: Vec<_> = self
            .rows(channel)
            .await
            .into_iter()
            .filter(|row| &row.source_product_id == source)
            .collect();
        rows.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn associations_for_sources(
        &self,
        channel: &ChannelId,
        sources: &[ProductId],
    ) -> Result<Vec<ProductAssociation>, AssociationError> {
        self.unavailable().map_err(|error| AssociationError::QueryFailed(error.to_string()))?;
        Ok(self
            .rows(channel)
            .await
            .into_iter()
            .filter(|row| sources.contains(&row.source_product_id))
            .collect())
    }
}

#[derive(Default)]
pub struct FakeRelatedProducts {
    related: HashMap<ProductId, Vec<ProductId>>,
    failing: bool,
}

impl FakeRelatedProducts {
    pub fn with_related(product: &str, related: &[&str]) -> Self {
        let mut source = Self::default();
        source
            .related
            .insert(ProductId::new(product), related.iter().map(|id| ProductId::new(*id)).collect());
        source
    }

    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }
}

#[async_trait]
impl RelatedProductsSource for FakeRelatedProducts {
    async fn related_products(
        &self,
        _channel: &ChannelId,
        product: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductId>, AssociationError> {
        if self.failing {
            return Err(AssociationError::QueryFailed("related products offline".to_owned()));
        }
        Ok(self.related.get(product).map(|ids| ids.iter().take(limit).cloned().collect()).unwrap_or_default())
    }
}
