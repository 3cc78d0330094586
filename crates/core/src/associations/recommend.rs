//! Read path serving "frequently bought together" rails from persisted associations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use crate::domain::product::{ChannelId, ProductId};
use crate::domain::settings::CalculationSettings;
use crate::errors::AssociationError;

use super::ports::{AssociationStore, BundleClassifier, RelatedProductsSource};

/// Where a recommendation rail is being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayContext {
    pub channel_id: ChannelId,
}

impl DisplayContext {
    pub fn new(channel_id: ChannelId) -> Self {
        Self { channel_id }
    }
}

/// Never surfaces errors: any lookup failure degrades to an empty list.
pub struct RecommendationQueryService {
    store: Arc<dyn AssociationStore>,
    classifier: Arc<dyn BundleClassifier>,
    related: Option<Arc<dyn RelatedProductsSource>>,
}

impl RecommendationQueryService {
    pub fn new(store: Arc<dyn AssociationStore>, classifier: Arc<dyn BundleClassifier>) -> Self {
        Self { store, classifier, related: None }
    }

    pub fn with_related_products(mut self, related: Arc<dyn RelatedProductsSource>) -> Self {
        self.related = Some(related);
        self
    }

    pub async fn recommendations_for_product(
        &self,
        product_id: &ProductId,
        context: &DisplayContext,
        settings: &CalculationSettings,
    ) -> Vec<ProductId> {
        match self.product_recommendations(product_id, context, settings).await {
            Ok(recommendations) => recommendations,
            Err(error) => {
                warn!(
                    event_name = "association.query.degraded",
                    channel_id = %context.channel_id,
                    product_id = %product_id,
                    error_class = error.error_class(),
                    error = %error,
                    "product recommendations unavailable"
                );
                Vec::new()
            }
        }
    }

    pub async fn recommendations_for_cart(
        &self,
        product_ids: &[ProductId],
        context: &DisplayContext,
        settings: &CalculationSettings,
    ) -> Vec<ProductId> {
        match self.cart_recommendations(product_ids, context, settings).await {
            Ok(recommendations) => recommendations,
            Err(error) => {
                warn!(
                    event_name = "association.query.degraded",
                    channel_id = %context.channel_id,
                    cart_size = product_ids.len(),
                    error_class = error.error_class(),
                    error = %error,
                    "cart recommendations unavailable"
                );
                Vec::new()
            }
        }
    }

    async fn product_recommendations(
        &self,
        product_id: &ProductId,
        context: &DisplayContext,
        settings: &CalculationSettings,
    ) -> Result<Vec<ProductId>, AssociationError> {
        let limit = settings.max_recommendations;
        if self.is_bundle(product_id).await? {
            return Ok(Vec::new());
        }

        let associations =
            self.store.top_associations(&context.channel_id, product_id, limit).await?;

        let mut recommendations = Vec::with_capacity(limit);
        for association in associations {
            if !self.is_bundle(&association.target_product_id).await? {
                recommendations.push(association.target_product_id);
            }
        }

        if recommendations.len() < limit && settings.fallback_to_related_products {
            if let Some(related) = &self.related {
                match self
                    .supplement(related.as_ref(), product_id, context, limit, &recommendations)
                    .await
                {
                    Ok(extra) => recommendations.extend(extra),
                    Err(error) => warn!(
                        event_name = "association.query.fallback_failed",
                        channel_id = %context.channel_id,
                        product_id = %product_id,
                        error = %error,
                        "related-products fallback failed; returning primary list"
                    ),
                }
            }
        }

        recommendations.truncate(limit);
        Ok(recommendations)
    }

    /// Ids from the secondary source that fill the remaining slots.
    async fn supplement(
        &self,
        related: &dyn RelatedProductsSource,
        product_id: &ProductId,
        context: &DisplayContext,
        limit: usize,
        existing: &[ProductId],
    ) -> Result<Vec<ProductId>, AssociationError> {
        // Over-fetch so the queried product and ids already shown can be skipped.
        let fetch = limit + existing.len() + 1;
        let candidates = related.related_products(&context.channel_id, product_id, fetch).await?;

        let mut extra = Vec::new();
        for candidate in candidates {
            if existing.len() + extra.len() >= limit {
                break;
            }
            if &candidate == product_id || existing.contains(&candidate) || extra.contains(&candidate)
            {
                continue;
            }
            if self.is_bundle(&candidate).await? {
                continue;
            }
            extra.push(candidate);
        }
        Ok(extra)
    }

    async fn cart_recommendations(
        &self,
        product_ids: &[ProductId],
        context: &DisplayContext,
        settings: &CalculationSettings,
    ) -> Result<Vec<ProductId>, AssociationError> {
        let cart: BTreeSet<&ProductId> = product_ids.iter().collect();
        if cart.is_empty() {
            return Ok(Vec::new());
        }

        let sources: Vec<ProductId> = cart.iter().map(|id| (*id).clone()).collect();
        let associations =
            self.store.associations_for_sources(&context.channel_id, &sources).await?;

        let mut aggregate: BTreeMap<ProductId, f64> = BTreeMap::new();
        for association in associations {
            if cart.contains(&association.target_product_id) {
                continue;
            }
            *aggregate.entry(association.target_product_id).or_insert(0.0) +=
                association.final_score;
        }

        let mut ranked: Vec<(ProductId, f64)> = aggregate.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let limit = settings.max_recommendations;
        let mut recommendations = Vec::with_capacity(limit);
        for (product_id, _) in ranked {
            if recommendations.len() >= limit {
                break;
            }
            if !self.is_bundle(&product_id).await? {
                recommendations.push(product_id);
            }
        }
        Ok(recommendations)
    }

    async fn is_bundle(&self, product_id: &ProductId) -> Result<bool, AssociationError> {
        self.classifier
            .is_bundle(product_id)
            .await
            .map_err(|error| AssociationError::QueryFailed(error.to_string()))
    }
}
