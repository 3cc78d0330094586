use async_trait::async_trait;

use copurchase_core::associations::RelatedProductsSource;
use copurchase_core::domain::product::{ChannelId, ProductId};
use copurchase_core::errors::AssociationError;

use super::RepositoryError;
use crate::DbPool;

/// Merchandiser-curated relations from `product_relation`. The catalog is
/// shared across channels, so the channel only scopes the call.
pub struct SqlRelatedProductsSource {
    pool: DbPool,
}

impl SqlRelatedProductsSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_related(
        &self,
        product: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductId>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT related_product_id
             FROM product_relation
             WHERE product_id = ?
             ORDER BY position ASC, related_product_id ASC
             LIMIT ?",
        )
        .bind(product.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(ProductId).collect())
    }
}

#[async_trait]
impl RelatedProductsSource for SqlRelatedProductsSource {
    async fn related_products(
        &self,
        _channel: &ChannelId,
        product: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductId>, AssociationError> {
        self.fetch_related(product, limit)
            .await
            .map_err(|error| error.into_association_error(AssociationError::QueryFailed))
    }
}
