use async_trait::async_trait;

use copurchase_core::associations::BundleClassifier;
use copurchase_core::domain::product::ProductId;
use copurchase_core::errors::AssociationError;

use super::RepositoryError;
use crate::DbPool;

/// Reads the catalog `is_bundle` flag. Unknown products are not bundles.
pub struct SqlBundleClassifier {
    pool: DbPool,
}

impl SqlBundleClassifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_flag(&self, product: &ProductId) -> Result<bool, RepositoryError> {
        let flag: Option<bool> = sqlx::query_scalar("SELECT is_bundle FROM product WHERE id = ?")
            .bind(product.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(flag.unwrap_or(false))
    }
}

#[async_trait]
impl BundleClassifier for SqlBundleClassifier {
    async fn is_bundle(&self, product: &ProductId) -> Result<bool, AssociationError> {
        self.fetch_flag(product)
            .await
            .map_err(|error| error.into_association_error(AssociationError::ClassifierUnavailable))
    }
}
