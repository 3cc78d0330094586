use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use copurchase_core::associations::AssociationStore;
use copurchase_core::domain::association::ProductAssociation;
use copurchase_core::domain::product::{ChannelId, ProductId};
use copurchase_core::errors::AssociationError;

use super::{decode_count, decode_error, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const ASSOCIATION_COLUMNS: &str = "channel_id, source_product_id, target_product_id, \
     cooccurrence_count, frequency_score, recency_score, value_score, final_score, lift, \
     last_calculated";

pub struct SqlAssociationStore {
    pool: DbPool,
}

impl SqlAssociationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn replace(
        &self,
        channel: &ChannelId,
        associations: &[ProductAssociation],
    ) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_association WHERE channel_id = ?")
            .bind(channel.as_str())
            .execute(&mut *tx)
            .await?;

        for association in associations {
            sqlx::query(&format!(
                "INSERT INTO product_association ({ASSOCIATION_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(channel.as_str())
            .bind(association.source_product_id.as_str())
            .bind(association.target_product_id.as_str())
            .bind(i64::from(association.cooccurrence_count))
            .bind(association.frequency_score)
            .bind(association.recency_score)
            .bind(association.value_score)
            .bind(association.final_score)
            .bind(association.lift)
            .bind(encode_timestamp(association.last_calculated))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            event_name = "association.store.replaced",
            channel_id = %channel,
            rows = associations.len(),
            "channel association set replaced"
        );
        Ok(associations.len())
    }

    async fn fetch_top(
        &self,
        channel: &ChannelId,
        source: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductAssociation>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {ASSOCIATION_COLUMNS}
             FROM product_association
             WHERE channel_id = ? AND source_product_id = ?
             ORDER BY final_score DESC, target_product_id ASC
             LIMIT ?"
        ))
        .bind(channel.as_str())
        .bind(source.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_association).collect()
    }

    async fn fetch_for_sources(
        &self,
        channel: &ChannelId,
        sources: &[ProductId],
    ) -> Result<Vec<ProductAssociation>, RepositoryError> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {ASSOCIATION_COLUMNS} FROM product_association WHERE channel_id = "
        ));
        builder.push_bind(channel.as_str());
        builder.push(" AND source_product_id IN (");
        let mut separated = builder.separated(", ");
        for source in sources {
            separated.push_bind(source.as_str());
        }
        separated.push_unseparated(")");
        builder.push(" ORDER BY source_product_id ASC, final_score DESC, target_product_id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_association).collect()
    }
}

fn row_to_association(row: &SqliteRow) -> Result<ProductAssociation, RepositoryError> {
    let channel_id: String = row.try_get("channel_id").map_err(decode_error)?;
    let source_product_id: String = row.try_get("source_product_id").map_err(decode_error)?;
    let target_product_id: String = row.try_get("target_product_id").map_err(decode_error)?;
    let cooccurrence_count: i64 = row.try_get("cooccurrence_count").map_err(decode_error)?;
    let frequency_score: f64 = row.try_get("frequency_score").map_err(decode_error)?;
    let recency_score: f64 = row.try_get("recency_score").map_err(decode_error)?;
    let value_score: f64 = row.try_get("value_score").map_err(decode_error)?;
    let final_score: f64 = row.try_get("final_score").map_err(decode_error)?;
    let lift: Option<f64> = row.try_get("lift").map_err(decode_error)?;
    let last_calculated: String = row.try_get("last_calculated").map_err(decode_error)?;

    Ok(ProductAssociation {
        source_product_id: ProductId(source_product_id),
        target_product_id: ProductId(target_product_id),
        channel_id: ChannelId(channel_id),
        cooccurrence_count: decode_count("cooccurrence_count", cooccurrence_count)?,
        frequency_score,
        recency_score,
        value_score,
        final_score,
        lift,
        last_calculated: decode_timestamp("last_calculated", &last_calculated)?,
    })
}

#[async_trait]
impl AssociationStore for SqlAssociationStore {
    async fn replace_channel_associations(
        &self,
        channel: &ChannelId,
        associations: Vec<ProductAssociation>,
    ) -> Result<usize, AssociationError> {
        self.replace(channel, &associations)
            .await
            .map_err(|error| error.into_association_error(AssociationError::PersistenceFailed))
    }

    async fn top_associations(
        &self,
        channel: &ChannelId,
        source: &ProductId,
        limit: usize,
    ) -> Result<Vec<ProductAssociation>, AssociationError> {
        self.fetch_top(channel, source, limit)
            .await
            .map_err(|error| error.into_association_error(AssociationError::QueryFailed))
    }

    async fn associations_for_sources(
        &self,
        channel: &ChannelId,
        sources: &[ProductId],
    ) -> Result<Vec<ProductAssociation>, AssociationError> {
        self.fetch_for_sources(channel, sources)
            .await
            .map_err(|error| error.into_association_error(AssociationError::QueryFailed))
    }
}
