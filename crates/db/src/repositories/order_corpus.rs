use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use copurchase_core::associations::OrderCorpusReader;
use copurchase_core::domain::order::{OrderId, OrderLine, OrderRecord};
use copurchase_core::domain::product::{ChannelId, ProductId};
use copurchase_core::errors::AssociationError;

use super::{decode_count, decode_error, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

/// Only orders in this status contribute to the corpus.
pub const COMPLETED_STATUS: &str = "completed";

pub struct SqlOrderCorpusReader {
    pool: DbPool,
}

impl SqlOrderCorpusReader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_orders(
        &self,
        channel: &ChannelId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT o.id AS order_id,
                    o.placed_at AS placed_at,
                    o.total_minor AS total_minor,
                    COALESCE(p.parent_product_id, l.product_id) AS product_id,
                    l.quantity AS quantity
             FROM sales_order o
             JOIN order_line l ON l.order_id = o.id
             LEFT JOIN product p ON p.id = l.product_id
             WHERE o.channel_id = ?
               AND o.status = ?
               AND o.placed_at >= ?
               AND l.is_bundle_component = 0
             ORDER BY o.placed_at ASC, o.id ASC, l.id ASC",
        )
        .bind(channel.as_str())
        .bind(COMPLETED_STATUS)
        .bind(encode_timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        let mut orders: Vec<OrderRecord> = Vec::new();
        for row in &rows {
            let order_id: String = row.try_get("order_id").map_err(decode_error)?;
            let product_id: String = row.try_get("product_id").map_err(decode_error)?;
            let quantity: i64 = row.try_get("quantity").map_err(decode_error)?;
            let line =
                OrderLine { product_id: ProductId(product_id), quantity: decode_count("quantity", quantity)? };

            // Rows arrive grouped by order, so a new id always starts a new record.
            match orders.last_mut() {
                Some(current) if current.id.0 == order_id => current.lines.push(line),
                _ => {
                    let placed_at: String = row.try_get("placed_at").map_err(decode_error)?;
                    let total_minor: Option<i64> = row.try_get("total_minor").map_err(decode_error)?;
                    orders.push(OrderRecord {
                        id: OrderId(order_id),
                        placed_at: decode_timestamp("placed_at", &placed_at)?,
                        total_minor,
                        lines: vec![line],
                    });
                }
            }
        }

        Ok(orders)
    }

    async fn fetch_line_count(
        &self,
        channel: &ChannelId,
        since: DateTime<Utc>,
        product: &ProductId,
    ) -> Result<u64, RepositoryError> {
        // Resolved the same way as the corpus, so variant lines count towards
        // their parent.
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1)
             FROM order_line l
             JOIN sales_order o ON o.id = l.order_id
             LEFT JOIN product p ON p.id = l.product_id
             WHERE o.channel_id = ?
               AND o.status = ?
               AND o.placed_at >= ?
               AND l.is_bundle_component = 0
               AND COALESCE(p.parent_product_id, l.product_id) = ?",
        )
        .bind(channel.as_str())
        .bind(COMPLETED_STATUS)
        .bind(encode_timestamp(since))
        .bind(product.as_str())
        .fetch_one(&self.pool)
        .await?;

        decode_count("line_count", count)
    }
}

#[async_trait]
impl OrderCorpusReader for SqlOrderCorpusReader {
    async fn load_orders(
        &self,
        channel: &ChannelId,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, AssociationError> {
        self.fetch_orders(channel, since)
            .await
            .map_err(|error| error.into_association_error(AssociationError::CorpusUnavailable))
    }

    async fn count_product_lines(
        &self,
        channel: &ChannelId,
        since: DateTime<Utc>,
        product: &ProductId,
    ) -> Result<u64, AssociationError> {
        self.fetch_line_count(channel, since, product)
            .await
            .map_err(|error| error.into_association_error(AssociationError::CorpusUnavailable))
    }
}
