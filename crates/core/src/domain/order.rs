use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Parent product the line resolved to (variants already collapsed).
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A completed order as supplied by the corpus reader. Bundle sub-component
/// lines have already been removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub placed_at: DateTime<Utc>,
    /// Order total in the smallest currency unit; `None` when the source had no total.
    pub total_minor: Option<i64>,
    pub lines: Vec<OrderLine>,
}

impl OrderRecord {
    /// Distinct parent products on the order, in a stable order.
    pub fn distinct_products(&self) -> BTreeSet<&ProductId> {
        self.lines.iter().map(|line| &line.product_id).collect()
    }

    pub fn total_or_zero(&self) -> i64 {
        self.total_minor.unwrap_or(0)
    }
}
