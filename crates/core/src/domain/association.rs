use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::{ChannelId, ProductId};

/// Normalised sub-scores for one directed pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociationScore {
    pub frequency: f64,
    pub recency: f64,
    pub value: f64,
    pub final_score: f64,
    pub lift: Option<f64>,
}

/// One persisted row of the association table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductAssociation {
    pub source_product_id: ProductId,
    pub target_product_id: ProductId,
    pub channel_id: ChannelId,
    pub cooccurrence_count: u32,
    pub frequency_score: f64,
    pub recency_score: f64,
    pub value_score: f64,
    pub final_score: f64,
    pub lift: Option<f64>,
    pub last_calculated: DateTime<Utc>,
}

impl ProductAssociation {
    pub fn from_score(
        source_product_id: ProductId,
        target_product_id: ProductId,
        channel_id: ChannelId,
        cooccurrence_count: u32,
        score: AssociationScore,
        last_calculated: DateTime<Utc>,
    ) -> Self {
        Self {
            source_product_id,
            target_product_id,
            channel_id,
            cooccurrence_count,
            frequency_score: score.frequency,
            recency_score: score.recency,
            value_score: score.value,
            final_score: score.final_score,
            lift: score.lift,
            last_calculated,
        }
    }
}
