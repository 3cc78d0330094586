//! One full association recomputation for one channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::association::ProductAssociation;
use crate::domain::product::{ChannelId, ProductId};
use crate::domain::settings::CalculationSettings;
use crate::errors::AssociationError;

use super::matrix::{CooccurrenceMatrixBuilder, ProductPair};
use super::ports::{AssociationStore, BundleClassifier, OrderCorpusReader};
use super::scoring::ScoringEngine;

/// Reported back to the scheduler after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunSummary {
    pub run_id: String,
    pub channel_id: ChannelId,
    pub associations_written: usize,
    pub duration_ms: u64,
    pub orders_considered: usize,
    pub pairs_evaluated: usize,
    pub completed_at: DateTime<Utc>,
}

/// Associations that survived filtering, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationOutcome {
    pub associations: Vec<ProductAssociation>,
    pub orders_considered: usize,
    pub pairs_evaluated: usize,
}

pub struct AssociationCalculationPipeline {
    corpus: Arc<dyn OrderCorpusReader>,
    classifier: Arc<dyn BundleClassifier>,
    store: Arc<dyn AssociationStore>,
    builder: CooccurrenceMatrixBuilder,
    partitions: usize,
}

impl AssociationCalculationPipeline {
    pub fn new(
        corpus: Arc<dyn OrderCorpusReader>,
        classifier: Arc<dyn BundleClassifier>,
        store: Arc<dyn AssociationStore>,
    ) -> Self {
        Self {
            corpus,
            classifier,
            store,
            builder: CooccurrenceMatrixBuilder::new(),
            partitions: 1,
        }
    }

    /// Fold the corpus as `partitions` parallel slices instead of sequentially.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    pub async fn run(
        &self,
        channel: &ChannelId,
        settings: &CalculationSettings,
    ) -> Result<PipelineRunSummary, AssociationError> {
        self.run_at(channel, settings, Utc::now()).await
    }

    /// Recompute and atomically replace the channel's association set, scoring
    /// recency relative to `now`.
    pub async fn run_at(
        &self,
        channel: &ChannelId,
        settings: &CalculationSettings,
        now: DateTime<Utc>,
    ) -> Result<PipelineRunSummary, AssociationError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        info!(
            event_name = "association.pipeline.started",
            run_id = %run_id,
            channel_id = %channel,
            time_window_days = settings.time_window_days,
            "association calculation started"
        );

        let outcome = self.calculate(channel, settings, now).await?;

        let associations_written = if outcome.orders_considered == 0 {
            info!(
                event_name = "association.pipeline.empty_corpus",
                run_id = %run_id,
                channel_id = %channel,
                "no orders in window; leaving association set untouched"
            );
            0
        } else {
            self.store.replace_channel_associations(channel, outcome.associations).await?
        };

        let summary = PipelineRunSummary {
            run_id,
            channel_id: channel.clone(),
            associations_written,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            orders_considered: outcome.orders_considered,
            pairs_evaluated: outcome.pairs_evaluated,
            completed_at: Utc::now(),
        };
        info!(
            event_name = "association.pipeline.completed",
            run_id = %summary.run_id,
            channel_id = %channel,
            associations_written = summary.associations_written,
            orders_considered = summary.orders_considered,
            pairs_evaluated = summary.pairs_evaluated,
            duration_ms = summary.duration_ms,
            "association calculation completed"
        );

        Ok(summary)
    }

    /// Load, build, score, and filter without touching the store.
    pub async fn calculate(
        &self,
        channel: &ChannelId,
        settings: &CalculationSettings,
        now: DateTime<Utc>,
    ) -> Result<CalculationOutcome, AssociationError> {
        settings.validate()?;

        let since = now
            .checked_sub_signed(Duration::days(i64::from(settings.time_window_days)))
            .ok_or_else(|| {
                AssociationError::InvalidSettings(format!(
                    "time_window_days {} reaches before the earliest representable date",
                    settings.time_window_days
                ))
            })?;
        let orders = self.corpus.load_orders(channel, since).await?;
        if orders.is_empty() {
            return Ok(CalculationOutcome {
                associations: Vec::new(),
                orders_considered: 0,
                pairs_evaluated: 0,
            });
        }

        let matrix = self.builder.build_partitioned(&orders, self.partitions);
        let total_orders = orders.len();
        let scoring = ScoringEngine::from_settings(settings);
        let mut support = SupportCache::default();
        let mut associations = Vec::new();

        for pair in matrix.pairs() {
            if pair.cooccurrence_count < settings.min_cooccurrence {
                continue;
            }
            if self.classifier.is_bundle(pair.source()).await?
                || self.classifier.is_bundle(pair.target()).await?
            {
                debug!(
                    event_name = "association.pipeline.bundle_skipped",
                    channel_id = %channel,
                    source_product_id = %pair.source(),
                    target_product_id = %pair.target(),
                    "pair skipped: bundle endpoint"
                );
                continue;
            }

            let target_lines =
                support.target_line_count(self.corpus.as_ref(), channel, since, pair).await;
            let score = scoring.score(pair, total_orders, target_lines, now);

            if score.final_score < settings.min_score {
                continue;
            }
            if matches!(score.lift, Some(lift) if lift <= 1.0) {
                continue;
            }

            associations.push(ProductAssociation::from_score(
                pair.source().clone(),
                pair.target().clone(),
                channel.clone(),
                pair.cooccurrence_count,
                score,
                now,
            ));
        }

        Ok(CalculationOutcome {
            associations,
            orders_considered: total_orders,
            pairs_evaluated: matrix.len(),
        })
    }
}

/// Per-run memo of target support counts. Failed lookups are not cached.
#[derive(Default)]
struct SupportCache {
    counts: HashMap<ProductId, u64>,
}

impl SupportCache {
    async fn target_line_count(
        &mut self,
        corpus: &dyn OrderCorpusReader,
        channel: &ChannelId,
        since: DateTime<Utc>,
        pair: &ProductPair,
    ) -> Option<u64> {
        let target = pair.target();
        if let Some(count) = self.counts.get(target) {
            return Some(*count);
        }

        match corpus.count_product_lines(channel, since, target).await {
            Ok(count) => {
                self.counts.insert(target.clone(), count);
                Some(count)
            }
            Err(error) => {
                let error = AssociationError::LiftComputationFailed {
                    product_id: target.clone(),
                    reason: error.to_string(),
                };
                warn!(
                    event_name = "association.lift.unavailable",
                    channel_id = %channel,
                    source_product_id = %pair.source(),
                    target_product_id = %target,
                    error = %error,
                    "continuing without lift"
                );
                None
            }
        }
    }
}
