use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use copurchase_core::associations::{CalculationSettingsStore, PipelineRunSummary};
use copurchase_core::domain::settings::{CalculationSettings, ScoringWeights};
use copurchase_core::errors::AssociationError;

use super::{decode_count, decode_error, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const SETTINGS_ROW_ID: i64 = 1;

/// Audit columns written after each successful calculation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastRun {
    pub calculated_at: DateTime<Utc>,
    pub channel_id: String,
    pub associations_written: u64,
    pub duration_ms: u64,
}

pub struct SqlSettingsStore {
    pool: DbPool,
}

impl SqlSettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn last_run(&self) -> Result<Option<LastRun>, AssociationError> {
        self.fetch_last_run()
            .await
            .map_err(|error| error.into_association_error(AssociationError::QueryFailed))
    }

    async fn fetch(&self) -> Result<Option<CalculationSettings>, RepositoryError> {
        let row = sqlx::query(
            "SELECT time_window_days, min_cooccurrence, min_score, max_recommendations,
                    fallback_to_related_products, frequency_weight, recency_weight, value_weight
             FROM association_settings
             WHERE id = ?",
        )
        .bind(SETTINGS_ROW_ID)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_settings).transpose()
    }

    async fn insert_if_absent(&self, defaults: &CalculationSettings) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO association_settings
                (id, time_window_days, min_cooccurrence, min_score, max_recommendations,
                 fallback_to_related_products, frequency_weight, recency_weight, value_weight,
                 updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(SETTINGS_ROW_ID)
        .bind(i64::from(defaults.time_window_days))
        .bind(i64::from(defaults.min_cooccurrence))
        .bind(defaults.min_score)
        .bind(i64::try_from(defaults.max_recommendations).unwrap_or(i64::MAX))
        .bind(defaults.fallback_to_related_products)
        .bind(defaults.weights.frequency)
        .bind(defaults.weights.recency)
        .bind(defaults.weights.value)
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert(&self, settings: &CalculationSettings) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO association_settings
                (id, time_window_days, min_cooccurrence, min_score, max_recommendations,
                 fallback_to_related_products, frequency_weight, recency_weight, value_weight,
                 updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                time_window_days = excluded.time_window_days,
                min_cooccurrence = excluded.min_cooccurrence,
                min_score = excluded.min_score,
                max_recommendations = excluded.max_recommendations,
                fallback_to_related_products = excluded.fallback_to_related_products,
                frequency_weight = excluded.frequency_weight,
                recency_weight = excluded.recency_weight,
                value_weight = excluded.value_weight,
                updated_at = excluded.updated_at",
        )
        .bind(SETTINGS_ROW_ID)
        .bind(i64::from(settings.time_window_days))
        .bind(i64::from(settings.min_cooccurrence))
        .bind(settings.min_score)
        .bind(i64::try_from(settings.max_recommendations).unwrap_or(i64::MAX))
        .bind(settings.fallback_to_related_products)
        .bind(settings.weights.frequency)
        .bind(settings.weights.recency)
        .bind(settings.weights.value)
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_run(&self, summary: &PipelineRunSummary) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE association_settings
             SET last_calculated_at = ?,
                 last_channel_id = ?,
                 last_associations_written = ?,
                 last_duration_ms = ?
             WHERE id = ?",
        )
        .bind(encode_timestamp(summary.completed_at))
        .bind(summary.channel_id.as_str())
        .bind(i64::try_from(summary.associations_written).unwrap_or(i64::MAX))
        .bind(i64::try_from(summary.duration_ms).unwrap_or(i64::MAX))
        .bind(SETTINGS_ROW_ID)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn fetch_last_run(&self) -> Result<Option<LastRun>, RepositoryError> {
        let row = sqlx::query(
            "SELECT last_calculated_at, last_channel_id, last_associations_written, last_duration_ms
             FROM association_settings
             WHERE id = ? AND last_calculated_at IS NOT NULL",
        )
        .bind(SETTINGS_ROW_ID)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let calculated_at: String = row.try_get("last_calculated_at").map_err(decode_error)?;
        let channel_id: Option<String> = row.try_get("last_channel_id").map_err(decode_error)?;
        let written: Option<i64> = row.try_get("last_associations_written").map_err(decode_error)?;
        let duration: Option<i64> = row.try_get("last_duration_ms").map_err(decode_error)?;

        Ok(Some(LastRun {
            calculated_at: decode_timestamp("last_calculated_at", &calculated_at)?,
            channel_id: channel_id.unwrap_or_default(),
            associations_written: decode_count("last_associations_written", written.unwrap_or(0))?,
            duration_ms: decode_count("last_duration_ms", duration.unwrap_or(0))?,
        }))
    }
}

fn row_to_settings(row: &SqliteRow) -> Result<CalculationSettings, RepositoryError> {
    let time_window_days: i64 = row.try_get("time_window_days").map_err(decode_error)?;
    let min_cooccurrence: i64 = row.try_get("min_cooccurrence").map_err(decode_error)?;
    let min_score: f64 = row.try_get("min_score").map_err(decode_error)?;
    let max_recommendations: i64 = row.try_get("max_recommendations").map_err(decode_error)?;
    let fallback: bool = row.try_get("fallback_to_related_products").map_err(decode_error)?;
    let frequency: f64 = row.try_get("frequency_weight").map_err(decode_error)?;
    let recency: f64 = row.try_get("recency_weight").map_err(decode_error)?;
    let value: f64 = row.try_get("value_weight").map_err(decode_error)?;

    Ok(CalculationSettings {
        time_window_days: decode_count("time_window_days", time_window_days)?,
        min_cooccurrence: decode_count("min_cooccurrence", min_cooccurrence)?,
        min_score,
        max_recommendations: decode_count("max_recommendations", max_recommendations)?,
        fallback_to_related_products: fallback,
        weights: ScoringWeights { frequency, recency, value },
    })
}

#[async_trait]
impl CalculationSettingsStore for SqlSettingsStore {
    async fn ensure_defaults(
        &self,
        defaults: &CalculationSettings,
    ) -> Result<CalculationSettings, AssociationError> {
        defaults.validate()?;
        self.insert_if_absent(defaults)
            .await
            .map_err(|error| error.into_association_error(AssociationError::PersistenceFailed))?;
        self.fetch()
            .await
            .map_err(|error| error.into_association_error(AssociationError::QueryFailed))?
            .ok_or_else(|| {
                AssociationError::PersistenceFailed("settings row missing after bootstrap".to_string())
            })
    }

    async fn load(&self) -> Result<Option<CalculationSettings>, AssociationError> {
        self.fetch()
            .await
            .map_err(|error| error.into_association_error(AssociationError::QueryFailed))
    }

    async fn save(&self, settings: &CalculationSettings) -> Result<(), AssociationError> {
        settings.validate()?;
        self.upsert(settings)
            .await
            .map_err(|error| error.into_association_error(AssociationError::PersistenceFailed))
    }

    async fn record_run(&self, summary: &PipelineRunSummary) -> Result<(), AssociationError> {
        let updated = self
            .write_run(summary)
            .await
            .map_err(|error| error.into_association_error(AssociationError::PersistenceFailed))?;
        if updated == 0 {
            return Err(AssociationError::PersistenceFailed(
                "no settings row to record the run against".to_string(),
            ));
        }
        Ok(())
    }
}
