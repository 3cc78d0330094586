use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use copurchase_core::errors::AssociationError;

pub mod association;
pub mod bundle;
pub mod order_corpus;
pub mod related;
pub mod settings;

pub use association::SqlAssociationStore;
pub use bundle::SqlBundleClassifier;
pub use order_corpus::SqlOrderCorpusReader;
pub use related::SqlRelatedProductsSource;
pub use settings::SqlSettingsStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// Lift a storage failure into the engine error kind the calling port reports.
    pub fn into_association_error(self, kind: fn(String) -> AssociationError) -> AssociationError {
        kind(self.to_string())
    }
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

/// Every timestamp column shares this format so lexical comparison in SQL
/// agrees with chronological order.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

/// Non-negative SQLite integers surface as `i64`; reject anything that does not fit.
pub(crate) fn decode_count<T: TryFrom<i64>>(column: &str, raw: i64) -> Result<T, RepositoryError> {
    T::try_from(raw)
        .map_err(|_| RepositoryError::Decode(format!("{column}: value {raw} out of range")))
}
