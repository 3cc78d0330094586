use std::sync::Arc;
use std::thread;

use copurchase_core::associations::{AssociationCalculationPipeline, CalculationSettingsStore};
use copurchase_core::domain::product::ChannelId;
use copurchase_db::repositories::{
    SqlAssociationStore, SqlBundleClassifier, SqlOrderCorpusReader, SqlSettingsStore,
};
use serde_json::json;
use tracing::warn;

use crate::commands::{
    association_failure, build_runtime, load_config, open_database, CommandError, CommandResult,
};

/// One pipeline run for `channel`, as invoked by the external scheduler.
pub fn run(channel: &str) -> CommandResult {
    let channel = ChannelId::new(channel.trim());
    if channel.as_str().is_empty() {
        return CommandResult::failure("calculate", "invalid_arguments", "channel must not be empty", 2);
    }

    let config = match load_config("calculate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("calculate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let settings_store = SqlSettingsStore::new(pool.clone());
        let settings =
            settings_store.ensure_defaults(&config.calculation).await.map_err(association_failure)?;

        let partitions = thread::available_parallelism().map(|count| count.get()).unwrap_or(1);
        let pipeline = AssociationCalculationPipeline::new(
            Arc::new(SqlOrderCorpusReader::new(pool.clone())),
            Arc::new(SqlBundleClassifier::new(pool.clone())),
            Arc::new(SqlAssociationStore::new(pool.clone())),
        )
        .with_partitions(partitions);

        let summary = pipeline.run(&channel, &settings).await.map_err(association_failure)?;

        // The association set is already committed; a missing audit entry is not a failed run.
        if let Err(error) = settings_store.record_run(&summary).await {
            warn!(
                event_name = "association.pipeline.audit_failed",
                channel_id = %channel,
                error = %error,
                "could not record run summary"
            );
        }
        pool.close().await;

        Ok::<_, CommandError>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success_with_data(
            "calculate",
            format!(
                "wrote {} associations for channel {} in {} ms",
                summary.associations_written, summary.channel_id, summary.duration_ms
            ),
            Some(json!({
                "run_id": summary.run_id,
                "channel_id": summary.channel_id,
                "associations_written": summary.associations_written,
                "duration_ms": summary.duration_ms,
                "orders_considered": summary.orders_considered,
                "pairs_evaluated": summary.pairs_evaluated,
            })),
        ),
        Err(error) => CommandResult::from_error("calculate", error),
    }
}
