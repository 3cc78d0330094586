use copurchase_core::associations::CalculationSettingsStore;
use copurchase_db::repositories::SqlSettingsStore;
use serde_json::json;

use crate::commands::{
    association_failure, build_runtime, load_config, open_database, CommandError, CommandResult,
};

pub fn run(init: bool) -> CommandResult {
    let config = match load_config("settings") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("settings") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let store = SqlSettingsStore::new(pool.clone());

        let settings = if init {
            Some(store.ensure_defaults(&config.calculation).await.map_err(association_failure)?)
        } else {
            store.load().await.map_err(association_failure)?
        };
        let last_run = store.last_run().await.map_err(association_failure)?;
        pool.close().await;

        Ok::<_, CommandError>((settings, last_run))
    });

    match result {
        Ok((Some(settings), last_run)) => CommandResult::success_with_data(
            "settings",
            "calculation settings loaded",
            Some(json!({ "settings": settings, "last_run": last_run })),
        ),
        Ok((None, _)) => CommandResult::success_with_data(
            "settings",
            "no calculation settings stored; run `copurchase settings --init` to create them",
            Some(json!({ "settings": null, "last_run": null })),
        ),
        Err(error) => CommandResult::from_error("settings", error),
    }
}
