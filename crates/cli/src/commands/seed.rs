use chrono::Utc;
use copurchase_db::{DemoSeedDataset, SeedResult};

use crate::commands::{build_runtime, load_config, open_database, CommandError, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seeded = DemoSeedDataset::load(&pool, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if verification.all_present {
            Ok(seeded)
        } else {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err::<SeedResult, CommandError>(("seed_verification", verification_message(&failed), 6u8))
        }
    });

    match result {
        Ok(seeded) => CommandResult::success_with_data(
            "seed",
            format!(
                "demo corpus loaded: {} products, {} orders, {} order lines, {} relations",
                seeded.products_seeded,
                seeded.orders_seeded,
                seeded.lines_seeded,
                seeded.relations_seeded
            ),
            serde_json::to_value(&seeded).ok(),
        ),
        Err(error) => CommandResult::from_error("seed", error),
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some demo data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
