use chrono::Utc;
use souk_db::{DemoSeedDataset, SeedResult, SqliteStore};

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepError};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result: Result<SeedResult, StepError> = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let store = SqliteStore::new(pool.clone());

        let seed_result = DemoSeedDataset::load(&store, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        pool.close().await;

        if verification.all_present {
            Ok::<SeedResult, StepError>(seed_result)
        } else {
            Err(("seed_verification", verification_failure_message(&failed_checks), 6u8))
        }
    });

    match result {
        Ok(seed_result) => {
            CommandResult::success_with_details("seed", seed_summary(&seed_result), &seed_result)
        }
        Err(step) => CommandResult::from_step("seed", step),
    }
}

fn seed_summary(result: &SeedResult) -> String {
    if !result.rfq_created && result.quotes_seeded.is_empty() {
        return format!("demo dataset already present on rfq `{}`", result.rfq_id);
    }
    format!(
        "demo dataset loaded: rfq `{}` with {} quote(s)",
        result.rfq_id,
        result.quotes_seeded.len()
    )
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
