use crate::commands::{prepare, CommandResult, StepFailure};
use chrono::Utc;
use optiquote_db::{connect_with_config, migrations, DemoSeedDataset, SeedQuoteInfo};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = DemoSeedDataset::load(&pool, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<Vec<SeedQuoteInfo>, StepFailure> = if verification.all_present {
            Ok(seed_result.quotes_seeded)
        } else {
            Err(("seed_verification", verification_failure_message(&verification.checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(quotes) => CommandResult::success("seed", summary_message(&quotes)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary_message(quotes: &[SeedQuoteInfo]) -> String {
    let inserted = quotes.iter().filter(|quote| quote.inserted).count();
    let lines = quotes
        .iter()
        .map(|quote| {
            format!("  - {}: {} ({})", quote.status.as_str(), quote.quote_id, quote.description)
        })
        .collect::<Vec<_>>();
    format!(
        "demo quotes ready ({} total, {inserted} inserted):\n{}",
        quotes.len(),
        lines.join("\n")
    )
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "some demo quotes failed to load".to_string()
    } else {
        format!("seed verification failed for: {}", failed_checks.join(", "))
    }
}
