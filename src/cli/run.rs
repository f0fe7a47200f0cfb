use crate::cli::{open_store, RunArgs};
use crate::config::AppConfig;
use crate::sync::{RunSummary, SyncEngine};
use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub async fn execute(args: &RunArgs, config: &AppConfig) -> Result<()> {
    let store = open_store(config, args.dry_run).await?;
    let engine = SyncEngine::from_config_with_store(config, store)
        .context("Failed to build sync engine")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current club");
            on_signal.cancel();
        }
    });

    let summary = engine
        .run_with_cancel(Utc::now(), &cancel)
        .await
        .context("Cache update failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&summary))?);
    } else {
        print_summary(&summary, args.dry_run);
    }
    Ok(())
}

fn summary_json(summary: &RunSummary) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "updateType": summary.update_type,
        "clubCount": summary.club_count,
        "courseCount": summary.course_count,
        "skippedClubs": summary.skipped_clubs,
        "unchangedClubs": summary.unchanged_clubs,
        "errorCount": summary.error_count,
        "durationSeconds": summary.duration.as_secs(),
    })
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    if dry_run {
        println!("(dry run, nothing was written to the configured store)");
    }
    println!("=== Cache Update ({}) ===\n", summary.update_type);
    println!("Clubs:           {}", summary.club_count);
    println!("Courses:         {}", summary.course_count);
    println!("Skipped (size):  {}", summary.skipped_clubs);
    println!("Unchanged:       {}", summary.unchanged_clubs);
    println!("Errors:          {}", summary.error_count);
    println!("Duration:        {:.1}s", summary.duration.as_secs_f64());
}
