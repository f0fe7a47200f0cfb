use crate::cli::{open_store, ForceReseedArgs};
use crate::config::AppConfig;
use crate::sync::force_full_reseed;
use anyhow::{Context, Result};

pub async fn execute(_args: &ForceReseedArgs, config: &AppConfig) -> Result<()> {
    let store = open_store(config, false).await?;
    force_full_reseed(store)
        .await
        .context("Failed to schedule full reseed")?;

    println!(
        "✅ Full reseed scheduled for the next run at {} ({})",
        config.schedule.daily_at, config.schedule.time_zone
    );
    Ok(())
}
