use crate::cli::{open_store, StatusArgs};
use crate::compact_time::format_compact;
use crate::config::AppConfig;
use crate::model::RunMetadata;
use crate::reader::CacheReader;
use crate::sync::{resolve_strategy, StrategyPolicy};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub async fn execute(args: &StatusArgs, config: &AppConfig) -> Result<()> {
    let store = open_store(config, false).await?;

    if let Some(ref club) = args.club {
        let reader = CacheReader::new(store, &config.reader);
        let courses = reader
            .club_courses(club, Utc::now())
            .await
            .with_context(|| format!("Failed to read club '{}'", club))?
            .with_context(|| format!("Club '{}' is not cached", club))?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&courses)?);
        } else {
            println!("=== Club {} ===\n", club);
            println!("Active courses: {}", courses.len());
            for course in &courses {
                println!(
                    "  {}  {}",
                    course.id.as_deref().unwrap_or("-"),
                    course.activation_date.as_deref().unwrap_or("-")
                );
            }
        }
        return Ok(());
    }

    let metadata = store
        .get_metadata()
        .await
        .context("Failed to read run metadata")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("=== Course Cache Status ===\n");
    match metadata {
        Some(ref metadata) => print_metadata(metadata, args.verbose),
        None => println!("No cache metadata found. The next run will be a full seed."),
    }

    let strategy = resolve_strategy(
        metadata.as_ref(),
        Utc::now(),
        &StrategyPolicy::from(&config.sync),
    );
    println!("\nNext run:        {} (changedsince={})", strategy.mode, strategy.cursor);

    if args.verbose {
        let metrics = crate::metrics::get_metrics_string();
        if !metrics.is_empty() {
            println!("\n{}", metrics);
        }
    }
    Ok(())
}

fn print_metadata(metadata: &RunMetadata, verbose: bool) {
    let update_type = metadata
        .last_update_type
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!("Last update:     {} ({})", fmt_time(metadata.last_updated), update_type);
    println!("Last seeded:     {}", fmt_time(metadata.last_seeded));
    println!("Clubs:           {}", metadata.club_count);
    println!("Courses:         {}", metadata.course_count);
    println!(
        "Last run:        {} clubs, {} courses",
        metadata.clubs_updated_last_run, metadata.courses_updated_last_run
    );
    println!("Layout version:  {}", metadata.version);

    if verbose {
        println!("\nClub list ({} entries):", metadata.clubs.len());
        for club in &metadata.clubs {
            println!("  {:>6}  {}", club.id, club.name);
        }
    }
}

fn fmt_time(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| format!("{} ({})", t.to_rfc3339(), format_compact(&t)))
        .unwrap_or_else(|| "never".to_string())
}
