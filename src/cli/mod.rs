//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::AppConfig;
use crate::store::{self, DocumentStore, MemoryStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "coursecache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        env = "COURSECACHE_CONFIG",
        help = "Path to the TOML configuration file"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "run", about = "Run one cache update immediately")]
    Run(RunArgs),

    #[command(name = "schedule", about = "Run the cache update every day at the configured time")]
    Schedule(ScheduleArgs),

    #[command(name = "force-reseed", about = "Make the next run a full reseed")]
    ForceReseed(ForceReseedArgs),

    #[command(name = "status", about = "Show cache metadata")]
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[arg(long, help = "Write to an in-memory store instead of the configured one")]
    pub dry_run: bool,

    #[arg(short, long, help = "Output the run summary in JSON format")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ScheduleArgs {
    #[arg(long, help = "Write to an in-memory store instead of the configured one")]
    pub dry_run: bool,

    #[arg(long, help = "Also run once immediately on startup")]
    pub run_now: bool,
}

#[derive(Parser, Debug)]
pub struct ForceReseedArgs {}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(long, help = "Show the currently active courses of one club")]
    pub club: Option<String>,

    #[arg(short, long, help = "Show detailed information")]
    pub verbose: bool,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

mod force_reseed;
mod run;
mod schedule;
mod status;

pub use schedule::next_fire;

/// 加载配置，未指定路径时使用默认值
pub fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let config = AppConfig::default();
            config
                .validate()
                .map_err(anyhow::Error::msg)
                .context("Default configuration is invalid")?;
            Ok(config)
        }
    }
}

pub(crate) async fn open_store(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn DocumentStore>> {
    if dry_run {
        return Ok(Arc::new(MemoryStore::new()));
    }
    store::open(&config.store)
        .await
        .context("Failed to open document store")
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    crate::telemetry::init_tracing(&config.telemetry)?;

    let result = match &cli.command {
        Commands::Run(args) => run::execute(args, &config).await,
        Commands::Schedule(args) => schedule::execute(args, &config).await,
        Commands::ForceReseed(args) => force_reseed::execute(args, &config).await,
        Commands::Status(args) => status::execute(args, &config).await,
    };

    crate::telemetry::shutdown_tracing();
    result
}
