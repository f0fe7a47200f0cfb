//! coursecache - 增量缓存同步引擎
//!
//! 把上游高尔夫球会/球场目录经过过滤、按模板去重后镜像到文档存储，
//! 在全量与增量刷新之间自动选择，遵守上游限速与存储单文档体积上限。

#![doc(html_root_url = "https://docs.rs/coursecache/0.1.0")]

pub mod cli;
pub mod compact_time;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod rate_limiting;
pub mod reader;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod upstream;
pub mod utils;

// Re-export commonly used items
pub use config::AppConfig;
pub use error::{Result, SyncError};
pub use model::{CachedEntity, ClubSummary, Entity, Record, RunMetadata, UpdateType};
pub use reader::CacheReader;
pub use store::{DocumentStore, MemoryStore, RedisStore};
pub use sync::{force_full_reseed, RunSummary, SyncEngine};

/// coursecache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
