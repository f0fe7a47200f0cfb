//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 刷新策略决策：根据持久化的运行元数据决定全量还是增量刷新。

use crate::compact_time::format_compact;
use crate::config::SyncConfig;
use crate::model::RunMetadata;
use chrono::{DateTime, Duration, Utc};

/// 刷新模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 本次运行的策略：模式与传给上游的 `changedsince` 游标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStrategy {
    pub mode: SyncMode,
    pub cursor: String,
}

/// 策略参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyPolicy {
    /// 全量刷新游标
    pub epoch_floor: String,
    /// 超过该时长未播种则强制全量
    pub reseed_after: Duration,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            epoch_floor: crate::config::DEFAULT_EPOCH_FLOOR.to_string(),
            reseed_after: Duration::days(30),
        }
    }
}

impl From<&SyncConfig> for StrategyPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            epoch_floor: config.epoch_floor.clone(),
            reseed_after: Duration::try_days(config.reseed_after_days).unwrap_or(Duration::MAX),
        }
    }
}

/// 决定刷新策略
///
/// 同样的输入总得到同样的结果。
pub fn resolve_strategy(
    metadata: Option<&RunMetadata>,
    now: DateTime<Utc>,
    policy: &StrategyPolicy,
) -> SyncStrategy {
    let full = || SyncStrategy {
        mode: SyncMode::Full,
        cursor: policy.epoch_floor.clone(),
    };

    let Some(last_seeded) = metadata.and_then(|m| m.last_seeded) else {
        return full();
    };

    if now.signed_duration_since(last_seeded) > policy.reseed_after {
        return full();
    }

    SyncStrategy {
        mode: SyncMode::Incremental,
        cursor: format_compact(&last_seeded),
    }
}
