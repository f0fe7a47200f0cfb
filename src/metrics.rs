//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步运行的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{span, Level};

/// 实体处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityOutcome {
    Persisted,
    Skipped,
    Unchanged,
    Failed,
}

impl EntityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityOutcome::Persisted => "persisted",
            EntityOutcome::Skipped => "skipped",
            EntityOutcome::Unchanged => "unchanged",
            EntityOutcome::Failed => "failed",
        }
    }
}

/// 指标收集器
#[derive(Clone, Debug, Default)]
pub struct SyncMetrics {
    /// 运行次数
    /// key: "mode:outcome"
    pub runs_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 实体处理次数
    /// key: outcome
    pub entities_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 批量提交次数
    /// key: "ok" / "failed"
    pub batch_commits_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 最近一次运行耗时（秒）
    /// key: mode
    pub last_run_duration: Arc<Mutex<HashMap<String, f64>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: SyncMetrics = SyncMetrics::default();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncMetrics {
    /// 记录一次运行结果
    ///
    /// # 参数
    ///
    /// * `mode` - 刷新模式（full/incremental）
    /// * `outcome` - 运行结果（ok/failed/timeout）
    /// * `duration_secs` - 运行耗时
    pub fn record_run(&self, mode: &str, outcome: &str, duration_secs: f64) {
        let span = span!(Level::INFO, "sync_run", mode, outcome);
        let _enter = span.enter();
        *lock(&self.runs_total)
            .entry(format!("{}:{}", mode, outcome))
            .or_insert(0) += 1;
        lock(&self.last_run_duration).insert(mode.to_string(), duration_secs);
    }

    /// 记录单个实体的处理结果
    pub fn record_entity(&self, outcome: EntityOutcome) {
        *lock(&self.entities_total)
            .entry(outcome.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// 记录批量提交结果
    pub fn record_batch(&self, success: bool) {
        let key = if success { "ok" } else { "failed" };
        *lock(&self.batch_commits_total)
            .entry(key.to_string())
            .or_insert(0) += 1;
    }

    pub fn entity_count(&self, outcome: EntityOutcome) -> u64 {
        lock(&self.entities_total)
            .get(outcome.as_str())
            .copied()
            .unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为文本，按键排序以便比对
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut lines = Vec::new();

    for (k, v) in lock(&metrics.runs_total).iter() {
        let (mode, outcome) = k.split_once(':').unwrap_or((k.as_str(), ""));
        lines.push(format!(
            "sync_runs_total{{mode=\"{}\", outcome=\"{}\"}} {}",
            mode, outcome, v
        ));
    }
    for (k, v) in lock(&metrics.entities_total).iter() {
        lines.push(format!("sync_entities_total{{outcome=\"{}\"}} {}", k, v));
    }
    for (k, v) in lock(&metrics.batch_commits_total).iter() {
        lines.push(format!("sync_batch_commits_total{{result=\"{}\"}} {}", k, v));
    }
    for (k, v) in lock(&metrics.last_run_duration).iter() {
        lines.push(format!(
            "sync_last_run_duration_seconds{{mode=\"{}\"}} {:.3}",
            k, v
        ));
    }

    lines.sort();
    let mut output = lines.join("\n");
    if !output.is_empty() {
        output.push('\n');
    }
    output
}
