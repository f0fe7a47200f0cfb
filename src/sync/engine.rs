//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 同步引擎：驱动一次完整的缓存刷新运行。
//!
//! 运行状态机：`Idle → ResolvingStrategy → Fetching → Finalizing → Done | Failed`。
//! 只有令牌获取、实体列表拉取、收尾写入、租约获取与整体超时会让运行失败，
//! 单个实体的拉取、体积与写入问题在循环内被吸收并计入运行摘要。

use super::filter::{filter, FilterPolicy};
use super::lease::SyncLease;
use super::persister::Persister;
use super::size_guard::{guard, SizeLimits, SizeStatus};
use super::strategy::{resolve_strategy, StrategyPolicy, SyncMode, SyncStrategy};
use crate::config::{AppConfig, LeaseConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::metrics::{EntityOutcome, GLOBAL_METRICS};
use crate::model::{Entity, RunMetadata, UpdateType};
use crate::rate_limiting::Throttle;
use crate::store::{self, DocumentStore};
use crate::upstream::{self, CatalogSource, HttpCatalogClient, TokenProvider};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    ResolvingStrategy,
    Fetching,
    Finalizing,
    Done,
    Failed,
}

/// 引擎当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunState {
    pub phase: RunPhase,
    pub mode: Option<SyncMode>,
}

/// 运行摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub update_type: UpdateType,
    /// 写入的实体数（全量：收集的实体；增量：被替换的实体）
    pub club_count: usize,
    pub course_count: usize,
    /// 因体积被拒绝的实体数
    pub skipped_clubs: usize,
    /// 无变更或过滤后为空的实体数
    pub unchanged_clubs: usize,
    /// 被吸收的错误数
    pub error_count: usize,
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct Tally {
    persisted: usize,
    courses: usize,
    skipped: usize,
    unchanged: usize,
    errors: usize,
}

impl Tally {
    fn record(&mut self, outcome: EntityOutcome, courses: usize) {
        match outcome {
            EntityOutcome::Persisted => {
                self.persisted += 1;
                self.courses += courses;
            }
            EntityOutcome::Skipped => self.skipped += 1,
            EntityOutcome::Unchanged => self.unchanged += 1,
            EntityOutcome::Failed => self.errors += 1,
        }
        GLOBAL_METRICS.record_entity(outcome);
    }
}

/// 同步引擎
pub struct SyncEngine {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<dyn CatalogSource>,
    tokens: Arc<dyn TokenProvider>,
    persister: Persister,
    throttle: Throttle,
    filter_policy: FilterPolicy,
    strategy_policy: StrategyPolicy,
    size_limits: SizeLimits,
    run_timeout: Duration,
    lease: LeaseConfig,
    state: watch::Sender<RunState>,
}

impl SyncEngine {
    /// 使用给定的协作者创建引擎
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn DocumentStore>,
        catalog: Arc<dyn CatalogSource>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let (state, _) = watch::channel(RunState::default());
        Self {
            persister: Persister::new(store.clone(), config.batch_size),
            store,
            catalog,
            tokens,
            throttle: Throttle::from_config(&config.throttle),
            filter_policy: FilterPolicy::from_days(config.forward_window_days),
            strategy_policy: StrategyPolicy::from(config),
            size_limits: SizeLimits::from(config),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            lease: config.lease.clone(),
            state,
        }
    }

    /// 根据完整配置创建引擎：打开存储并构造上游客户端
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = store::open(&config.store).await?;
        Self::from_config_with_store(config, store)
    }

    /// 根据配置创建引擎，使用给定的存储
    pub fn from_config_with_store(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        let catalog = Arc::new(HttpCatalogClient::new(&config.upstream)?);
        let tokens = upstream::token_provider(&config.upstream)?;
        Ok(Self::new(&config.sync, store, catalog, tokens))
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    /// 当前运行状态
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn set_phase(&self, phase: RunPhase) {
        self.state.send_modify(|s| s.phase = phase);
        info!(phase = ?phase, "Sync phase changed");
    }

    /// 执行一次同步运行
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        self.run_with_cancel(now, &CancellationToken::new()).await
    }

    /// 执行一次同步运行，可被取消
    ///
    /// 整个运行受 `run_timeout` 约束；超时或取消时已经写入的数据保留。
    #[instrument(skip(self, cancel), level = "info")]
    pub async fn run_with_cancel(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        self.state.send_replace(RunState::default());

        let lease = if self.lease.enabled {
            match SyncLease::acquire(self.store.clone(), Duration::from_secs(self.lease.ttl_secs))
                .await
            {
                Ok(lease) => Some(lease),
                Err(e) => {
                    error!("Could not acquire sync lease: {}", e);
                    self.set_phase(RunPhase::Failed);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let outcome = match tokio::time::timeout(self.run_timeout, self.execute(now, cancel)).await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(format!(
                "sync run exceeded {}s",
                self.run_timeout.as_secs()
            ))),
        };

        if let Some(lease) = lease {
            if let Err(e) = lease.release().await {
                warn!("Failed to release sync lease: {}", e);
            }
        }

        let duration = started.elapsed();
        let mode = self
            .state()
            .mode
            .map(|m| m.as_str())
            .unwrap_or("unresolved");

        match outcome {
            Ok(mut summary) => {
                summary.duration = duration;
                self.set_phase(RunPhase::Done);
                GLOBAL_METRICS.record_run(mode, "ok", duration.as_secs_f64());
                info!(
                    "Cache update ({}) completed in {:.1}s: {} clubs, {} courses, {} skipped, {} unchanged, {} errors",
                    summary.update_type,
                    duration.as_secs_f64(),
                    summary.club_count,
                    summary.course_count,
                    summary.skipped_clubs,
                    summary.unchanged_clubs,
                    summary.error_count
                );
                Ok(summary)
            }
            Err(e) => {
                self.set_phase(RunPhase::Failed);
                let label = match e {
                    SyncError::Timeout(_) => "timeout",
                    SyncError::Cancelled => "cancelled",
                    _ => "failed",
                };
                GLOBAL_METRICS.record_run(mode, label, duration.as_secs_f64());
                error!("Cache update failed: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Result<RunSummary> {
        self.set_phase(RunPhase::ResolvingStrategy);
        let metadata = match self.store.get_metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Failed to read run metadata, treating as absent: {}", e);
                None
            }
        };
        let strategy = resolve_strategy(metadata.as_ref(), now, &self.strategy_policy);
        info!(
            "Strategy: {}, changedsince: {}",
            strategy.mode, strategy.cursor
        );

        self.state.send_modify(|s| s.mode = Some(strategy.mode));
        self.set_phase(RunPhase::Fetching);

        let token = self.tokens.fetch_token().await.map_err(|e| match e {
            SyncError::TokenFetch(_) => e,
            other => SyncError::TokenFetch(other.to_string()),
        })?;

        let listing = self.catalog.list_entities(&token).await.map_err(|e| match e {
            SyncError::EntityList(_) => e,
            other => SyncError::EntityList(other.to_string()),
        })?;
        info!("Found {} clubs", listing.entities.len());

        let mut tally = Tally {
            errors: listing.malformed,
            ..Default::default()
        };
        let mut collected = Vec::new();
        let total = listing.entities.len();

        for (index, entity) in listing.entities.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let entity_id = entity.id.clone();
            info!("[{}/{}] {}", index + 1, total, entity.name);

            match self
                .process_entity(entity, &token, &strategy, now, &mut collected)
                .await
            {
                Ok((outcome, courses)) => tally.record(outcome, courses),
                Err(e @ SyncError::SizeRejected { .. }) => {
                    warn!(entity_id = %entity_id, "Skipping club: {}", e);
                    tally.record(EntityOutcome::Skipped, 0);
                }
                Err(e) => {
                    warn!(
                        entity_id = %entity_id,
                        recoverable = e.is_recoverable(),
                        "Error processing club: {}",
                        e
                    );
                    tally.record(EntityOutcome::Failed, 0);
                }
            }

            if index + 1 < total && !self.throttle.pause(cancel).await {
                return Err(SyncError::Cancelled);
            }
        }

        info!(
            "Processed {} clubs, {} courses",
            tally.persisted, tally.courses
        );
        if tally.skipped > 0 {
            warn!("Skipped {} clubs (too large)", tally.skipped);
        }

        self.set_phase(RunPhase::Finalizing);
        let update_type = match strategy.mode {
            SyncMode::Full => {
                let report = self.persister.replace_all(&collected, now).await?;
                info!(
                    "Saved {} clubs in {} batches",
                    collected.len(),
                    report.batches
                );
                self.persister.write_full_metadata(&collected, now).await?;
                UpdateType::Full
            }
            SyncMode::Incremental => {
                self.persister
                    .write_incremental_metadata(tally.persisted, tally.courses, now)
                    .await?;
                UpdateType::Incremental
            }
        };

        Ok(RunSummary {
            update_type,
            club_count: tally.persisted,
            course_count: tally.courses,
            skipped_clubs: tally.skipped,
            unchanged_clubs: tally.unchanged,
            error_count: tally.errors,
            duration: Duration::ZERO,
        })
    }

    /// 处理单个实体：拉取、过滤、体积检查，然后收集或立即替换
    async fn process_entity(
        &self,
        entity: Entity,
        token: &SecretString,
        strategy: &SyncStrategy,
        now: DateTime<Utc>,
        collected: &mut Vec<Entity>,
    ) -> Result<(EntityOutcome, usize)> {
        let per_entity = |reason: String| SyncError::PerEntityFetch {
            entity_id: entity.id.clone(),
            reason,
        };

        let raw = self
            .catalog
            .list_records(&entity.id, token, &strategy.cursor)
            .await
            .map_err(|e| match e {
                SyncError::PerEntityFetch { .. } => e,
                other => per_entity(other.to_string()),
            })?;

        if raw.is_empty() {
            info!("  No changes");
            return Ok((EntityOutcome::Unchanged, 0));
        }

        let raw_count = raw.len();
        let records = filter(raw, now, &self.filter_policy);
        info!("  {} raw -> {} filtered", raw_count, records.len());
        if records.is_empty() {
            return Ok((EntityOutcome::Unchanged, 0));
        }

        let entity = entity.with_records(records);
        let report = guard(&entity, &self.size_limits)?;
        match report.status {
            SizeStatus::Reject => {
                return Err(SyncError::SizeRejected {
                    entity_id: entity.id,
                    size: report.serialized_size,
                });
            }
            SizeStatus::Warn => {
                warn!(
                    "Large club {}: {}KB",
                    entity.name,
                    report.serialized_size / 1024
                );
            }
            SizeStatus::Ok => {}
        }

        let courses = entity.records.len();
        match strategy.mode {
            SyncMode::Full => collected.push(entity),
            SyncMode::Incremental => self.persister.replace_one(&entity, now).await?,
        }
        Ok((EntityOutcome::Persisted, courses))
    }
}

/// 标记下一次运行执行全量刷新，不会访问上游
pub async fn force_full_reseed(store: Arc<dyn DocumentStore>) -> Result<RunMetadata> {
    let metadata = Persister::new(store, 1).mark_pending_reseed().await?;
    info!("Full reseed scheduled for the next run");
    Ok(metadata)
}
