//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了批量持久化器，负责把过滤后的实体写入文档存储。
//!
//! 全量模式先清空全部实体文档，再按固定批次原子提交；某一批失败后
//! 剩余批次不再尝试，已提交的批次保留。增量模式逐个实体立即替换。

use crate::error::{Result, SyncError};
use crate::metrics::GLOBAL_METRICS;
use crate::model::{CachedEntity, Entity, RunMetadata, UpdateType, METADATA_VERSION};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 全量写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullWriteReport {
    /// 清空前存在的实体文档数
    pub deleted: usize,
    /// 成功提交的批次数
    pub batches: usize,
}

/// 批量持久化器
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn DocumentStore>,
    batch_size: usize,
}

impl Persister {
    pub fn new(store: Arc<dyn DocumentStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 全量替换：清空后分批写入
    #[instrument(skip(self, entities), level = "info", fields(entity_count = entities.len()))]
    pub async fn replace_all(
        &self,
        entities: &[Entity],
        now: DateTime<Utc>,
    ) -> Result<FullWriteReport> {
        let deleted = self
            .store
            .delete_all_entities()
            .await
            .map_err(|e| SyncError::PersistenceBatch {
                batch: 0,
                reason: format!("clearing entity documents: {}", e),
            })?;
        info!("Cleared {} existing entity documents", deleted);

        let total_batches = entities.len().div_ceil(self.batch_size);
        let mut batches = 0;
        for (index, chunk) in entities.chunks(self.batch_size).enumerate() {
            let documents: Vec<(String, CachedEntity)> = chunk
                .iter()
                .map(|entity| (entity.id.clone(), CachedEntity::split(entity, now)))
                .collect();

            if let Err(e) = self.store.commit_batch(&documents).await {
                GLOBAL_METRICS.record_batch(false);
                return Err(SyncError::PersistenceBatch {
                    batch: index + 1,
                    reason: e.to_string(),
                });
            }

            GLOBAL_METRICS.record_batch(true);
            batches += 1;
            debug!("Saved batch {}/{}", index + 1, total_batches);
        }

        Ok(FullWriteReport { deleted, batches })
    }

    /// 增量替换单个实体文档
    pub async fn replace_one(&self, entity: &Entity, now: DateTime<Utc>) -> Result<()> {
        let document = CachedEntity::split(entity, now);
        self.store
            .put_entity(&entity.id, &document)
            .await
            .map_err(|e| SyncError::EntityWrite {
                entity_id: entity.id.clone(),
                reason: e.to_string(),
            })
    }

    /// 全量运行结束时写入完整元数据
    #[instrument(skip(self, entities), level = "info")]
    pub async fn write_full_metadata(
        &self,
        entities: &[Entity],
        now: DateTime<Utc>,
    ) -> Result<RunMetadata> {
        let course_count = entities.iter().map(|e| e.records.len()).sum();
        let metadata = RunMetadata {
            last_seeded: Some(now),
            last_updated: Some(now),
            last_update_type: Some(UpdateType::Full),
            club_count: entities.len(),
            course_count,
            clubs_updated_last_run: entities.len(),
            courses_updated_last_run: course_count,
            clubs: entities.iter().map(Entity::summary).collect(),
            version: METADATA_VERSION,
        };

        self.store
            .put_metadata(&metadata)
            .await
            .map_err(|e| SyncError::MetadataWrite(e.to_string()))?;
        Ok(metadata)
    }

    /// 增量运行结束时只更新时间戳与本次计数
    ///
    /// 列表与累计计数保持不变；元数据不存在时以空列表、零计数创建。
    #[instrument(skip(self), level = "info")]
    pub async fn write_incremental_metadata(
        &self,
        clubs_updated: usize,
        courses_updated: usize,
        now: DateTime<Utc>,
    ) -> Result<RunMetadata> {
        let existing = self
            .store
            .get_metadata()
            .await
            .map_err(|e| SyncError::MetadataWrite(format!("reading metadata: {}", e)))?;

        let mut metadata = existing.unwrap_or_else(|| {
            warn!("No run metadata found, creating it with an empty list");
            RunMetadata::default()
        });
        metadata.last_updated = Some(now);
        metadata.last_seeded = Some(now);
        metadata.last_update_type = Some(UpdateType::Incremental);
        metadata.clubs_updated_last_run = clubs_updated;
        metadata.courses_updated_last_run = courses_updated;

        self.store
            .put_metadata(&metadata)
            .await
            .map_err(|e| SyncError::MetadataWrite(e.to_string()))?;
        Ok(metadata)
    }

    /// 清除播种时间，下一次运行将执行全量刷新
    ///
    /// 元数据不存在时返回错误。
    #[instrument(skip(self), level = "info")]
    pub async fn mark_pending_reseed(&self) -> Result<RunMetadata> {
        let mut metadata = self
            .store
            .get_metadata()
            .await
            .map_err(|e| SyncError::MetadataWrite(format!("reading metadata: {}", e)))?
            .ok_or_else(|| SyncError::MetadataWrite("no run metadata to update".to_string()))?;

        metadata.last_seeded = None;
        metadata.last_update_type = Some(UpdateType::PendingFullReseed);

        self.store
            .put_metadata(&metadata)
            .await
            .map_err(|e| SyncError::MetadataWrite(e.to_string()))?;
        Ok(metadata)
    }
}
