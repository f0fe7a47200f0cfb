//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 进程内文档存储，用于演练运行与测试。
//!
//! 支持故障注入：可以让第 N 次批量提交之后的提交失败、让指定实体的
//! 单文档写入失败，或让元数据读写失败。

use super::DocumentStore;
use crate::error::{Result, SyncError};
use crate::model::{CachedEntity, RunMetadata};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct FailurePlan {
    /// 从第几次批量提交（从 1 开始）起失败，0 表示不失败
    fail_batches_from: AtomicUsize,
    fail_entity_writes: DashSet<String>,
    fail_metadata_reads: AtomicBool,
    fail_metadata_writes: AtomicBool,
}

/// 进程内文档存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: DashMap<String, CachedEntity>,
    metadata: RwLock<Option<RunMetadata>>,
    lease: Mutex<Option<(String, Instant)>>,
    batch_commits: AtomicUsize,
    failures: FailurePlan,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置运行元数据
    pub async fn with_metadata(self, metadata: RunMetadata) -> Self {
        *self.metadata.write().await = Some(metadata);
        self
    }

    /// 预置实体文档
    pub fn insert_entity(&self, entity_id: impl Into<String>, document: CachedEntity) {
        self.entities.insert(entity_id.into(), document);
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// 已尝试的批量提交次数（含失败的）
    pub fn batch_commits(&self) -> usize {
        self.batch_commits.load(Ordering::SeqCst)
    }

    /// 第 `nth` 次（从 1 开始）及之后的批量提交失败
    pub fn fail_batches_from(&self, nth: usize) {
        self.failures.fail_batches_from.store(nth, Ordering::SeqCst);
    }

    /// 指定实体的单文档写入失败
    pub fn fail_entity_write(&self, entity_id: impl Into<String>) {
        self.failures.fail_entity_writes.insert(entity_id.into());
    }

    pub fn fail_metadata_reads(&self, fail: bool) {
        self.failures
            .fail_metadata_reads
            .store(fail, Ordering::SeqCst);
    }

    pub fn fail_metadata_writes(&self, fail: bool) {
        self.failures
            .fail_metadata_writes
            .store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_metadata(&self) -> Result<Option<RunMetadata>> {
        if self.failures.fail_metadata_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Store("injected metadata read failure".to_string()));
        }
        Ok(self.metadata.read().await.clone())
    }

    async fn put_metadata(&self, metadata: &RunMetadata) -> Result<()> {
        if self.failures.fail_metadata_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Store("injected metadata write failure".to_string()));
        }
        *self.metadata.write().await = Some(metadata.clone());
        Ok(())
    }

    async fn get_entity(&self, entity_id: &str) -> Result<Option<CachedEntity>> {
        Ok(self.entities.get(entity_id).map(|e| e.value().clone()))
    }

    async fn put_entity(&self, entity_id: &str, document: &CachedEntity) -> Result<()> {
        if self.failures.fail_entity_writes.contains(entity_id) {
            return Err(SyncError::Store(format!(
                "injected write failure for entity {}",
                entity_id
            )));
        }
        self.entities.insert(entity_id.to_string(), document.clone());
        Ok(())
    }

    #[instrument(skip(self, documents), level = "debug", fields(document_count = documents.len()))]
    async fn commit_batch(&self, documents: &[(String, CachedEntity)]) -> Result<()> {
        let nth = self.batch_commits.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_from = self.failures.fail_batches_from.load(Ordering::SeqCst);
        if fail_from != 0 && nth >= fail_from {
            return Err(SyncError::Store(format!("injected failure for batch {}", nth)));
        }

        for (entity_id, document) in documents {
            self.entities.insert(entity_id.clone(), document.clone());
        }
        debug!("Committed batch {} with {} documents", nth, documents.len());
        Ok(())
    }

    async fn delete_all_entities(&self) -> Result<usize> {
        let deleted = self.entities.len();
        self.entities.clear();
        Ok(deleted)
    }

    async fn try_acquire_lease(&self, owner: &str, ttl: Duration) -> Result<bool> {
        let mut lease = self.lease.lock().await;
        let now = Instant::now();
        match lease.as_ref() {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                *lease = Some((owner.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release_lease(&self, owner: &str) -> Result<bool> {
        let mut lease = self.lease.lock().await;
        match lease.as_ref() {
            Some((holder, _)) if holder == owner => {
                *lease = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
