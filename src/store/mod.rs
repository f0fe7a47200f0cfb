//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了文档存储接口，以及 Redis 与进程内两种实现。

pub mod memory;
pub mod redis_store;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::model::{CachedEntity, RunMetadata};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// 文档存储接口
///
/// 每个实体对应一个文档，另有一个运行元数据文档与一个租约文档。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 读取运行元数据，不存在时返回 `None`
    async fn get_metadata(&self) -> Result<Option<RunMetadata>>;

    /// 整体写入运行元数据
    async fn put_metadata(&self, metadata: &RunMetadata) -> Result<()>;

    /// 读取单个实体文档
    async fn get_entity(&self, entity_id: &str) -> Result<Option<CachedEntity>>;

    /// 整体替换单个实体文档
    async fn put_entity(&self, entity_id: &str, document: &CachedEntity) -> Result<()>;

    /// 原子提交一批实体文档，要么全部可见，要么全部不可见
    async fn commit_batch(&self, documents: &[(String, CachedEntity)]) -> Result<()>;

    /// 删除所有实体文档，返回删除数量
    async fn delete_all_entities(&self) -> Result<usize>;

    /// 尝试获取同步租约
    async fn try_acquire_lease(&self, owner: &str, ttl: Duration) -> Result<bool>;

    /// 释放同步租约，只有持有者能够释放
    async fn release_lease(&self, owner: &str) -> Result<bool>;
}

/// 存储键布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn metadata(&self) -> String {
        format!("{}:metadata:data", self.prefix)
    }

    pub fn entity(&self, entity_id: &str) -> String {
        format!("{}:entities:{}", self.prefix, entity_id)
    }

    /// 匹配全部实体文档的 SCAN 模式
    pub fn entity_pattern(&self) -> String {
        format!("{}:entities:*", self.prefix)
    }

    pub fn lease(&self) -> String {
        format!("{}:lease", self.prefix)
    }
}

/// 根据配置打开存储
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(config).await?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
