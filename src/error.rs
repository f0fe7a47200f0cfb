//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步引擎的错误类型和处理机制。

use thiserror::Error;

/// 同步引擎错误类型枚举
///
/// 前七个变体对应一次同步运行中的错误分类：
/// 令牌、实体列表、批量写入与元数据写入错误是致命的，
/// 单实体拉取、体积拒绝与单实体写入错误在循环内被吸收并计入运行摘要。
#[derive(Error, Debug)]
pub enum SyncError {
    /// 获取上游访问令牌失败
    #[error("Token fetch failed: {0}")]
    TokenFetch(String),

    /// 拉取实体（球会）列表失败
    #[error("Entity list fetch failed: {0}")]
    EntityList(String),

    /// 拉取单个实体的记录失败
    #[error("Fetch failed for entity {entity_id}: {reason}")]
    PerEntityFetch { entity_id: String, reason: String },

    /// 序列化后的实体超过存储单文档上限
    #[error("Entity {entity_id} rejected: {size} bytes exceeds the document ceiling")]
    SizeRejected { entity_id: String, size: usize },

    /// 增量模式下单个实体文档替换失败
    #[error("Write failed for entity {entity_id}: {reason}")]
    EntityWrite { entity_id: String, reason: String },

    /// 批量写入失败，之后的批次不再尝试
    #[error("Persistence batch {batch} failed: {reason}")]
    PersistenceBatch { batch: usize, reason: String },

    /// 运行元数据写入失败
    #[error("Metadata write failed: {0}")]
    MetadataWrite(String),

    /// 存储操作失败
    #[error("Store operation failed: {0}")]
    Store(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 同步租约已被其他运行持有
    #[error("Sync lease is held by another run")]
    LeaseUnavailable,

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 运行被取消
    #[error("Sync run cancelled")]
    Cancelled,

    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl SyncError {
    /// 是否为在实体循环内被吸收的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::PerEntityFetch { .. }
                | SyncError::SizeRejected { .. }
                | SyncError::EntityWrite { .. }
        )
    }
}

/// 同步操作结果类型别名
pub type Result<T> = std::result::Result<T, SyncError>;
