//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 文档体积检查：测量实体连同过滤后记录的 JSON 序列化字节数。

use crate::config::{SyncConfig, DOCUMENT_CEILING_BYTES, LARGE_DOCUMENT_BYTES};
use crate::error::Result;
use crate::model::Entity;

/// 体积检查结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeStatus {
    Ok,
    /// 偏大，但仍会写入
    Warn,
    /// 达到存储上限，不写入
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReport {
    pub status: SizeStatus,
    pub serialized_size: usize,
}

/// 体积阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// 超过即告警
    pub warn_above: usize,
    /// 达到即拒绝
    pub reject_at: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            warn_above: LARGE_DOCUMENT_BYTES,
            reject_at: DOCUMENT_CEILING_BYTES,
        }
    }
}

impl From<&SyncConfig> for SizeLimits {
    fn from(config: &SyncConfig) -> Self {
        Self {
            warn_above: config.warn_size_bytes,
            reject_at: config.reject_size_bytes,
        }
    }
}

impl SizeLimits {
    pub fn classify(&self, size: usize) -> SizeStatus {
        if size >= self.reject_at {
            SizeStatus::Reject
        } else if size > self.warn_above {
            SizeStatus::Warn
        } else {
            SizeStatus::Ok
        }
    }
}

/// 测量实体的序列化体积并给出结论
pub fn guard(entity: &Entity, limits: &SizeLimits) -> Result<SizeReport> {
    let serialized_size = serde_json::to_vec(&entity.to_full_value())?.len();
    Ok(SizeReport {
        status: limits.classify(serialized_size),
        serialized_size,
    })
}
