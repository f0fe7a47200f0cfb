//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 同步租约：防止两次运行同时写入同一份缓存。

use crate::error::{Result, SyncError};
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// 已持有的同步租约
///
/// 持有者标识为随机 UUID，只有持有者能够释放。
pub struct SyncLease {
    store: Arc<dyn DocumentStore>,
    owner: String,
}

impl SyncLease {
    /// 获取租约，已被占用时返回 `LeaseUnavailable`
    pub async fn acquire(store: Arc<dyn DocumentStore>, ttl: Duration) -> Result<Self> {
        let owner = Uuid::new_v4().to_string();
        if !store.try_acquire_lease(&owner, ttl).await? {
            return Err(SyncError::LeaseUnavailable);
        }
        debug!("Acquired sync lease {} for {:?}", owner, ttl);
        Ok(Self { store, owner })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 释放租约
    pub async fn release(self) -> Result<()> {
        if self.store.release_lease(&self.owner).await? {
            debug!("Released sync lease {}", self.owner);
        } else {
            warn!("Sync lease {} had already expired", self.owner);
        }
        Ok(())
    }
}
