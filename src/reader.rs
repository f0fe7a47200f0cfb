//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 缓存读取端，供客户端列出球会并读取球场。
//!
//! 读取经过一层基于 Moka 的内存缓存，过期时间可配置。

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::model::{CachedEntity, ClubSummary, Record};
use crate::store::DocumentStore;
use crate::sync::filter::activated_by;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const CLUB_LIST_KEY: &str = "clubs";

/// 缓存读取器
#[derive(Clone)]
pub struct CacheReader {
    store: Arc<dyn DocumentStore>,
    listing: Cache<&'static str, Arc<Vec<ClubSummary>>>,
    documents: Cache<String, Arc<CachedEntity>>,
}

impl CacheReader {
    pub fn new(store: Arc<dyn DocumentStore>, config: &ReaderConfig) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self {
            store,
            listing: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            documents: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// 轻量球会列表，元数据不存在时为空
    #[instrument(skip(self), level = "debug")]
    pub async fn list_clubs(&self) -> Result<Arc<Vec<ClubSummary>>> {
        if let Some(clubs) = self.listing.get(CLUB_LIST_KEY).await {
            debug!("Club list served from memory");
            return Ok(clubs);
        }

        let clubs = Arc::new(
            self.store
                .get_metadata()
                .await?
                .map(|m| m.clubs)
                .unwrap_or_default(),
        );
        self.listing.insert(CLUB_LIST_KEY, clubs.clone()).await;
        Ok(clubs)
    }

    /// 读取实体的缓存文档
    #[instrument(skip(self), level = "debug")]
    pub async fn club_document(&self, entity_id: &str) -> Result<Option<Arc<CachedEntity>>> {
        if let Some(document) = self.documents.get(entity_id).await {
            debug!("Document {} served from memory", entity_id);
            return Ok(Some(document));
        }

        match self.store.get_entity(entity_id).await? {
            Some(document) => {
                let document = Arc::new(document);
                self.documents
                    .insert(entity_id.to_string(), document.clone())
                    .await;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    /// 实体当前已生效的记录
    ///
    /// 服务端缓存保留了未来几天内生效的记录，这里只返回激活时间不晚于 `now` 的部分。
    pub async fn club_courses(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Record>>> {
        Ok(self
            .club_document(entity_id)
            .await?
            .map(|document| activated_by(&document.courses, now)))
    }

    /// 清空内存缓存
    pub fn invalidate(&self) {
        self.listing.invalidate_all();
        self.documents.invalidate_all();
    }
}
