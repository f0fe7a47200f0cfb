//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 基于 Redis 的文档存储实现。

use super::{DocumentStore, StoreKeys};
use crate::config::StoreConfig;
use crate::error::{Result, SyncError};
use crate::model::{CachedEntity, RunMetadata};
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

const SCAN_COUNT: usize = 1000;

/// Redis 文档存储
///
/// 实体文档与元数据均以 JSON 字符串保存。
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    keys: StoreKeys,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("keys", &self.keys)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisStore {
    /// 建立连接
    #[instrument(skip(config), level = "info", name = "connect_redis_store")]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let connection_string = config.connection_string.expose_secret();
        debug!(
            "Connecting to {}",
            redact_connection_string(connection_string)
        );

        let client = Client::open(connection_string)?;
        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(SyncError::Timeout(format!(
                    "Connection timed out after {}ms. Target: {}",
                    config.connection_timeout_ms,
                    redact_connection_string(connection_string)
                )));
            }
        };

        Ok(Self {
            manager,
            keys: StoreKeys::new(config.key_prefix.clone()),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(res) => res.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(format!(
                "{} timed out after {}ms",
                op,
                self.command_timeout.as_millis()
            ))),
        }
    }

    async fn get_json(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        self.bounded(
            "GET",
            redis::cmd("GET").arg(key).query_async::<Option<String>>(&mut conn),
        )
        .await
    }

    async fn set_json(&self, key: &str, json: String) -> Result<()> {
        let mut conn = self.manager.clone();
        self.bounded(
            "SET",
            redis::cmd("SET").arg(key).arg(json).query_async::<()>(&mut conn),
        )
        .await
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get_metadata(&self) -> Result<Option<RunMetadata>> {
        match self.get_json(&self.keys.metadata()).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, metadata), level = "debug")]
    async fn put_metadata(&self, metadata: &RunMetadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        self.set_json(&self.keys.metadata(), json).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_entity(&self, entity_id: &str) -> Result<Option<CachedEntity>> {
        match self.get_json(&self.keys.entity(entity_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, document), level = "debug")]
    async fn put_entity(&self, entity_id: &str, document: &CachedEntity) -> Result<()> {
        let json = serde_json::to_string(document)?;
        self.set_json(&self.keys.entity(entity_id), json).await
    }

    #[instrument(skip(self, documents), level = "debug", fields(document_count = documents.len()))]
    async fn commit_batch(&self, documents: &[(String, CachedEntity)]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (entity_id, document) in documents {
            let json = serde_json::to_string(document)?;
            pipe.set(self.keys.entity(entity_id), json).ignore();
        }

        let mut conn = self.manager.clone();
        self.bounded("MULTI/EXEC", pipe.query_async::<()>(&mut conn))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_all_entities(&self) -> Result<usize> {
        let pattern = self.keys.entity_pattern();
        let mut conn = self.manager.clone();
        let mut cursor = 0u64;
        let mut deleted = 0usize;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .bounded(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.del(key).ignore();
                }
                self.bounded("DEL", pipe.query_async::<()>(&mut conn))
                    .await?;
                deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!("Deleted {} entity documents", deleted);
        Ok(deleted)
    }

    /// 使用 SET NX PX 实现
    #[instrument(skip(self), level = "debug")]
    async fn try_acquire_lease(&self, owner: &str, ttl: Duration) -> Result<bool> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let mut conn = self.manager.clone();
        let result: Option<String> = self
            .bounded(
                "SET NX",
                redis::cmd("SET")
                    .arg(self.keys.lease())
                    .arg(owner)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut conn),
            )
            .await?;
        debug!("Lease acquisition result: success={}", result.is_some());
        Ok(result.is_some())
    }

    /// 使用 Lua 脚本保证原子性
    #[instrument(skip(self), level = "debug")]
    async fn release_lease(&self, owner: &str) -> Result<bool> {
        let script = redis::Script::new(
            r#"
            if redis.call("get", KEYS[1]) == ARGV[1] then
                return redis.call("del", KEYS[1])
            else
                return 0
            end
            "#,
        );

        let mut conn = self.manager.clone();
        let lease_key = self.keys.lease();
        let mut invocation = script.key(&lease_key);
        invocation.arg(owner);
        let result: i32 = self
            .bounded("EVALSHA", invocation.invoke_async(&mut conn))
            .await?;
        Ok(result == 1)
    }
}
