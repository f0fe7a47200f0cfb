//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了上游目录 API 的访问接口：访问令牌与目录拉取。

pub mod catalog;
pub mod token;

use crate::error::Result;
use crate::model::{Entity, Record};
use async_trait::async_trait;
use secrecy::SecretString;

pub use catalog::HttpCatalogClient;
pub use token::{token_provider, HttpTokenProvider, StaticTokenProvider};

/// 访问令牌提供者
///
/// 每次运行开始时获取一次令牌，运行中不刷新。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<SecretString>;
}

/// 实体列表
///
/// 无法解析出标识的条目不会进入 `entities`，只计入 `malformed`。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityList {
    pub entities: Vec<Entity>,
    pub malformed: usize,
}

/// 上游目录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// 拉取全部实体（球会），不含记录
    async fn list_entities(&self, token: &SecretString) -> Result<EntityList>;

    /// 拉取单个实体自 `cursor` 以来变更的记录，空列表表示无变更
    async fn list_records(
        &self,
        entity_id: &str,
        token: &SecretString,
        cursor: &str,
    ) -> Result<Vec<Record>>;
}
