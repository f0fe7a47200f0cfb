//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 上游目录 API 的 HTTP 客户端。

use super::{CatalogSource, EntityList};
use crate::config::UpstreamConfig;
use crate::error::{Result, SyncError};
use crate::model::{Entity, Record};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 目录 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: Client,
    base_url: Url,
}

impl HttpCatalogClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build catalog client: {}", e)))?;
        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                SyncError::Config(format!("Invalid catalog base URL '{}'", config.base_url))
            })?;
        Ok(Self { client, base_url })
    }

    /// 在基础地址后追加路径段，每段单独转义
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn clubs_url(&self) -> String {
        self.endpoint(&["clubs"]).to_string()
    }

    pub fn courses_url(&self, entity_id: &str, cursor: &str) -> String {
        let mut url = self.endpoint(&["clubs", entity_id, "courses"]);
        url.set_query(Some(&format!(
            "active=1&sort=ActivationDate:1&sortTee=TotalLength:1&changedsince={}",
            cursor
        )));
        url.to_string()
    }

    fn authorized(&self, url: &str, token: &SecretString) -> RequestBuilder {
        self.client
            .get(url)
            .header(AUTHORIZATION, token.expose_secret())
            .header(ACCEPT, "application/json")
    }

    /// 发送请求并解析 JSON 数组，错误统一为字符串描述
    async fn fetch_array(&self, url: &str, token: &SecretString) -> std::result::Result<Vec<Value>, String> {
        let response = self
            .authorized(url, token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)));
        }

        match response.json::<Value>().await.map_err(|e| e.to_string())? {
            Value::Array(items) => Ok(items),
            other => Err(format!("expected a JSON array, got {}", kind(&other))),
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogClient {
    #[instrument(skip(self, token), level = "debug")]
    async fn list_entities(&self, token: &SecretString) -> Result<EntityList> {
        let items = self
            .fetch_array(&self.clubs_url(), token)
            .await
            .map_err(SyncError::EntityList)?;

        let mut listing = EntityList::default();
        for item in items {
            match Entity::from_value(item) {
                Ok(entity) => listing.entities.push(entity),
                Err(e) => {
                    warn!("Skipping malformed entity in listing: {}", e);
                    listing.malformed += 1;
                }
            }
        }
        debug!(
            "Listed {} entities ({} malformed)",
            listing.entities.len(),
            listing.malformed
        );
        Ok(listing)
    }

    #[instrument(skip(self, token), level = "debug")]
    async fn list_records(
        &self,
        entity_id: &str,
        token: &SecretString,
        cursor: &str,
    ) -> Result<Vec<Record>> {
        let per_entity = |reason: String| SyncError::PerEntityFetch {
            entity_id: entity_id.to_string(),
            reason,
        };

        let items = self
            .fetch_array(&self.courses_url(entity_id, cursor), token)
            .await
            .map_err(per_entity)?;

        items
            .into_iter()
            .map(|item| Record::from_value(item).map_err(|e| per_entity(e.to_string())))
            .collect()
    }
}

fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Array(_) => "array",
    }
}
