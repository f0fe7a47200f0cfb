//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 访问令牌的获取。

use super::TokenProvider;
use crate::config::{TokenSource, UpstreamConfig};
use crate::error::{Result, SyncError};
use crate::utils::redaction::redact_url;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// 从密钥分发地址拉取令牌，响应体去除首尾空白后即为令牌
pub struct HttpTokenProvider {
    client: Client,
    url: String,
}

impl HttpTokenProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build token client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_token(&self) -> Result<SecretString> {
        debug!("Fetching access token from {}", redact_url(&self.url));
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::TokenFetch(e.without_url().to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::TokenFetch(e.without_url().to_string()))?;

        let token = body.trim();
        if token.is_empty() {
            return Err(SyncError::TokenFetch("empty token response".to_string()));
        }
        debug!("Fetched access token ({} chars)", token.len());
        Ok(SecretString::new(token.into()))
    }
}

/// 配置中直接给出的令牌
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> Result<SecretString> {
        if self.token.expose_secret().trim().is_empty() {
            return Err(SyncError::TokenFetch("static token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// 根据配置构造令牌提供者
pub fn token_provider(config: &UpstreamConfig) -> Result<Arc<dyn TokenProvider>> {
    match &config.token {
        TokenSource::Url { url } => {
            if url.is_empty() {
                return Err(SyncError::Config("upstream token url is empty".to_string()));
            }
            Ok(Arc::new(HttpTokenProvider::new(
                url.clone(),
                Duration::from_millis(config.request_timeout_ms),
            )?))
        }
        TokenSource::Static { value } => Ok(Arc::new(StaticTokenProvider::new(value.clone()))),
    }
}
