//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步服务的配置结构和解析逻辑。
//!
//! 配置在进程启动时从 TOML 文件加载一次，随后以引用方式传给各个组件。

use crate::error::{Result, SyncError};
use chrono::NaiveTime;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

/// 默认的全量刷新起点游标
pub const DEFAULT_EPOCH_FLOOR: &str = "20250101T000000";

/// 存储单文档硬上限（字节）
pub const DOCUMENT_CEILING_BYTES: usize = 1_048_576;

/// 大文档告警阈值（字节）
pub const LARGE_DOCUMENT_BYTES: usize = 900_000;

/// `reseed_after_days` 的上限（约一百年）
pub const MAX_RESEED_AFTER_DAYS: i64 = 36_500;

/// `forward_window_days` 的上限（约十年）
pub const MAX_FORWARD_WINDOW_DAYS: i64 = 3_650;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// 上游目录 API 配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API 根地址，不含末尾斜杠
    pub base_url: String,
    /// 访问令牌来源
    pub token: TokenSource,
    /// 单次请求超时时间（毫秒）
    pub request_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dgubasen.api.union.golfbox.io/DGUScorkortAapp".to_string(),
            token: TokenSource::Url {
                url: String::new(),
            },
            request_timeout_ms: 30_000,
        }
    }
}

/// 令牌来源
///
/// 令牌被视为不透明字符串，运行中不刷新
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenSource {
    /// 从密钥分发地址拉取，响应体去除首尾空白后即为令牌
    Url { url: String },
    /// 直接配置的令牌
    Static { value: SecretString },
}

/// 同步策略配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// 距上次成功播种超过该天数时强制全量刷新
    pub reseed_after_days: i64,
    /// 全量刷新使用的游标
    pub epoch_floor: String,
    /// 激活时间向前窗口（天）
    pub forward_window_days: i64,
    /// 全量写入的批次大小
    pub batch_size: usize,
    /// 大文档告警阈值（字节）
    pub warn_size_bytes: usize,
    /// 文档拒绝阈值（字节），达到即拒绝
    pub reject_size_bytes: usize,
    /// 整次运行的超时时间（秒）
    pub run_timeout_secs: u64,
    pub throttle: ThrottleConfig,
    pub lease: LeaseConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reseed_after_days: 30,
            epoch_floor: DEFAULT_EPOCH_FLOOR.to_string(),
            forward_window_days: 7,
            batch_size: 20,
            warn_size_bytes: LARGE_DOCUMENT_BYTES,
            reject_size_bytes: DOCUMENT_CEILING_BYTES,
            run_timeout_secs: 540,
            throttle: ThrottleConfig::default(),
            lease: LeaseConfig::default(),
        }
    }
}

/// 上游请求节流配置
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThrottleConfig {
    /// 每个实体之间固定休眠
    FixedDelay { delay_ms: u64 },
    /// 令牌桶
    TokenBucket {
        requests_per_second: u64,
        burst_capacity: u64,
    },
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        ThrottleConfig::FixedDelay { delay_ms: 300 }
    }
}

/// 同步租约配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LeaseConfig {
    pub enabled: bool,
    /// 租约过期时间（秒）
    pub ttl_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 600,
        }
    }
}

/// 存储后端类型
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// 进程内存储，仅用于演练与测试
    Memory,
}

/// 文档存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 所有键的前缀
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            connection_string: SecretString::new("redis://localhost:6379".into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            key_prefix: "course-cache".to_string(),
        }
    }
}

/// 定时触发配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 每日触发时间，`HH:MM`
    pub daily_at: String,
    /// IANA 时区名
    pub time_zone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: "02:00".to_string(),
            time_zone: "Europe/Copenhagen".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn daily_time(&self) -> std::result::Result<NaiveTime, String> {
        NaiveTime::parse_from_str(&self.daily_at, "%H:%M")
            .map_err(|e| format!("Invalid schedule daily_at '{}': {}", self.daily_at, e))
    }

    pub fn tz(&self) -> std::result::Result<chrono_tz::Tz, String> {
        self.time_zone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| format!("Invalid schedule time_zone '{}': {}", self.time_zone, e))
    }
}

/// 读取端配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ReaderConfig {
    /// 内存缓存过期时间（秒）
    pub cache_ttl_secs: u64,
    /// 内存缓存最大条目数
    pub max_capacity: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            max_capacity: 1000,
        }
    }
}

/// 日志与链路追踪配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 未设置 `RUST_LOG` 时使用的过滤规则
    pub log_filter: String,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            service_name: "coursecache".to_string(),
        }
    }
}

impl AppConfig {
    /// 从 TOML 字符串解析并验证配置
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(source).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate().map_err(SyncError::Config)?;
        Ok(config)
    }

    /// 从文件加载并验证配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值都在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = self.config_version {
            if version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        // 上游
        if self.upstream.base_url.is_empty() {
            return Err("upstream base_url cannot be empty".to_string());
        }
        match reqwest::Url::parse(&self.upstream.base_url) {
            Ok(url) if !url.cannot_be_a_base() => {}
            _ => {
                return Err(format!(
                    "upstream base_url '{}' is not a valid base URL",
                    self.upstream.base_url
                ))
            }
        }
        if !(100..=120_000).contains(&self.upstream.request_timeout_ms) {
            return Err("upstream request_timeout_ms must be between 100 and 120000 ms".to_string());
        }

        // 同步
        let sync = &self.sync;
        if !(1..=MAX_RESEED_AFTER_DAYS).contains(&sync.reseed_after_days) {
            return Err(format!(
                "sync reseed_after_days must be between 1 and {}",
                MAX_RESEED_AFTER_DAYS
            ));
        }
        if crate::compact_time::parse_compact(&sync.epoch_floor).is_none() {
            return Err(format!(
                "sync epoch_floor '{}' is not a compact timestamp (YYYYMMDDThhmmss)",
                sync.epoch_floor
            ));
        }
        if !(0..=MAX_FORWARD_WINDOW_DAYS).contains(&sync.forward_window_days) {
            return Err(format!(
                "sync forward_window_days must be between 0 and {}",
                MAX_FORWARD_WINDOW_DAYS
            ));
        }
        if sync.batch_size == 0 || sync.batch_size > 500 {
            return Err("sync batch_size must be between 1 and 500".to_string());
        }
        if sync.reject_size_bytes == 0 {
            return Err("sync reject_size_bytes cannot be zero".to_string());
        }
        if sync.warn_size_bytes >= sync.reject_size_bytes {
            return Err(format!(
                "sync warn_size_bytes ({}) must be below reject_size_bytes ({})",
                sync.warn_size_bytes, sync.reject_size_bytes
            ));
        }
        if sync.run_timeout_secs == 0 || sync.run_timeout_secs > 86400 {
            return Err("sync run_timeout_secs must be between 1 and 86400 seconds".to_string());
        }
        match &sync.throttle {
            ThrottleConfig::FixedDelay { delay_ms } => {
                if *delay_ms > 60_000 {
                    return Err("throttle delay_ms cannot exceed 60000 ms".to_string());
                }
            }
            ThrottleConfig::TokenBucket {
                requests_per_second,
                burst_capacity,
            } => {
                if *requests_per_second == 0 || *burst_capacity == 0 {
                    return Err(
                        "throttle requests_per_second and burst_capacity must be positive"
                            .to_string(),
                    );
                }
            }
        }
        if sync.lease.enabled && sync.lease.ttl_secs < sync.run_timeout_secs {
            return Err(format!(
                "lease ttl_secs ({}) must cover run_timeout_secs ({})",
                sync.lease.ttl_secs, sync.run_timeout_secs
            ));
        }

        // 存储
        if self.store.key_prefix.is_empty() || self.store.key_prefix.contains('*') {
            return Err("store key_prefix must be non-empty and contain no '*'".to_string());
        }
        if !(100..=30000).contains(&self.store.connection_timeout_ms) {
            return Err("store connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }
        if !(100..=60000).contains(&self.store.command_timeout_ms) {
            return Err("store command_timeout_ms must be between 100 and 60000 ms".to_string());
        }

        // 定时
        self.schedule.daily_time()?;
        self.schedule.tz()?;

        // 读取端
        if self.reader.max_capacity == 0 {
            return Err("reader max_capacity cannot be zero".to_string());
        }

        Ok(())
    }
}
