//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步服务的日志与链路追踪初始化。

use crate::config::TelemetryConfig;
use crate::error::{Result, SyncError};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 初始化日志与 OpenTelemetry Tracing
///
/// 应在进程启动时调用一次。过滤规则优先取 `RUST_LOG`，否则使用配置值。
/// 未配置导出器时 tracer provider 不导出任何 span，只为 span 分配上下文。
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| SyncError::Config(format!("Invalid log filter: {}", e)))?;

    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(config.service_name.clone());

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| SyncError::Config(format!("Tracing already initialized: {}", e)))
}

/// 进程退出前关闭 tracer provider
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
