//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存同步机制，包括策略决策、过滤去重、体积检查、批量持久化与运行引擎。

pub mod engine;
pub mod filter;
pub mod lease;
pub mod persister;
pub mod size_guard;
pub mod strategy;

pub use engine::{force_full_reseed, RunPhase, RunState, RunSummary, SyncEngine};
pub use filter::{filter, FilterPolicy};
pub use size_guard::{guard, SizeLimits, SizeReport, SizeStatus};
pub use strategy::{resolve_strategy, StrategyPolicy, SyncMode, SyncStrategy};
