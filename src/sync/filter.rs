//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 记录过滤与去重管道。
//!
//! 依次执行：仅保留活跃记录；仅保留激活时间缺失、不可解析或不晚于
//! `now + forward_window` 的记录；按模板标识折叠，每个非空模板只保留
//! 激活时间最晚的一条。窗口溢出时视为无上限。该函数是纯函数，且满足幂等。

use crate::compact_time::parse_optional;
use crate::model::Record;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// 过滤策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPolicy {
    /// 允许缓存的未来激活窗口
    pub forward_window: Duration,
}

impl FilterPolicy {
    /// 超出 `Duration` 表示范围的天数按最大窗口处理
    pub fn from_days(days: i64) -> Self {
        Self {
            forward_window: Duration::try_days(days).unwrap_or(Duration::MAX),
        }
    }
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::from_days(7)
    }
}

/// 过滤并去重记录
///
/// 输出顺序：各模板的胜出记录按模板首次出现的顺序排列，
/// 其后是无模板记录，保持输入顺序。
pub fn filter(records: Vec<Record>, now: DateTime<Utc>, policy: &FilterPolicy) -> Vec<Record> {
    let horizon = now
        .checked_add_signed(policy.forward_window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut winners: Vec<Record> = Vec::new();
    let mut slot_by_template: HashMap<String, usize> = HashMap::new();
    let mut untemplated: Vec<Record> = Vec::new();

    for record in records {
        if !record.is_active || !within_horizon(&record, horizon) {
            continue;
        }

        if record.template_id.is_empty() {
            untemplated.push(record);
            continue;
        }

        match slot_by_template.get(&record.template_id) {
            Some(&slot) => {
                if supersedes(&record, &winners[slot]) {
                    winners[slot] = record;
                }
            }
            None => {
                slot_by_template.insert(record.template_id.clone(), winners.len());
                winners.push(record);
            }
        }
    }

    winners.extend(untemplated);
    winners
}

/// 只保留过滤后仍然生效（激活时间不晚于 `now`）的记录
///
/// 读取端使用的更严格规则，缺失或不可解析的激活时间视为已生效。
pub fn activated_by(records: &[Record], now: DateTime<Utc>) -> Vec<Record> {
    records
        .iter()
        .filter(|r| within_horizon(r, now))
        .cloned()
        .collect()
}

fn within_horizon(record: &Record, horizon: DateTime<Utc>) -> bool {
    match parse_optional(record.activation_date.as_deref()) {
        Some(activation) => activation <= horizon,
        None => true,
    }
}

/// 候选记录是否取代当前胜出者
///
/// 只有可解析的激活时间才能取代：严格晚于胜出者，或胜出者没有激活时间。
/// 相等、候选不可解析、胜出者的激活时间存在但不可解析时保留先出现者。
fn supersedes(candidate: &Record, incumbent: &Record) -> bool {
    let Some(candidate_at) = parse_optional(candidate.activation_date.as_deref()) else {
        return false;
    };
    match incumbent.activation_date.as_deref() {
        None => true,
        Some(raw) => parse_optional(Some(raw)).map_or(false, |at| candidate_at > at),
    }
}
