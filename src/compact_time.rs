//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 上游目录使用的紧凑时间格式 `YYYYMMDDThhmmss` 的解析与格式化。
//!
//! 紧凑时间一律按 UTC 解释。解析永不 panic：长度不符、缺少 `T`、
//! 含非数字字符或日历值越界时返回 `None`（即“不可解析”）。

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// 紧凑时间字符串的固定长度
pub const COMPACT_LEN: usize = 15;

const COMPACT_FORMAT: &str = "%Y%m%dT%H%M%S";

/// 解析紧凑时间字符串
///
/// # 示例
/// ```
/// use coursecache::compact_time::{format_compact, parse_compact};
/// let dt = parse_compact("20241010T092806").unwrap();
/// assert_eq!(format_compact(&dt), "20241010T092806");
/// assert!(parse_compact("2024-10-10").is_none());
/// ```
pub fn parse_compact(value: &str) -> Option<DateTime<Utc>> {
    let bytes = value.as_bytes();
    if bytes.len() != COMPACT_LEN || bytes[8] != b'T' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 8 || b.is_ascii_digit());
    if !digits_ok {
        return None;
    }

    let field = |start: usize, end: usize| -> u32 {
        bytes[start..end]
            .iter()
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
    };

    let year = i32::try_from(field(0, 4)).ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4, 6), field(6, 8))?.and_hms_opt(
        field(9, 11),
        field(11, 13),
        field(13, 15),
    )?;
    Some(Utc.from_utc_datetime(&naive))
}

/// 将时间格式化为紧凑时间字符串
pub fn format_compact(value: &DateTime<Utc>) -> String {
    value.format(COMPACT_FORMAT).to_string()
}

/// 解析可选的紧凑时间字段，缺失与不可解析同等对待
pub fn parse_optional(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(parse_compact)
}
