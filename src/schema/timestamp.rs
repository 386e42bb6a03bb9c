//! 时间字段归一化
//!
//! 接受常见的 ISO-8601 / RFC 3339 写法，统一输出为
//! `YYYY-MM-DDTHH:MM:SS.mmmZ`（UTC，毫秒精度）。

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// 无时区的日期时间格式，按 UTC 解释
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// 带数字时区但不符合 RFC 3339 的写法（如 `+0800`）
const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// 解析日期时间字符串，失败返回 None
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// 转换为 UTC ISO-8601 字符串
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 解析并归一化，失败返回 None
pub fn normalize_utc(input: &str) -> Option<String> {
    parse_datetime(input).map(|dt| format_utc(&dt))
}
