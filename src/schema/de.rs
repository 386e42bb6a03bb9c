//! 特殊字段的反序列化规则
//!
//! 配合 `#[serde(deserialize_with = "...")]` 使用，失败时的错误信息
//! 会被 [`ValidationError`](super::ValidationError) 连同字段路径一起返回。

use serde::de::{Deserialize, Deserializer, Error};
use serde_json::Number;

use super::timestamp::normalize_utc;

/// 日期错误信息前缀，用于和其他字段错误区分
pub(crate) const INVALID_DATE: &str = "Invalid date format: ";

const NEGATIVE: &str = "Number must be greater than or equal to 0";

fn invalid_date<E: Error>(raw: &str) -> E {
    E::custom(format!("{INVALID_DATE}{raw}"))
}

/// 必填时间字段，归一化为 UTC
pub fn utc_timestamp<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    normalize_utc(&raw).ok_or_else(|| invalid_date(&raw))
}

/// 可选时间字段，null 视为未提供；需要配合 `#[serde(default)]`
pub fn opt_utc_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => normalize_utc(&raw).map(Some).ok_or_else(|| invalid_date(&raw)),
    }
}

/// 非负数（时长等）
pub fn non_negative<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = f64::deserialize(deserializer)?;
    if n < 0.0 {
        return Err(D::Error::custom(NEGATIVE));
    }
    Ok(n)
}

/// 非负整数（token 数、用例数等），允许 `5.0` 这种无小数部分的写法
pub fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = Number::deserialize(deserializer)?;
    if let Some(u) = n.as_u64() {
        return Ok(u);
    }
    match n.as_f64() {
        Some(f) if f < 0.0 => Err(D::Error::custom(NEGATIVE)),
        Some(f) if f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(D::Error::custom("Expected integer, received float")),
    }
}

/// 0/1 标志位
pub fn flag<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let n = Number::deserialize(deserializer)?;
    match n.as_f64() {
        Some(f) if f == 0.0 => Ok(0),
        Some(f) if f == 1.0 => Ok(1),
        _ => Err(D::Error::custom(format!("Must be 0 or 1, received {}", n))),
    }
}
