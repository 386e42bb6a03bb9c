//! 校验错误

use thiserror::Error;

use super::de::INVALID_DATE;

/// 记录校验失败，只报告遇到的第一个违规字段
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 字段缺失、类型不符或取值越界
    #[error("{path}: {reason}")]
    Field { path: String, reason: String },

    /// 时间字段无法解析为日期
    #[error("{path}: Invalid date format: {value}")]
    InvalidDate { path: String, value: String },
}

impl ValidationError {
    pub fn field(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Field {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_date(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidDate {
            path: path.into(),
            value: value.into(),
        }
    }

    /// 违规字段路径，如 `prompt_metadata[0].is_active`
    pub fn path(&self) -> &str {
        match self {
            Self::Field { path, .. } | Self::InvalidDate { path, .. } => path,
        }
    }

    pub fn is_invalid_date(&self) -> bool {
        matches!(self, Self::InvalidDate { .. })
    }
}

/// serde 报告的字段路径与错误，转换为对外的校验错误
///
/// 根路径记为 `body`；缺失字段的路径指向字段本身而不是所在记录
impl From<serde_path_to_error::Error<serde_json::Error>> for ValidationError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        let reason = err.inner().to_string();
        let at_root = path == ".";

        if let Some(field) = reason
            .strip_prefix("missing field `")
            .and_then(|r| r.strip_suffix('`'))
        {
            let path = if at_root {
                field.to_string()
            } else {
                format!("{}.{}", path, field)
            };
            return Self::field(path, "Required");
        }

        let path = if at_root { "body".to_string() } else { path };
        match reason.strip_prefix(INVALID_DATE) {
            Some(value) => Self::invalid_date(path, value),
            None => Self::field(path, reason),
        }
    }
}
