//! 投递结果与错误类型

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// 注入归属用户后的记录
///
/// `user_id` 只能由服务端在鉴权后写入，调用方提交的同名字段在校验阶段已被丢弃
#[derive(Debug, Serialize)]
pub struct Owned<'a, R> {
    #[serde(flatten)]
    pub record: &'a R,
    pub user_id: &'a str,
}

impl<'a, R> Owned<'a, R> {
    pub fn new(record: &'a R, user_id: &'a str) -> Self {
        Self { record, user_id }
    }
}

/// 单个 datasource 的投递结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayOutcome {
    pub success: bool,
    pub message: String,
    /// 失败时的错误描述（回退模式下为逐条错误拼接）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tinybird 报告的隔离行数（schema 不匹配信号，不视为失败）
    #[serde(skip_serializing_if = "is_zero")]
    pub quarantined_rows: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl RelayOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            quarantined_rows: 0,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            quarantined_rows: 0,
        }
    }

    /// 空列表，不发起网络请求
    pub fn no_data() -> Self {
        Self::succeeded("No data to send")
    }

    pub fn with_quarantined(mut self, rows: u64) -> Self {
        self.quarantined_rows = rows;
        self
    }
}

/// 单次 HTTP 投递失败
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Tinybird API error: {status} - {body}")]
    Status { status: StatusCode, body: String },

    #[error("Tinybird request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 一次成功的 POST 的响应摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub quarantined_rows: u64,
    /// 响应体非空且不是 JSON
    pub non_json: bool,
}
