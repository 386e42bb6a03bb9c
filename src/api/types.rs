//! API 请求/响应类型

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relay::RelayOutcome;

/// 错误响应 `{ "error": "...", "details": "..." }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// 各 datasource 的投递结果
#[derive(Debug, Clone, Serialize)]
pub struct IngestResults {
    pub tool_calls: RelayOutcome,
    pub prompt_metadata: RelayOutcome,
    pub prompt_executions: RelayOutcome,
    pub test_runs: RelayOutcome,
    pub test_cases: RelayOutcome,
}

/// 全部成功（200）
#[derive(Debug, Serialize)]
pub struct IngestSuccessResponse {
    pub success: bool,
    pub message: String,
    pub results: IngestResults,
}

/// 部分或全部失败（500），已成功的部分不回滚
#[derive(Debug, Serialize)]
pub struct IngestFailureResponse {
    pub error: String,
    pub details: Vec<String>,
    pub results: IngestResults,
}

/// `POST /api/validate-key` 响应
#[derive(Debug, Serialize)]
pub struct ValidateKeyResponse {
    pub success: bool,
    pub user: String,
    pub metadata: Value,
}

/// `GET /api/analytics/total-token-usage` 查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageQuery {
    pub user_id: Option<String>,
    pub timeframe: Option<String>,
}
