//! API 处理器

use axum::{
    Extension,
    extract::{
        Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use tracing::Instrument;

use crate::relay::RelayError;
use crate::schema::IngestionRequest;

use super::middleware::{ApiState, AuthenticatedUser};
use super::types::{
    ErrorResponse, IngestFailureResponse, IngestSuccessResponse, TokenUsageQuery,
    ValidateKeyResponse,
};

/// POST /api/ingest
///
/// 认证已由中间件完成；这里依次处理：读取请求体 → JSON 解析 → 校验 → 投递 → 汇总
pub async fn ingest(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let span = tracing::info_span!("ingest", user_id = %user.user_id);
    async move {
        match body {
            Ok(body) => handle_ingest(state, user, body).await,
            Err(rejection) => {
                tracing::warn!(status = %rejection.status(), "读取请求体失败: {}", rejection.body_text());
                rejection_response("Failed to read request body", rejection.status(), rejection.body_text())
            }
        }
    }
    .instrument(span)
    .await
}

/// 提取器失败时也返回 JSON 错误体
fn rejection_response(error: &str, status: StatusCode, details: String) -> Response {
    ErrorResponse::with_details(error, details).into_response_with(status)
}

async fn handle_ingest(state: ApiState, user: AuthenticatedUser, body: Bytes) -> Response {
    if body.iter().all(u8::is_ascii_whitespace) {
        tracing::warn!("请求体为空");
        return ErrorResponse::new("Request body is empty").into_response_with(StatusCode::BAD_REQUEST);
    }

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "请求体不是合法 JSON");
            return ErrorResponse::new("Invalid JSON in request body")
                .into_response_with(StatusCode::BAD_REQUEST);
        }
    };

    #[cfg(feature = "sensitive-logs")]
    tracing::debug!(body = %value, "收到上报请求体");

    let request = match IngestionRequest::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(field = %e.path(), error = %e, "请求数据校验失败");
            let error = if e.is_invalid_date() {
                "Invalid date format"
            } else {
                "Invalid request data"
            };
            return ErrorResponse::with_details(error, e.to_string())
                .into_response_with(StatusCode::BAD_REQUEST);
        }
    };

    tracing::info!(
        tool_calls = request.tool_calls.len(),
        prompt_metadata = request.prompt_metadata.len(),
        prompt_executions = request.prompt_executions.len(),
        test_runs = request.test_runs.len(),
        test_cases = request.test_cases.len(),
        "请求校验通过，开始投递"
    );

    let report = state.ingest.ingest(&request, &user.user_id).await;

    if report.success() {
        tracing::info!(records = request.total_records(), "上报完成");
        Json(IngestSuccessResponse {
            success: true,
            message: "Data successfully ingested".to_string(),
            results: report.results,
        })
        .into_response()
    } else {
        tracing::error!(failed_kinds = report.errors.len(), "上报部分失败");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(IngestFailureResponse {
                error: "Data ingestion failed".to_string(),
                details: report.errors,
                results: report.results,
            }),
        )
            .into_response()
    }
}

/// POST /api/validate-key
pub async fn validate_key(Extension(user): Extension<AuthenticatedUser>) -> impl IntoResponse {
    Json(ValidateKeyResponse {
        success: true,
        user: user.user_id,
        metadata: user.metadata,
    })
}

/// GET /api/analytics/total-token-usage
pub async fn total_token_usage(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    query: Result<Query<TokenUsageQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::warn!(user_id = %user.user_id, "查询参数无效: {}", rejection.body_text());
            return rejection_response("Invalid query parameters", rejection.status(), rejection.body_text());
        }
    };

    // 只能查询自己的数据
    if let Some(requested) = query.user_id.as_deref() {
        if requested != user.user_id {
            tracing::warn!(user_id = %user.user_id, requested = %requested, "越权查询 Token 用量");
            return ErrorResponse::new("Unauthorized").into_response_with(StatusCode::UNAUTHORIZED);
        }
    }

    let timeframe = query
        .timeframe
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("24h");

    match state
        .sink
        .query_pipe(
            "total_token_usage",
            &[("userId", user.user_id.as_str()), ("timeframe", timeframe)],
        )
        .await
    {
        Ok(data) => Json(data).into_response(),
        Err(RelayError::Encode(e)) => {
            tracing::error!("Token 用量响应不是合法 JSON: {}", e);
            ErrorResponse::with_details("Internal server error", e.to_string())
                .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            tracing::error!("查询 Token 用量失败: {}", e);
            ErrorResponse::new("Failed to fetch data from Tinybird")
                .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
