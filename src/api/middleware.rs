//! API Key 认证中间件

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::auth::{ApiKeyValidation, ApiKeyValidator};
use crate::common::auth::{extract_api_key, key_fingerprint};
use crate::relay::SinkClient;

use super::service::IngestService;
use super::types::ErrorResponse;

/// API 共享状态
#[derive(Clone)]
pub struct ApiState {
    /// API Key 校验器
    pub validator: Arc<dyn ApiKeyValidator>,
    /// Tinybird 客户端（查询用）
    pub sink: Arc<SinkClient>,
    /// 上报服务
    pub ingest: Arc<IngestService>,
}

impl ApiState {
    pub fn new(validator: Arc<dyn ApiKeyValidator>, sink: SinkClient) -> Self {
        let sink = Arc::new(sink);
        Self {
            validator,
            ingest: Arc::new(IngestService::new(sink.clone())),
            sink,
        }
    }
}

/// 已认证的调用方，由中间件写入请求扩展
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub metadata: Value,
}

/// API Key 认证中间件
///
/// 在读取请求体之前完成认证，失败时请求不会到达 handler
pub async fn api_key_auth_middleware(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(key) = extract_api_key(&request) else {
        tracing::warn!(path = %path, "缺少 API Key");
        return ErrorResponse::new("API key required").into_response_with(StatusCode::UNAUTHORIZED);
    };
    let fingerprint = key_fingerprint(&key);

    match state.validator.validate(&key).await {
        Ok(ApiKeyValidation::Valid { user_id, metadata }) => {
            tracing::debug!(path = %path, key = %fingerprint, user_id = %user_id, "API Key 校验通过");
            request
                .extensions_mut()
                .insert(AuthenticatedUser { user_id, metadata });
            next.run(request).await
        }
        Ok(ApiKeyValidation::Invalid { error }) => {
            tracing::warn!(path = %path, key = %fingerprint, reason = ?error, "API Key 无效");
            let message = error
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Invalid API key".to_string());
            ErrorResponse::new(message).into_response_with(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            tracing::error!(path = %path, key = %fingerprint, "API Key 校验服务异常: {:#}", e);
            ErrorResponse::with_details("Internal server error", e.to_string())
                .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
