//! API 路由配置

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health, ingest, total_token_usage, validate_key};
use super::middleware::{ApiState, api_key_auth_middleware};

/// 上报请求体上限
const MAX_INGEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// 创建 API 路由
///
/// # 端点
/// - `POST /api/ingest` - 批量上报事件记录
/// - `POST /api/validate-key` - 校验 API Key
/// - `GET /api/analytics/total-token-usage` - 查询当前用户的 Token 用量
/// - `GET /health` - 存活探针（无需认证）
///
/// # 认证
/// 除 `/health` 外均需要 `x-api-key` header
///
/// 每个请求在最外层打开带 `request_id` 的 span，认证与处理阶段的日志都挂在其下
pub fn create_api_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route(
            "/api/ingest",
            post(ingest).layer(DefaultBodyLimit::max(MAX_INGEST_BODY_BYTES)),
        )
        .route("/api/validate-key", post(validate_key))
        .route("/api/analytics/total-token-usage", get(total_token_usage))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_auth_middleware,
        ))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %uuid::Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    )
}
