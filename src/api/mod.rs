//! 对外 HTTP API
//!
//! - `POST /api/ingest`：事件上报
//! - `POST /api/validate-key`：校验 API Key
//! - `GET /api/analytics/total-token-usage`：Token 用量查询
//! - `GET /health`：存活探针

mod handlers;
mod middleware;
mod router;
mod service;
pub mod types;

pub use middleware::{ApiState, AuthenticatedUser};
pub use router::create_api_router;
pub use service::{IngestReport, IngestService};
