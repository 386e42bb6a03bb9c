//! API Key 校验模块
//!
//! 只回答一个问题：这个 key 是否有效、属于哪个用户。
//! 会话、签发、吊销都由外部认证服务负责。

mod remote;
mod static_keys;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::config::AuthConfig;

pub use remote::RemoteKeyValidator;
pub use static_keys::StaticKeyValidator;

/// 校验结果
#[derive(Debug, Clone, PartialEq)]
pub enum ApiKeyValidation {
    Valid { user_id: String, metadata: Value },
    /// `error` 为认证服务给出的原因（可能没有）
    Invalid { error: Option<String> },
}

/// API Key 校验器
///
/// 返回 `Err` 表示校验服务本身不可用，而不是 key 无效
#[async_trait]
pub trait ApiKeyValidator: Send + Sync {
    async fn validate(&self, key: &str) -> anyhow::Result<ApiKeyValidation>;
}

/// 按配置选择校验器：配置了 `verifyUrl` 用远程服务，否则用静态表
pub fn build_validator(
    config: &AuthConfig,
    proxy_url: Option<&str>,
    timeout_secs: u64,
) -> anyhow::Result<Arc<dyn ApiKeyValidator>> {
    match config.verify_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            tracing::info!("API Key 校验: 远程认证服务 {}", url);
            Ok(Arc::new(RemoteKeyValidator::new(url, proxy_url, timeout_secs)?))
        }
        None => {
            tracing::info!("API Key 校验: 静态配置（{} 个 key）", config.api_keys.len());
            Ok(Arc::new(StaticKeyValidator::new(config.api_keys.clone())))
        }
    }
}
