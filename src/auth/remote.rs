//! 远程认证服务校验
//!
//! 调用认证服务的 `api-key/verify` 端点：
//! 请求 `{"key": "..."}`，响应 `{"valid": bool, "error": {"message": ..}, "key": {"userId": .., "metadata": ..}}`

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::common::truncate_with_ellipsis;
use crate::http_client::build_client;

use super::{ApiKeyValidation, ApiKeyValidator};

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    error: Option<VerifyError>,
    #[serde(default)]
    key: Option<VerifiedKey>,
}

#[derive(Debug, Deserialize)]
struct VerifyError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifiedKey {
    user_id: String,
    #[serde(default)]
    metadata: Option<Value>,
}

/// 远程 API Key 校验器
pub struct RemoteKeyValidator {
    client: Client,
    verify_url: String,
}

impl RemoteKeyValidator {
    pub fn new(verify_url: &str, proxy_url: Option<&str>, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self::with_client(build_client(proxy_url, timeout_secs)?, verify_url))
    }

    pub fn with_client(client: Client, verify_url: impl Into<String>) -> Self {
        Self {
            client,
            verify_url: verify_url.into(),
        }
    }
}

#[async_trait]
impl ApiKeyValidator for RemoteKeyValidator {
    async fn validate(&self, key: &str) -> anyhow::Result<ApiKeyValidation> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&json!({ "key": key }))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("认证服务请求失败: {}", e))?;

        let status = response.status();
        if status.is_client_error() {
            // 认证服务以 4xx 拒绝：按无效 key 处理
            return Ok(ApiKeyValidation::Invalid { error: None });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "认证服务返回 HTTP {}: {}",
                status,
                truncate_with_ellipsis(body.trim(), 256)
            );
        }

        let verify: VerifyResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("认证服务响应解析失败: {}", e))?;

        match (verify.valid, verify.key) {
            (true, Some(key)) => Ok(ApiKeyValidation::Valid {
                user_id: key.user_id,
                metadata: key
                    .metadata
                    .filter(|m| !m.is_null())
                    .unwrap_or_else(|| Value::Object(Map::new())),
            }),
            (true, None) => anyhow::bail!("认证服务响应缺少 key 信息"),
            (false, _) => Ok(ApiKeyValidation::Invalid {
                error: verify.error.and_then(|e| e.message),
            }),
        }
    }
}
