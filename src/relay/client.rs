//! Tinybird Events / Pipes API 客户端
//!
//! Input: 已校验、已注入 user_id 的记录
//! Output: RelayOutcome（永不返回 Err，失败折叠进结果）
//! Pos: 投递层，对 Tinybird 的唯一出口

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::common::truncate_with_ellipsis;
use crate::http_client::build_client;
use crate::model::config::SinkConfig;
use crate::schema::RecordKind;

use super::types::{Delivery, RelayError, RelayOutcome};

/// 上游错误正文在日志/响应中的最大长度
const MAX_ERROR_BODY_BYTES: usize = 512;

/// Tinybird 客户端
///
/// 配置在进程启动时显式传入，不读取任何全局状态
#[derive(Clone)]
pub struct SinkClient {
    client: Client,
    base_url: String,
    token: String,
}

impl SinkClient {
    /// 按配置构建，`proxy_url` 为全局出站代理
    pub fn new(config: &SinkConfig, proxy_url: Option<&str>) -> anyhow::Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Tinybird Token 未配置"))?;
        let client = build_client(proxy_url, config.timeout_secs)?;
        Ok(Self::with_client(client, &config.base_url, token))
    }

    pub fn with_client(client: Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn events_url(&self, table: RecordKind) -> String {
        format!(
            "{}/v0/events?name={}",
            self.base_url,
            urlencoding::encode(table.table_name())
        )
    }

    /// POST 一次 Events API 并解析响应
    async fn post_events(
        &self,
        table: RecordKind,
        content_type: &'static str,
        body: String,
    ) -> Result<Delivery, RelayError> {
        let response = self
            .client
            .post(self.events_url(table))
            .bearer_auth(&self.token)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RelayError::Status {
                status,
                body: truncate_with_ellipsis(text.trim(), MAX_ERROR_BODY_BYTES),
            });
        }

        Ok(inspect_response_body(table, &text))
    }

    /// 整批发送（NDJSON）
    async fn send_batch<R: Serialize>(
        &self,
        table: RecordKind,
        rows: &[R],
    ) -> Result<Delivery, RelayError> {
        let lines = rows
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.post_events(table, "application/x-ndjson", lines.join("\n"))
            .await
    }

    /// 单条发送
    async fn send_single<R: Serialize>(
        &self,
        table: RecordKind,
        row: &R,
    ) -> Result<Delivery, RelayError> {
        let body = serde_json::to_string(row)?;
        self.post_events(table, "application/json", body).await
    }

    /// 投递一个 datasource 的全部记录
    ///
    /// 1. 空列表直接成功，不发请求
    /// 2. 先整批发送；成功即返回（隔离行只告警）
    /// 3. 整批失败则逐条顺序发送，汇总每条的成败
    pub async fn relay<R: Serialize + Sync>(&self, table: RecordKind, rows: &[R]) -> RelayOutcome {
        if rows.is_empty() {
            return RelayOutcome::no_data();
        }

        let total = rows.len();
        tracing::info!(kind = %table, records = total, "尝试整批投递");

        let batch_error = match self.send_batch(table, rows).await {
            Ok(delivery) => {
                tracing::info!(kind = %table, records = total, "整批投递成功");
                let suffix = if delivery.non_json {
                    " (non-JSON response)"
                } else {
                    ""
                };
                return RelayOutcome::succeeded(format!(
                    "Successfully sent batch of {} records to {}{}",
                    total, table, suffix
                ))
                .with_quarantined(delivery.quarantined_rows);
            }
            Err(e) => e,
        };

        tracing::warn!(
            kind = %table,
            records = total,
            error = %batch_error,
            "整批投递失败，回退为逐条发送"
        );

        let mut errors = Vec::new();
        let mut quarantined = 0u64;
        for (i, row) in rows.iter().enumerate() {
            match self.send_single(table, row).await {
                Ok(delivery) => quarantined += delivery.quarantined_rows,
                Err(e) => {
                    tracing::warn!(kind = %table, record = i + 1, error = %e, "单条投递失败");
                    errors.push(format!("Record {}: {}", i + 1, e));
                }
            }
        }

        if errors.is_empty() {
            tracing::info!(kind = %table, records = total, "逐条投递全部成功");
            RelayOutcome::succeeded(format!(
                "Successfully sent {}/{} records to {} (fallback mode)",
                total, total, table
            ))
            .with_quarantined(quarantined)
        } else {
            tracing::error!(
                kind = %table,
                failed = errors.len(),
                records = total,
                "逐条投递存在失败记录"
            );
            RelayOutcome::failed(
                format!(
                    "Failed to send {}/{} records to {} (fallback mode)",
                    errors.len(),
                    total,
                    table
                ),
                errors.join("; "),
            )
            .with_quarantined(quarantined)
        }
    }

    /// 查询 Pipe 端点（`/v0/pipes/<pipe>.json`），返回原始 JSON
    pub async fn query_pipe(&self, pipe: &str, params: &[(&str, &str)]) -> Result<Value, RelayError> {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let mut url = format!("{}/v0/pipes/{}.json", self.base_url, urlencoding::encode(pipe));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RelayError::Status {
                status,
                body: truncate_with_ellipsis(text.trim(), MAX_ERROR_BODY_BYTES),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// 解析 2xx 响应体
///
/// 空响应和非 JSON 响应都视为成功；`quarantined_rows > 0` 仅告警
fn inspect_response_body(table: RecordKind, text: &str) -> Delivery {
    let text = text.trim();
    if text.is_empty() {
        return Delivery::default();
    }

    let Ok(value) = serde_json::from_str::<Value>(text) else {
        tracing::warn!(
            kind = %table,
            body = %truncate_with_ellipsis(text, MAX_ERROR_BODY_BYTES),
            "Tinybird 返回非 JSON 响应"
        );
        return Delivery {
            quarantined_rows: 0,
            non_json: true,
        };
    };

    let quarantined_rows = value
        .get("quarantined_rows")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if quarantined_rows > 0 {
        tracing::warn!(
            kind = %table,
            quarantined_rows,
            "Tinybird 隔离了部分行，通常意味着 schema 不匹配"
        );
    }

    Delivery {
        quarantined_rows,
        non_json: false,
    }
}
