use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 覆盖 `sink.token` 的环境变量
pub const SINK_TOKEN_ENV: &str = "TINYBIRD_TOKEN";
/// 覆盖 `sink.baseUrl` 的环境变量
pub const SINK_BASE_URL_ENV: &str = "TINYBIRD_BASE_URL";

/// 事件分析平台（Tinybird）连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkConfig {
    /// Events / Pipes API 基础地址
    #[serde(default = "default_sink_base_url")]
    pub base_url: String,

    /// Bearer Token（可由环境变量 TINYBIRD_TOKEN 提供）
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// 单次 HTTP 请求超时（秒）
    #[serde(default = "default_sink_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_sink_base_url() -> String {
    "https://api.us-east.aws.tinybird.co".to_string()
}

fn default_sink_timeout_secs() -> u64 {
    30
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: default_sink_base_url(),
            token: None,
            timeout_secs: default_sink_timeout_secs(),
        }
    }
}

/// 静态 API Key 条目
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
    /// 附带的元数据，原样返回给 validate-key 调用方
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// API Key 校验配置
///
/// 配置了 `verifyUrl` 时使用远程认证服务，否则使用 `apiKeys` 静态表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_url: Option<String>,

    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    pub proxy_url: Option<String>,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// 配置文件路径（运行时元数据，不写入 JSON）
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            proxy_url: None,
            sink: SinkConfig::default(),
            auth: AuthConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 获取配置文件路径（如果有）
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 用环境变量覆盖 Sink 配置
    ///
    /// `lookup` 通常为 `std::env::var(..).ok()`，测试中可替换
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(SINK_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.sink.token = Some(token);
        }
        if let Some(url) = lookup(SINK_BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.sink.base_url = url;
        }
    }

    /// 启动前校验：必须有 Sink Token
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.sink.token.as_deref() {
            Some(t) if !t.trim().is_empty() => {}
            _ => anyhow::bail!(
                "缺少 Tinybird Token：请设置环境变量 {} 或配置 sink.token",
                SINK_TOKEN_ENV
            ),
        }
        if self.sink.base_url.trim().is_empty() {
            anyhow::bail!("sink.baseUrl 不能为空");
        }
        if self.auth.verify_url.is_none() && self.auth.api_keys.is_empty() {
            tracing::warn!("未配置 auth.verifyUrl 且 auth.apiKeys 为空，所有请求都将被拒绝");
        }
        Ok(())
    }
}
