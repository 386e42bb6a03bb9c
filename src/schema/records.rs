//! 五类事件记录
//!
//! 每类记录对应 Tinybird 中的一个 datasource。序列化结果即为写入 Events API
//! 的行格式；`user_id` 不在记录中，由投递层注入，请求里同名字段会被忽略。

use serde::{Deserialize, Serialize};

use super::de;

/// 一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub cost_usd: f64,
    pub execution_id: String,
    pub execution_time_ms: f64,
    #[serde(deserialize_with = "de::count")]
    pub input_tokens: u64,
    #[serde(deserialize_with = "de::count")]
    pub output_tokens: u64,
    pub prompt_id: String,
    pub status: String,
    pub tool_call_id: String,
    /// 未提供时由 Tinybird 列默认值填充
    #[serde(
        default,
        deserialize_with = "de::opt_utc_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_call_timestamp: Option<String>,
    pub tool_name: String,
    pub error_message: Option<String>,
}

/// Prompt 定义的一个版本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub account_id: String,
    #[serde(
        default,
        deserialize_with = "de::opt_utc_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
    pub description: String,
    #[serde(deserialize_with = "de::flag")]
    pub is_active: u8,
    pub name: String,
    pub organization_id: String,
    pub prompt_id: String,
    pub prompt_text: String,
    #[serde(deserialize_with = "de::utc_timestamp")]
    pub updated_at: String,
    pub version: String,
}

/// 一次端到端的 Prompt 执行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExecution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub cost_usd: f64,
    pub execution_id: String,
    pub execution_time_ms: f64,
    #[serde(
        default,
        deserialize_with = "de::opt_utc_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub execution_timestamp: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub prompt_id: String,
    pub prompt_name: String,
    pub prompt_version: String,
    pub region: String,
    #[serde(deserialize_with = "de::count")]
    pub request_tokens: u64,
    #[serde(deserialize_with = "de::count")]
    pub response_tokens: u64,
    pub session_id: String,
    pub status: String,
    pub error_message: Option<String>,
}

/// 测试运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestEnvironment {
    Local,
    Ci,
    Production,
}

/// 一次测试会话的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub test_run_id: String,
    pub prompt_id: String,
    pub prompt_name: String,
    #[serde(deserialize_with = "de::count")]
    pub total_tests: u64,
    #[serde(deserialize_with = "de::count")]
    pub passed_tests: u64,
    #[serde(deserialize_with = "de::count")]
    pub failed_tests: u64,
    #[serde(deserialize_with = "de::non_negative")]
    pub duration_ms: f64,
    pub environment: TestEnvironment,
    #[serde(deserialize_with = "de::utc_timestamp")]
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
}

/// 测试会话中的单个断言
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub test_case_id: String,
    pub test_run_id: String,
    pub prompt_id: String,
    pub input: String,
    pub actual_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    pub passed: bool,
    #[serde(deserialize_with = "de::non_negative")]
    pub duration_ms: f64,
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(
        default,
        deserialize_with = "de::opt_utc_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
}
