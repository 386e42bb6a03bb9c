//! 事件记录校验模块
//!
//! 把请求体（已解析的 JSON）校验为五类强类型记录，时间字段统一转为 UTC。

mod de;
mod error;
pub mod records;
pub mod timestamp;

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

pub use error::ValidationError;
pub use records::{PromptExecution, PromptMetadata, TestCase, TestEnvironment, TestRun, ToolCall};

/// 记录类别，同时也是 Tinybird datasource 名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    ToolCalls,
    PromptMetadata,
    PromptExecutions,
    TestRuns,
    TestCases,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::ToolCalls,
        RecordKind::PromptMetadata,
        RecordKind::PromptExecutions,
        RecordKind::TestRuns,
        RecordKind::TestCases,
    ];

    /// 请求体中的数组字段名 / datasource 名
    pub fn table_name(self) -> &'static str {
        match self {
            RecordKind::ToolCalls => "tool_calls",
            RecordKind::PromptMetadata => "prompt_metadata",
            RecordKind::PromptExecutions => "prompt_executions",
            RecordKind::TestRuns => "test_runs",
            RecordKind::TestCases => "test_cases",
        }
    }

    /// 错误汇总中使用的可读名称
    pub fn label(self) -> &'static str {
        match self {
            RecordKind::ToolCalls => "Tool calls",
            RecordKind::PromptMetadata => "Prompt metadata",
            RecordKind::PromptExecutions => "Prompt executions",
            RecordKind::TestRuns => "Test runs",
            RecordKind::TestCases => "Test cases",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// 一次 `/api/ingest` 请求中的全部记录
///
/// 五个数组都可以省略，省略即为空；显式的 null 不等于省略
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestionRequest {
    pub tool_calls: Vec<ToolCall>,
    pub prompt_metadata: Vec<PromptMetadata>,
    pub prompt_executions: Vec<PromptExecution>,
    pub test_runs: Vec<TestRun>,
    pub test_cases: Vec<TestCase>,
}

impl IngestionRequest {
    /// 校验整个请求体，返回第一个违规字段
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        // 派生的反序列化也接受数组形式的结构体，这里只认对象
        if !value.is_object() {
            return Err(ValidationError::field(
                "body",
                "Expected object with optional arrays tool_calls, prompt_metadata, \
                 prompt_executions, test_runs, test_cases",
            ));
        }
        serde_path_to_error::deserialize(value).map_err(ValidationError::from)
    }

    pub fn total_records(&self) -> usize {
        self.tool_calls.len()
            + self.prompt_metadata.len()
            + self.prompt_executions.len()
            + self.test_runs.len()
            + self.test_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }
}
