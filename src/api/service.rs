//! 事件上报业务逻辑

use std::sync::Arc;

use crate::relay::{Owned, RelayOutcome, SinkClient};
use crate::schema::{IngestionRequest, RecordKind};

use super::types::IngestResults;

/// 一次上报的汇总结果
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub results: IngestResults,
    /// 失败类别的错误描述，形如 `Tool calls: Record 1: ...`
    pub errors: Vec<String>,
}

impl IngestReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 事件上报服务
///
/// 五类记录互不依赖，并发投递、各自汇报，不做跨类回滚
pub struct IngestService {
    sink: Arc<SinkClient>,
}

fn own<'a, R>(records: &'a [R], user_id: &'a str) -> Vec<Owned<'a, R>> {
    records.iter().map(|r| Owned::new(r, user_id)).collect()
}

impl IngestService {
    pub fn new(sink: Arc<SinkClient>) -> Self {
        Self { sink }
    }

    /// 注入 user_id 后并发投递五类记录
    pub async fn ingest(&self, request: &IngestionRequest, user_id: &str) -> IngestReport {
        let tool_calls = own(&request.tool_calls, user_id);
        let prompt_metadata = own(&request.prompt_metadata, user_id);
        let prompt_executions = own(&request.prompt_executions, user_id);
        let test_runs = own(&request.test_runs, user_id);
        let test_cases = own(&request.test_cases, user_id);

        let (tool_calls, prompt_metadata, prompt_executions, test_runs, test_cases) = tokio::join!(
            self.sink.relay(RecordKind::ToolCalls, &tool_calls),
            self.sink.relay(RecordKind::PromptMetadata, &prompt_metadata),
            self.sink.relay(RecordKind::PromptExecutions, &prompt_executions),
            self.sink.relay(RecordKind::TestRuns, &test_runs),
            self.sink.relay(RecordKind::TestCases, &test_cases),
        );

        let results = IngestResults {
            tool_calls,
            prompt_metadata,
            prompt_executions,
            test_runs,
            test_cases,
        };
        let errors = collect_errors(&results, request);

        IngestReport { results, errors }
    }
}

/// 按类别汇总失败，并为每个类别输出一条结构化日志
fn collect_errors(results: &IngestResults, request: &IngestionRequest) -> Vec<String> {
    let per_kind: [(RecordKind, &RelayOutcome, usize); 5] = [
        (RecordKind::ToolCalls, &results.tool_calls, request.tool_calls.len()),
        (RecordKind::PromptMetadata, &results.prompt_metadata, request.prompt_metadata.len()),
        (RecordKind::PromptExecutions, &results.prompt_executions, request.prompt_executions.len()),
        (RecordKind::TestRuns, &results.test_runs, request.test_runs.len()),
        (RecordKind::TestCases, &results.test_cases, request.test_cases.len()),
    ];

    let mut errors = Vec::new();
    for (kind, outcome, records) in per_kind {
        if outcome.success {
            if records > 0 {
                tracing::info!(
                    kind = %kind,
                    records,
                    success = true,
                    quarantined_rows = outcome.quarantined_rows,
                    "{}",
                    outcome.message
                );
            }
            continue;
        }

        let detail = outcome.error.as_deref().unwrap_or(&outcome.message);
        tracing::error!(kind = %kind, records, success = false, error = %detail, "投递失败");
        errors.push(format!("{}: {}", kind.label(), detail));
    }
    errors
}
