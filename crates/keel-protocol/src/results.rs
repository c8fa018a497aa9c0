//! Execution result types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one tool call after timeout/retry wrapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub tool_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Retries actually performed (0 = succeeded first try)
    pub retries: u32,
}

impl ToolExecutionResult {
    pub fn succeeded(tool_id: impl Into<String>, output: Value, duration_ms: u64, retries: u32) -> Self {
        Self {
            tool_id: tool_id.into(),
            success: true,
            output: Some(output),
            error: None,
            duration_ms,
            retries,
        }
    }

    pub fn failed(tool_id: impl Into<String>, error: impl Into<String>, duration_ms: u64, retries: u32) -> Self {
        Self {
            tool_id: tool_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
            retries,
        }
    }
}

/// Aggregate outcome of a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelExecutionResult {
    /// True iff every call in the batch succeeded
    pub success: bool,
    pub results: Vec<ToolExecutionResult>,
    pub completed_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    pub total_duration_ms: u64,
    pub level_count: usize,
}

impl ParallelExecutionResult {
    /// Collect per-call results into the aggregate.
    pub fn from_results(results: Vec<ToolExecutionResult>, total_duration_ms: u64, level_count: usize) -> Self {
        let completed_ids: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.tool_id.clone())
            .collect();
        let failed_ids: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.tool_id.clone())
            .collect();
        Self {
            success: failed_ids.is_empty(),
            results,
            completed_ids,
            failed_ids,
            total_duration_ms,
            level_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_partitions_ids() {
        let results = vec![
            ToolExecutionResult::succeeded("a", serde_json::json!("ok"), 5, 0),
            ToolExecutionResult::failed("b", "boom", 7, 2),
        ];
        let agg = ParallelExecutionResult::from_results(results, 12, 1);
        assert!(!agg.success);
        assert_eq!(agg.completed_ids, vec!["a"]);
        assert_eq!(agg.failed_ids, vec!["b"]);
        assert_eq!(agg.level_count, 1);
    }

    #[test]
    fn test_aggregate_success_when_no_failures() {
        let results = vec![ToolExecutionResult::succeeded("a", serde_json::json!(1), 3, 0)];
        let agg = ParallelExecutionResult::from_results(results, 3, 1);
        assert!(agg.success);
        assert!(agg.failed_ids.is_empty());
    }
}
