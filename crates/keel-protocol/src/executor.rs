//! The executor seam: the only way tool calls touch the world

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::ToolCall;

/// Error raised by an injected executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("tool {tool} failed: {message}")]
    Failed { tool: String, message: String },

    #[error("no executor configured")]
    NotConfigured,
}

impl ExecutorError {
    pub fn failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Executes a single tool call against the workspace.
///
/// Supplied by the agent loop; the scheduler never touches the world
/// directly and is safe to re-run with a different executor for testing.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<Value, ExecutorError>;
}

#[async_trait]
impl<F, Fut> ToolExecutor for F
where
    F: Fn(ToolCall) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, ExecutorError>> + Send,
{
    async fn execute(&self, call: &ToolCall) -> Result<Value, ExecutorError> {
        (self)(call.clone()).await
    }
}
