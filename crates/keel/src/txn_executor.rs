//! Transaction-backed tool executor

use async_trait::async_trait;
use keel_protocol::{ExecutorError, ToolCall, ToolExecutor, ToolParams};
use keel_txn::{TransactionError, TransactionManager};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

/// Routes file-writing tool calls through a transaction and delegates
/// everything else to the inner executor.
///
/// Each write call gets its own transaction: stage, validate, commit. A
/// validation failure or commit error rolls the staged change back and
/// surfaces as an executor error, which the scheduler's retry wrapper
/// handles like any other tool failure.
pub struct TransactionalExecutor {
    transactions: Arc<TransactionManager>,
    inner: Arc<dyn ToolExecutor>,
}

impl TransactionalExecutor {
    pub fn new(transactions: Arc<TransactionManager>, inner: Arc<dyn ToolExecutor>) -> Self {
        Self { transactions, inner }
    }

    async fn commit_staged(&self, call: &ToolCall, txn: &str, path: &Path) -> Result<Value, ExecutorError> {
        let validation = self
            .transactions
            .validate(txn)
            .await
            .map_err(|e| self.fail(call, e))?;
        if !validation.valid {
            let _ = self.transactions.rollback(txn).await;
            let first = validation
                .errors
                .first()
                .map(|i| i.message.clone())
                .unwrap_or_else(|| "validation failed".to_string());
            return Err(ExecutorError::failed(call.tool_name(), first));
        }

        self.transactions
            .commit(txn)
            .await
            .map_err(|e| self.fail(call, e))?;
        Ok(json!({ "path": path.display().to_string(), "committed": true }))
    }

    fn fail(&self, call: &ToolCall, err: TransactionError) -> ExecutorError {
        ExecutorError::failed(call.tool_name(), err.to_string())
    }

    /// Stage `writeFile` semantics: modify when the file exists, create
    /// otherwise.
    async fn stage_write(
        &self,
        txn: &str,
        path: &Path,
        content: &str,
    ) -> Result<(), TransactionError> {
        match self.transactions.stage_modify(txn, path, content).await {
            Err(TransactionError::FileMissing { .. }) => {
                self.transactions.stage_create(txn, path, content).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl ToolExecutor for TransactionalExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<Value, ExecutorError> {
        match &call.params {
            ToolParams::WriteFile { path, content } => {
                let txn = self.transactions.begin_transaction().await;
                if let Err(e) = self.stage_write(&txn, path, content).await {
                    let _ = self.transactions.rollback(&txn).await;
                    return Err(self.fail(call, e));
                }
                self.commit_staged(call, &txn, path).await
            }
            ToolParams::CreateFile { path, content } => {
                let txn = self.transactions.begin_transaction().await;
                if let Err(e) = self.transactions.stage_create(&txn, path, content).await {
                    let _ = self.transactions.rollback(&txn).await;
                    return Err(self.fail(call, e));
                }
                self.commit_staged(call, &txn, path).await
            }
            ToolParams::DeleteFile { path } => {
                let txn = self.transactions.begin_transaction().await;
                if let Err(e) = self.transactions.stage_delete(&txn, path).await {
                    let _ = self.transactions.rollback(&txn).await;
                    return Err(self.fail(call, e));
                }
                self.commit_staged(call, &txn, path).await
            }
            ToolParams::ReplaceInFile { path, search, replace } => {
                let current = self
                    .transactions
                    .workspace()
                    .read(path)
                    .await
                    .map_err(|e| ExecutorError::failed(call.tool_name(), e.to_string()))?
                    .ok_or_else(|| {
                        ExecutorError::failed(
                            call.tool_name(),
                            format!("file not found: {}", path.display()),
                        )
                    })?;
                if !current.contains(search.as_str()) {
                    return Err(ExecutorError::failed(
                        call.tool_name(),
                        format!("search string not found in {}", path.display()),
                    ));
                }
                let updated = current.replace(search.as_str(), replace);

                let txn = self.transactions.begin_transaction().await;
                if let Err(e) = self.transactions.stage_modify(&txn, path, updated).await {
                    let _ = self.transactions.rollback(&txn).await;
                    return Err(self.fail(call, e));
                }
                self.commit_staged(call, &txn, path).await
            }
            _ => self.inner.execute(call).await,
        }
    }
}
