//! Dependency-injected service container

use keel_guard::{CycleGuard, CycleGuardConfig, DetectedCycle};
use keel_protocol::{ParallelExecutionResult, ToolCall, ToolExecutor};
use keel_scheduler::{ParallelScheduler, SchedulerConfig, SchedulerError};
use keel_txn::{TransactionManager, WorkspaceIo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::TransactionalExecutor;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyCoreConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub guard: CycleGuardConfig,
}

/// The execution-safety services, wired together and owned by the
/// agent-loop controller. Write tool calls are routed through the
/// transaction manager; everything else reaches the injected executor
/// directly.
pub struct SafetyCore {
    scheduler: ParallelScheduler,
    transactions: Arc<TransactionManager>,
    guard: CycleGuard,
}

impl SafetyCore {
    pub fn new(
        workspace: Arc<dyn WorkspaceIo>,
        executor: Arc<dyn ToolExecutor>,
        config: SafetyCoreConfig,
    ) -> Self {
        Self::with_manager(TransactionManager::new(workspace), executor, config)
    }

    /// Build around a pre-configured manager (hooks already registered).
    pub fn with_manager(
        manager: TransactionManager,
        executor: Arc<dyn ToolExecutor>,
        config: SafetyCoreConfig,
    ) -> Self {
        let transactions = Arc::new(manager);
        let txn_executor = Arc::new(TransactionalExecutor::new(transactions.clone(), executor));
        Self {
            scheduler: ParallelScheduler::new(txn_executor).with_config(config.scheduler),
            transactions,
            guard: CycleGuard::new(config.guard),
        }
    }

    /// Begin an agent session; must precede the first `run_iteration`.
    pub fn start_run(&mut self) {
        self.guard.start_run();
    }

    /// Finish the session, returning every cycle detected during it.
    pub fn end_run(&mut self) -> Vec<DetectedCycle> {
        self.guard.end_run()
    }

    /// Execute one iteration's batch and feed the outcome to the cycle
    /// guard. The returned cycle, if any, is a signal the caller may act
    /// on before the next iteration.
    pub async fn run_iteration(
        &mut self,
        batch: &[ToolCall],
        response_text: &str,
    ) -> Result<(ParallelExecutionResult, Option<DetectedCycle>), SchedulerError> {
        let result = self.scheduler.execute(batch).await?;

        let touched: Vec<PathBuf> = batch
            .iter()
            .filter_map(|c| c.file_path().map(|p| p.to_path_buf()))
            .collect();
        let cycle = self.guard.record_state(batch, &touched, response_text);
        tracing::debug!(
            calls = batch.len(),
            touched = touched.len(),
            cycle = cycle.is_some(),
            "iteration recorded"
        );

        Ok((result, cycle))
    }

    pub fn scheduler(&self) -> &ParallelScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut ParallelScheduler {
        &mut self.scheduler
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    pub fn guard_mut(&mut self) -> &mut CycleGuard {
        &mut self.guard
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.scheduler.cancellation_token()
    }

    /// Swap the scheduler's inner executor behind a fresh transactional
    /// wrapper; useful for tests and dry runs.
    pub fn set_executor(&mut self, executor: Arc<dyn ToolExecutor>) {
        let txn_executor = Arc::new(TransactionalExecutor::new(
            self.transactions.clone(),
            executor,
        ));
        self.scheduler.set_executor(txn_executor);
    }

    /// Update the scheduler's concurrency/timeout/retry settings.
    pub fn update_scheduler_config(&mut self, config: SchedulerConfig) {
        self.scheduler.update_config(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_guard::CycleKind;
    use keel_protocol::{ExecutorError, ToolParams};
    use keel_txn::MemoryWorkspace;
    use serde_json::json;
    use std::path::Path;

    fn passthrough() -> Arc<dyn ToolExecutor> {
        Arc::new(|call: ToolCall| async move { Ok::<_, ExecutorError>(json!({ "inner": call.id })) })
    }

    fn core_with(files: &[(&str, &str)]) -> SafetyCore {
        let ws = MemoryWorkspace::with_files(
            files
                .iter()
                .map(|(p, c)| (PathBuf::from(p), c.to_string())),
        );
        SafetyCore::new(Arc::new(ws), passthrough(), SafetyCoreConfig::default())
    }

    #[tokio::test]
    async fn test_iteration_orders_and_commits_writes() {
        let mut core = core_with(&[]);
        core.start_run();

        let batch = vec![
            ToolCall::new(
                "c",
                ToolParams::CreateFile {
                    path: PathBuf::from("a.rs"),
                    content: "let x = 1;".to_string(),
                },
            ),
            ToolCall::new(
                "r",
                ToolParams::ReplaceInFile {
                    path: PathBuf::from("a.rs"),
                    search: "1".to_string(),
                    replace: "2".to_string(),
                },
            ),
        ];

        let (result, cycle) = core.run_iteration(&batch, "wrote a.rs").await.unwrap();
        assert!(result.success, "failures: {:?}", result.results);
        assert_eq!(result.level_count, 2);
        assert!(cycle.is_none());

        let content = core
            .transactions()
            .workspace()
            .read(Path::new("a.rs"))
            .await
            .unwrap();
        assert_eq!(content.as_deref(), Some("let x = 2;"));
    }

    #[tokio::test]
    async fn test_repeated_iterations_flag_cycle() {
        let mut core = core_with(&[("a.rs", "x")]);
        core.start_run();

        let batch = vec![ToolCall::new(
            "r",
            ToolParams::ReadFile {
                path: PathBuf::from("a.rs"),
            },
        )];

        let (_, c1) = core.run_iteration(&batch, "same answer").await.unwrap();
        let (_, c2) = core.run_iteration(&batch, "same answer").await.unwrap();
        let (_, c3) = core.run_iteration(&batch, "same answer").await.unwrap();

        assert!(c1.is_none());
        assert!(c2.is_none());
        let cycle = c3.unwrap();
        assert_eq!(cycle.kind, CycleKind::Repetition);

        let cycles = core.end_run();
        assert_eq!(cycles.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_reported_not_fatal() {
        let mut core = core_with(&[("taken.rs", "x")]);
        core.start_run();

        let batch = vec![
            ToolCall::new(
                "bad",
                ToolParams::CreateFile {
                    path: PathBuf::from("taken.rs"),
                    content: "y".to_string(),
                },
            ),
            ToolCall::new(
                "ok",
                ToolParams::ReadFile {
                    path: PathBuf::from("other.rs"),
                },
            ),
        ];

        // Tight retries keep the failing call fast.
        core.update_scheduler_config(SchedulerConfig {
            retry_attempts: 0,
            retry_delay_ms: 1,
            ..Default::default()
        });

        let (result, _) = core.run_iteration(&batch, "attempt").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failed_ids, vec!["bad"]);
        assert_eq!(result.completed_ids, vec!["ok"]);
    }
}
