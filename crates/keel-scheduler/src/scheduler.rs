//! Parallel scheduler

use futures::future::join_all;
use keel_graph::{ExecutionPlan, GraphBuilder};
use keel_protocol::{ParallelExecutionResult, ToolCall, ToolExecutionResult, ToolExecutor};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{SchedulerConfig, SchedulerError};

/// Runs planned batches level by level with bounded concurrency.
///
/// Within a level, calls run in chunks no larger than
/// `max_concurrency`; the whole chunk is awaited before the next chunk of
/// the same level starts. Calls in different levels are strictly ordered.
pub struct ParallelScheduler {
    builder: GraphBuilder,
    executor: Arc<dyn ToolExecutor>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl ParallelScheduler {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            builder: GraphBuilder::new(),
            executor,
            config: SchedulerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Swap the executor; safe to do between runs for testing.
    pub fn set_executor(&mut self, executor: Arc<dyn ToolExecutor>) {
        self.executor = executor;
    }

    pub fn update_config(&mut self, config: SchedulerConfig) {
        self.config = config;
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Plan the batch and execute it level by level.
    ///
    /// A call that fails after exhausting retries is recorded in
    /// `failed_ids` but does not stop later levels: callers inspect the
    /// aggregate to decide whether to abort the iteration. Calls the plan
    /// could never schedule are reported as failures too.
    pub async fn execute(&self, batch: &[ToolCall]) -> Result<ParallelExecutionResult, SchedulerError> {
        let graph = self.builder.build_dependency_graph(batch)?;
        let plan = ExecutionPlan::from_graph(&graph);
        let started = Instant::now();
        let mut results: Vec<ToolExecutionResult> = Vec::with_capacity(batch.len());

        for (level_idx, level) in plan.levels.iter().enumerate() {
            for chunk in level.chunks(self.config.max_concurrency.max(1)) {
                if self.cancel.is_cancelled() {
                    return Err(SchedulerError::Cancelled);
                }
                let chunk_results = join_all(chunk.iter().map(|call| self.run_one(call))).await;
                for result in chunk_results {
                    results.push(result?);
                }
            }
            tracing::debug!(
                level = level_idx,
                calls = level.len(),
                "level executed"
            );
        }

        for id in &plan.unscheduled {
            let missing = graph
                .unsatisfied()
                .get(id)
                .map(|dep| format!("declared dependency {dep} is not in the batch"))
                .unwrap_or_else(|| "declared dependency was never satisfied".to_string());
            results.push(ToolExecutionResult::failed(
                id.clone(),
                format!("never scheduled: {missing}"),
                0,
                0,
            ));
        }

        let total = started.elapsed().as_millis() as u64;
        let aggregate =
            ParallelExecutionResult::from_results(results, total, plan.levels.len());
        tracing::info!(
            completed = aggregate.completed_ids.len(),
            failed = aggregate.failed_ids.len(),
            levels = aggregate.level_count,
            total_ms = aggregate.total_duration_ms,
            "batch executed"
        );
        Ok(aggregate)
    }

    /// Fallback mode: ignore the plan and run every call one at a time
    /// with the same timeout/retry wrapper. Used when the caller has
    /// decided parallel execution is unsafe.
    pub async fn execute_sequential(
        &self,
        batch: &[ToolCall],
    ) -> Result<ParallelExecutionResult, SchedulerError> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(batch.len());
        for call in batch {
            if self.cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            results.push(self.run_one(call).await?);
        }
        let total = started.elapsed().as_millis() as u64;
        Ok(ParallelExecutionResult::from_results(results, total, batch.len()))
    }

    /// One call wrapped with timeout and retry; cancellation is polled
    /// before each backoff sleep.
    async fn run_one(&self, call: &ToolCall) -> Result<ToolExecutionResult, SchedulerError> {
        let started = Instant::now();
        let mut retries = 0u32;
        let mut last_error;

        loop {
            let attempt = self
                .executor
                .execute(call);
            match tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), attempt).await
            {
                Ok(Ok(output)) => {
                    return Ok(ToolExecutionResult::succeeded(
                        call.id.clone(),
                        output,
                        started.elapsed().as_millis() as u64,
                        retries,
                    ));
                }
                Ok(Err(err)) => last_error = err.to_string(),
                Err(_) => {
                    last_error = format!("timed out after {}ms", self.config.timeout_ms)
                }
            }

            if retries >= self.config.retry_attempts {
                tracing::warn!(tool_id = %call.id, error = %last_error, retries, "tool call failed");
                return Ok(ToolExecutionResult::failed(
                    call.id.clone(),
                    last_error,
                    started.elapsed().as_millis() as u64,
                    retries,
                ));
            }

            if self.cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            let delay = self.config.retry_delay_ms.saturating_mul(1u64 << retries.min(16));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            retries += 1;
        }
    }
}
