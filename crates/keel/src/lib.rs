//! Keel - Execution-safety core for an autonomous coding agent
//!
//! An AI model proposes a batch of tool invocations per reasoning step;
//! keel decides which may run concurrently, applies file mutations with
//! all-or-nothing semantics, and detects when the reasoning loop has
//! degenerated into a non-productive repeating pattern.
//!
//! The services are explicitly constructed, dependency-injected instances
//! owned by the agent-loop controller; [`SafetyCore`] wires them together.

mod core;
mod txn_executor;

pub use crate::core::{SafetyCore, SafetyCoreConfig};
pub use txn_executor::TransactionalExecutor;

pub use keel_graph::{
    find_resource_conflicts, ConflictKind, Dependency, DependencyGraph, DependencyKind,
    ExecutionPlan, GraphBuilder, GraphError, ResourceConflict,
};
pub use keel_guard::{
    CycleBreakStrategy, CycleGuard, CycleGuardConfig, CycleKind, DetectedCycle, Severity,
    StateFingerprint,
};
pub use keel_protocol::{
    ExecutorError, ParallelExecutionResult, ToolCall, ToolExecutionResult, ToolExecutor, ToolParams,
};
pub use keel_scheduler::{ParallelScheduler, SchedulerConfig, SchedulerError};
pub use keel_txn::{
    LocalWorkspace, MemoryWorkspace, TransactionError, TransactionManager, TransactionStatus,
    ValidationResult, WorkspaceIo,
};
