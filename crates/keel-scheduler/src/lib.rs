//! Keel Scheduler - Level-by-level parallel execution of tool-call batches
//!
//! Consumes an execution plan from `keel-graph` and runs each level with
//! bounded concurrency, per-call timeout and retry, and a single
//! cooperative abort signal. The scheduler itself is side-effect-free:
//! everything that touches the world goes through the injected executor.

mod config;
mod error;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::ParallelScheduler;
