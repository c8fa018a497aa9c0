//! Scheduler error types

use keel_graph::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("cancelled")]
    Cancelled,
}
