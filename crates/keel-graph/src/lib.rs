//! Keel Graph - Dependency inference and execution planning
//!
//! Turns a flat batch of tool calls into a DAG of ordering constraints and
//! reduces it to a leveled execution plan: each level is a set of calls
//! safe to run concurrently, levels run strictly in order.

mod builder;
mod conflicts;
mod graph;
mod plan;

pub use builder::{DependencyRule, GraphBuilder};
pub use conflicts::{find_resource_conflicts, ConflictKind, ResourceConflict};
pub use graph::{Dependency, DependencyGraph, DependencyKind, GraphError};
pub use plan::ExecutionPlan;
