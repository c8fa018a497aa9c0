//! Leveled execution plan

use keel_protocol::ToolCall;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::graph::DependencyGraph;

/// Assumed per-call duration when the model did not estimate one.
const DEFAULT_DURATION_MS: u64 = 1000;

/// A leveled ordering of tool calls: each level is a set of calls safe to
/// run concurrently, and level n+1 never starts before level n finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub levels: Vec<Vec<ToolCall>>,
    /// Longest dependency chain through the graph, in execution order
    pub critical_path: Vec<String>,
    /// Best-case parallel wall clock: sum of each level's slowest call
    pub estimated_total_ms: u64,
    /// Calls that share a level with at least one other call
    pub parallelizable_count: usize,
    /// Calls left at positive in-degree forever (unsatisfiable or cyclic
    /// `depends_on` declarations); they appear in no level
    pub unscheduled: Vec<String>,
}

impl ExecutionPlan {
    /// Level-by-level topological reduction (Kahn's algorithm) of a built
    /// graph.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
        for call in graph.calls() {
            let mut degree = graph.in_degree(&call.id);
            if graph.unsatisfied().contains_key(&call.id) {
                // Phantom edge from an id that is not in the batch.
                degree += 1;
            }
            in_degree.insert(call.id.as_str(), degree);
        }

        let mut levels: Vec<Vec<ToolCall>> = Vec::new();
        let mut done: std::collections::HashSet<&str> = std::collections::HashSet::new();

        loop {
            // All zero-in-degree unprocessed nodes, in submission order.
            let ready: Vec<&ToolCall> = graph
                .calls()
                .filter(|c| !done.contains(c.id.as_str()) && in_degree[c.id.as_str()] == 0)
                .collect();
            if ready.is_empty() {
                break;
            }
            for call in &ready {
                done.insert(call.id.as_str());
                for edge in graph.dependents_of(&call.id) {
                    if let Some(d) = in_degree.get_mut(edge.to.as_str()) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
            levels.push(ready.into_iter().cloned().collect());
        }

        let unscheduled: Vec<String> = graph
            .calls()
            .filter(|c| !done.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect();

        let estimated_total_ms = levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|c| c.estimated_duration_ms.unwrap_or(DEFAULT_DURATION_MS))
                    .max()
                    .unwrap_or(0)
            })
            .sum();

        let parallelizable_count = levels
            .iter()
            .filter(|level| level.len() > 1)
            .map(Vec::len)
            .sum();

        let critical_path = longest_path(graph, &levels);

        let plan = Self {
            levels,
            critical_path,
            estimated_total_ms,
            parallelizable_count,
            unscheduled,
        };
        tracing::debug!(
            levels = plan.levels.len(),
            estimated_total_ms = plan.estimated_total_ms,
            unscheduled = plan.unscheduled.len(),
            "execution plan created"
        );
        plan
    }

    pub fn call_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Longest dependency chain, one memoized reverse-topological pass.
///
/// `levels` is already a topological order, so walking it back to front
/// guarantees every successor's chain length is known before its
/// predecessors ask for it. Ties break to the first node in submission
/// order.
fn longest_path(graph: &DependencyGraph, levels: &[Vec<ToolCall>]) -> Vec<String> {
    let mut chain_len: HashMap<&str, usize> = HashMap::new();
    let mut next_hop: HashMap<&str, &str> = HashMap::new();

    for level in levels.iter().rev() {
        for call in level {
            let mut best = 1usize;
            let mut hop: Option<&str> = None;
            for edge in graph.dependents_of(&call.id) {
                if let Some((&to, &len)) = chain_len.get_key_value(edge.to.as_str()) {
                    if len + 1 > best {
                        best = len + 1;
                        hop = Some(to);
                    }
                }
            }
            chain_len.insert(call.id.as_str(), best);
            if let Some(h) = hop {
                next_hop.insert(call.id.as_str(), h);
            }
        }
    }

    // First-found source with the longest chain, in submission order.
    let mut start: Option<&str> = None;
    let mut best = 0usize;
    for call in graph.calls() {
        if let Some(&len) = chain_len.get(call.id.as_str()) {
            if len > best {
                best = len;
                start = Some(call.id.as_str());
            }
        }
    }

    let mut path = Vec::with_capacity(best);
    let mut cursor = start;
    while let Some(id) = cursor {
        path.push(id.to_string());
        cursor = next_hop.get(id).copied();
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use keel_protocol::ToolParams;
    use std::path::PathBuf;

    fn write(id: &str, path: &str) -> ToolCall {
        ToolCall::new(
            id,
            ToolParams::WriteFile {
                path: PathBuf::from(path),
                content: String::new(),
            },
        )
    }

    fn read(id: &str, path: &str) -> ToolCall {
        ToolCall::new(
            id,
            ToolParams::ReadFile {
                path: PathBuf::from(path),
            },
        )
    }

    #[test]
    fn test_read_write_chain_levels() {
        let builder = GraphBuilder::new();
        let plan = builder
            .create_execution_plan(&[read("r", "x"), write("w", "x")])
            .unwrap();
        assert_eq!(plan.levels.len(), 2);
        assert_eq!(plan.levels[0][0].id, "r");
        assert_eq!(plan.levels[1][0].id, "w");
        assert_eq!(plan.critical_path, vec!["r", "w"]);
    }

    #[test]
    fn test_levels_are_topological() {
        let builder = GraphBuilder::new();
        let batch = vec![
            write("w1", "a"),
            read("r1", "a"),
            write("w2", "a"),
            read("other", "b"),
        ];
        let plan = builder.create_execution_plan(&batch).unwrap();

        // A call never appears in a level before any of its dependencies.
        let graph = builder.build_dependency_graph(&batch).unwrap();
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for level in &plan.levels {
            for call in level {
                for edge in graph.dependencies_of(&call.id) {
                    assert!(seen.contains(edge.from.as_str()), "{} ran before {}", call.id, edge.from);
                }
            }
            for call in level {
                seen.insert(call.id.as_str());
            }
        }
    }

    #[test]
    fn test_estimated_total_is_per_level_max() {
        let builder = GraphBuilder::new();
        let a = read("a", "x").with_estimated_duration(200);
        let b = read("b", "y").with_estimated_duration(700);
        // Independent: one level, cost = max(200, 700).
        let plan = builder.create_execution_plan(&[a, b]).unwrap();
        assert_eq!(plan.estimated_total_ms, 700);
    }

    #[test]
    fn test_default_duration_applied() {
        let builder = GraphBuilder::new();
        let plan = builder.create_execution_plan(&[read("a", "x")]).unwrap();
        assert_eq!(plan.estimated_total_ms, DEFAULT_DURATION_MS);
    }

    #[test]
    fn test_chained_levels_sum() {
        let builder = GraphBuilder::new();
        let r = read("r", "x").with_estimated_duration(100);
        let w = write("w", "x").with_estimated_duration(300);
        let plan = builder.create_execution_plan(&[r, w]).unwrap();
        assert_eq!(plan.estimated_total_ms, 400);
    }

    #[test]
    fn test_critical_path_longest_chain() {
        let builder = GraphBuilder::new();
        // Chain of three on "x", lone call on "y".
        let batch = vec![
            write("w1", "x"),
            read("r1", "x"),
            write("w2", "x"),
            read("lone", "y"),
        ];
        let plan = builder.create_execution_plan(&batch).unwrap();
        assert_eq!(plan.critical_path.len(), 3);
        assert_eq!(plan.critical_path[0], "w1");
        assert_eq!(plan.critical_path[2], "w2");
    }

    #[test]
    fn test_parallelizable_count_single_calls_zero() {
        let builder = GraphBuilder::new();
        let plan = builder
            .create_execution_plan(&[read("r", "x"), write("w", "x")])
            .unwrap();
        assert_eq!(plan.parallelizable_count, 0);
    }
}
