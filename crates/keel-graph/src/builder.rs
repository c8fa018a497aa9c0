//! Pairwise dependency inference

use indexmap::IndexMap;
use keel_protocol::ToolCall;
use std::collections::HashMap;

use crate::conflicts::find_resource_conflicts;
use crate::graph::{Dependency, DependencyGraph, DependencyKind, GraphError};
use crate::plan::ExecutionPlan;

/// A table-driven inference rule keyed by the *target* tool's name: the
/// target depends on any earlier call whose tool name is listed in
/// `prior_tools` and that touches the same file path.
#[derive(Debug, Clone)]
pub struct DependencyRule {
    pub prior_tools: Vec<String>,
    pub reason: String,
}

/// Infers ordering constraints between every pair of calls in a batch and
/// reduces the resulting DAG into a leveled execution plan.
pub struct GraphBuilder {
    rules: HashMap<String, DependencyRule>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            "replaceInFile".to_string(),
            DependencyRule {
                prior_tools: vec!["createFile".to_string(), "writeFile".to_string()],
                reason: "replaceInFile requires the file to have been written first".to_string(),
            },
        );
        Self { rules }
    }

    /// Replace or add a rule for a target tool name.
    pub fn set_rule(&mut self, target_tool: impl Into<String>, rule: DependencyRule) {
        self.rules.insert(target_tool.into(), rule);
    }

    /// Build the dependency graph for one batch.
    ///
    /// For every ordered pair (i < j) at most one edge is recorded, by the
    /// first matching rule: file overlap, rule table, explicit
    /// `depends_on`. A `depends_on` naming a later call still produces an
    /// edge (the declaration order is the model's, not ours); a
    /// `depends_on` naming an id absent from the batch leaves the call
    /// permanently unsatisfied and it will surface in
    /// [`ExecutionPlan::unscheduled`].
    pub fn build_dependency_graph(&self, batch: &[ToolCall]) -> Result<DependencyGraph, GraphError> {
        let mut nodes: IndexMap<String, ToolCall> = IndexMap::with_capacity(batch.len());
        for call in batch {
            if nodes.insert(call.id.clone(), call.clone()).is_some() {
                return Err(GraphError::DuplicateId { id: call.id.clone() });
            }
        }

        let mut edges: Vec<Dependency> = Vec::new();
        let mut edged_pairs: std::collections::HashSet<(String, String)> =
            std::collections::HashSet::new();

        for j in 1..batch.len() {
            for i in 0..j {
                if let Some(edge) = self.infer_pair(&batch[i], &batch[j]) {
                    edged_pairs.insert((edge.from.clone(), edge.to.clone()));
                    edges.push(edge);
                }
            }
        }

        // Explicit depends_on pointing at a later call: the pairwise scan
        // above only looks backwards, so pick these up here.
        let mut unsatisfied: HashMap<String, String> = HashMap::new();
        for call in batch {
            let Some(dep_id) = &call.depends_on else {
                continue;
            };
            if !nodes.contains_key(dep_id) || dep_id == &call.id {
                unsatisfied.insert(call.id.clone(), dep_id.clone());
                continue;
            }
            if !edged_pairs.contains(&(dep_id.clone(), call.id.clone())) {
                edged_pairs.insert((dep_id.clone(), call.id.clone()));
                edges.push(Dependency {
                    from: dep_id.clone(),
                    to: call.id.clone(),
                    kind: DependencyKind::Order,
                    reason: format!("{} declared a dependency on {}", call.id, dep_id),
                });
            }
        }

        let graph = DependencyGraph::new_with_unsatisfied(nodes, edges, unsatisfied);
        tracing::debug!(
            calls = graph.len(),
            edges = graph.edge_count(),
            "dependency graph built"
        );
        Ok(graph)
    }

    /// First matching rule wins; returns the single edge for this ordered
    /// pair, if any.
    fn infer_pair(&self, earlier: &ToolCall, later: &ToolCall) -> Option<Dependency> {
        // (a) file overlap where at least one side writes
        if let (Some(ep), Some(lp)) = (earlier.file_path(), later.file_path()) {
            if ep == lp && (earlier.params.is_file_write() || later.params.is_file_write()) {
                let kind = if earlier.params.is_file_write() && later.params.is_file_write() {
                    DependencyKind::File
                } else {
                    DependencyKind::Data
                };
                return Some(Dependency {
                    from: earlier.id.clone(),
                    to: later.id.clone(),
                    kind,
                    reason: format!("both touch {}", ep.display()),
                });
            }
        }

        // (b) rule table keyed by the later call's tool name
        if let Some(rule) = self.rules.get(later.tool_name()) {
            if rule.prior_tools.iter().any(|t| t == earlier.tool_name()) {
                let same_path = match (earlier.file_path(), later.file_path()) {
                    (Some(ep), Some(lp)) => ep == lp,
                    _ => false,
                };
                if same_path {
                    return Some(Dependency {
                        from: earlier.id.clone(),
                        to: later.id.clone(),
                        kind: DependencyKind::File,
                        reason: rule.reason.clone(),
                    });
                }
            }
        }

        // (c) explicit depends_on naming the earlier call
        if later.depends_on.as_deref() == Some(earlier.id.as_str()) {
            return Some(Dependency {
                from: earlier.id.clone(),
                to: later.id.clone(),
                kind: DependencyKind::Order,
                reason: format!("{} declared a dependency on {}", later.id, earlier.id),
            });
        }

        None
    }

    /// Build the graph and reduce it to a leveled plan in one step.
    pub fn create_execution_plan(&self, batch: &[ToolCall]) -> Result<ExecutionPlan, GraphError> {
        let graph = self.build_dependency_graph(batch)?;
        Ok(ExecutionPlan::from_graph(&graph))
    }

    /// Whether the whole batch is safe to run as one concurrent group:
    /// no resource conflicts, no inferred ordering, nothing unscheduled.
    pub fn can_execute_in_parallel(&self, batch: &[ToolCall]) -> Result<bool, GraphError> {
        let plan = self.create_execution_plan(batch)?;
        Ok(plan.levels.len() <= 1
            && plan.unscheduled.is_empty()
            && find_resource_conflicts(batch).is_empty())
    }

    /// The batch reordered into a dependency-respecting sequence: plan
    /// levels flattened, higher-priority calls first within a level.
    pub fn optimize_order(&self, batch: &[ToolCall]) -> Result<Vec<ToolCall>, GraphError> {
        let plan = self.create_execution_plan(batch)?;
        let mut ordered = Vec::with_capacity(batch.len());
        for level in plan.levels {
            let mut level = level;
            level.sort_by_key(|c| std::cmp::Reverse(c.priority.unwrap_or(0)));
            ordered.extend(level);
        }
        Ok(ordered)
    }

    /// The plan's levels: groups of calls safe to run concurrently.
    pub fn get_parallel_groups(&self, batch: &[ToolCall]) -> Result<Vec<Vec<ToolCall>>, GraphError> {
        Ok(self.create_execution_plan(batch)?.levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_protocol::ToolParams;
    use std::path::PathBuf;

    fn read(id: &str, path: &str) -> ToolCall {
        ToolCall::new(
            id,
            ToolParams::ReadFile {
                path: PathBuf::from(path),
            },
        )
    }

    fn write(id: &str, path: &str) -> ToolCall {
        ToolCall::new(
            id,
            ToolParams::WriteFile {
                path: PathBuf::from(path),
                content: String::new(),
            },
        )
    }

    fn replace(id: &str, path: &str) -> ToolCall {
        ToolCall::new(
            id,
            ToolParams::ReplaceInFile {
                path: PathBuf::from(path),
                search: "a".to_string(),
                replace: "b".to_string(),
            },
        )
    }

    #[test]
    fn test_empty_batch() {
        let builder = GraphBuilder::new();
        let graph = builder.build_dependency_graph(&[]).unwrap();
        assert!(graph.is_empty());
        let plan = ExecutionPlan::from_graph(&graph);
        assert!(plan.levels.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let builder = GraphBuilder::new();
        let err = builder
            .build_dependency_graph(&[read("a", "x"), read("a", "y")])
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId { .. }));
    }

    #[test]
    fn test_read_then_write_same_file() {
        let builder = GraphBuilder::new();
        let graph = builder
            .build_dependency_graph(&[read("r", "x"), write("w", "x")])
            .unwrap();
        assert_eq!(graph.edge_count(), 1);
        let edge = &graph.dependents_of("r")[0];
        assert_eq!(edge.to, "w");
        assert_eq!(edge.kind, DependencyKind::Data);
    }

    #[test]
    fn test_write_write_same_file() {
        let builder = GraphBuilder::new();
        let graph = builder
            .build_dependency_graph(&[write("w1", "x"), write("w2", "x")])
            .unwrap();
        let edge = &graph.dependents_of("w1")[0];
        assert_eq!(edge.kind, DependencyKind::File);
    }

    #[test]
    fn test_reads_do_not_conflict() {
        let builder = GraphBuilder::new();
        let graph = builder
            .build_dependency_graph(&[read("r1", "x"), read("r2", "x")])
            .unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_rule_table_replace_after_create() {
        let builder = GraphBuilder::new();
        let create = ToolCall::new(
            "c",
            ToolParams::CreateFile {
                path: PathBuf::from("new.rs"),
                content: String::new(),
            },
        );
        let graph = builder
            .build_dependency_graph(&[create, replace("r", "new.rs")])
            .unwrap();
        // File-overlap rule fires first for this pair; either way exactly
        // one edge c -> r exists.
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependents_of("c")[0].to, "r");
    }

    #[test]
    fn test_explicit_depends_on_prior() {
        let builder = GraphBuilder::new();
        let a = read("a", "x");
        let b = read("b", "y").with_depends_on("a");
        let graph = builder.build_dependency_graph(&[a, b]).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependents_of("a")[0].kind, DependencyKind::Order);
    }

    #[test]
    fn test_depends_on_missing_id_is_unsatisfied() {
        let builder = GraphBuilder::new();
        let a = read("a", "x").with_depends_on("ghost");
        let graph = builder.build_dependency_graph(&[a]).unwrap();
        let plan = ExecutionPlan::from_graph(&graph);
        assert!(plan.levels.is_empty());
        assert_eq!(plan.unscheduled, vec!["a"]);
    }

    #[test]
    fn test_mutual_depends_on_unscheduled() {
        let builder = GraphBuilder::new();
        let a = read("a", "x").with_depends_on("b");
        let b = read("b", "y").with_depends_on("a");
        let plan = builder.create_execution_plan(&[a, b]).unwrap();
        assert!(plan.levels.is_empty());
        assert_eq!(plan.unscheduled.len(), 2);
    }

    #[test]
    fn test_independent_calls_fully_parallel() {
        let builder = GraphBuilder::new();
        let plan = builder
            .create_execution_plan(&[write("w1", "a"), write("w2", "b")])
            .unwrap();
        assert_eq!(plan.levels.len(), 1);
        assert_eq!(plan.levels[0].len(), 2);
        assert_eq!(plan.parallelizable_count, 2);
        assert!(builder
            .can_execute_in_parallel(&[write("w1", "a"), write("w2", "b")])
            .unwrap());
    }

    #[test]
    fn test_can_execute_in_parallel_false_on_shared_path() {
        let builder = GraphBuilder::new();
        assert!(!builder
            .can_execute_in_parallel(&[write("w1", "x"), write("w2", "x")])
            .unwrap());
    }

    #[test]
    fn test_optimize_order_priority_within_level() {
        let builder = GraphBuilder::new();
        let low = read("low", "a");
        let high = read("high", "b").with_priority(9);
        let ordered = builder.optimize_order(&[low, high]).unwrap();
        assert_eq!(ordered[0].id, "high");
        assert_eq!(ordered[1].id, "low");
    }

    #[test]
    fn test_no_path_call_only_joins_via_depends_on() {
        let builder = GraphBuilder::new();
        let cmd = ToolCall::new(
            "cmd",
            ToolParams::RunCommand {
                command: "cargo check".to_string(),
            },
        )
        .with_depends_on("w");
        let graph = builder
            .build_dependency_graph(&[write("w", "x"), cmd])
            .unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependents_of("w")[0].to, "cmd");
    }
}
