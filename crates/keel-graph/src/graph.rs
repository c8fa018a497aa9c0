//! Dependency graph types

use indexmap::IndexMap;
use keel_protocol::ToolCall;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate tool call id: {id}")]
    DuplicateId { id: String },
}

/// Why one call must wait for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Downstream call reads data an upstream call produced
    Data,
    /// Both calls touch the same file and at least one writes
    File,
    /// Explicit `depends_on` declaration
    Order,
    /// Shared non-file resource
    Resource,
}

/// Directed edge: `from` must complete before `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub from: String,
    pub to: String,
    pub kind: DependencyKind,
    pub reason: String,
}

/// Immutable dependency DAG over one batch of tool calls.
///
/// Edges only ever point from earlier to later calls in the submitted
/// order, so the graph is acyclic by construction.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: IndexMap<String, ToolCall>,
    outgoing: HashMap<String, Vec<Dependency>>,
    incoming: HashMap<String, Vec<Dependency>>,
    /// Calls whose `depends_on` names an id absent from the batch; they
    /// can never reach zero in-degree.
    unsatisfied: HashMap<String, String>,
}

impl DependencyGraph {
    pub(crate) fn new(nodes: IndexMap<String, ToolCall>, edges: Vec<Dependency>) -> Self {
        Self::new_with_unsatisfied(nodes, edges, HashMap::new())
    }

    pub(crate) fn new_with_unsatisfied(
        nodes: IndexMap<String, ToolCall>,
        edges: Vec<Dependency>,
        unsatisfied: HashMap<String, String>,
    ) -> Self {
        let mut outgoing: HashMap<String, Vec<Dependency>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<Dependency>> = HashMap::new();
        for edge in edges {
            outgoing.entry(edge.from.clone()).or_default().push(edge.clone());
            incoming.entry(edge.to.clone()).or_default().push(edge);
        }
        Self {
            nodes,
            outgoing,
            incoming,
            unsatisfied,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tool calls in submission order.
    pub fn calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.nodes.values()
    }

    pub fn get(&self, id: &str) -> Option<&ToolCall> {
        self.nodes.get(id)
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    /// Edges leaving `id` (calls that must wait for it).
    pub fn dependents_of(&self, id: &str) -> &[Dependency] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges entering `id` (calls it must wait for).
    pub fn dependencies_of(&self, id: &str) -> &[Dependency] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.dependencies_of(id).len()
    }

    /// All edges, in no particular order.
    pub fn edges(&self) -> impl Iterator<Item = &Dependency> {
        self.outgoing.values().flatten()
    }

    /// Calls whose declared dependency can never be satisfied, with the
    /// missing id.
    pub fn unsatisfied(&self) -> &HashMap<String, String> {
        &self.unsatisfied
    }
}
