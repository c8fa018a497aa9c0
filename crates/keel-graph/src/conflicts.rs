//! Resource conflict scanning
//!
//! Independent of the dependency graph and informational only: the
//! scheduler does not serialize on conflicts unless the caller checks
//! this output first.

use indexmap::IndexMap;
use keel_protocol::ToolCall;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    WriteWrite,
    ReadWrite,
    Exclusive,
}

/// Unsafe concurrent placement flag for one file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConflict {
    pub resource: PathBuf,
    pub tool_ids: Vec<String>,
    pub kind: ConflictKind,
}

/// Partition every referenced path's calls into writers and readers and
/// flag the unsafe combinations.
pub fn find_resource_conflicts(batch: &[ToolCall]) -> Vec<ResourceConflict> {
    let mut by_path: IndexMap<PathBuf, (Vec<String>, Vec<String>)> = IndexMap::new();

    for call in batch {
        let Some(path) = call.file_path() else { continue };
        let entry = by_path.entry(path.to_path_buf()).or_default();
        if call.params.is_file_write() {
            entry.0.push(call.id.clone());
        } else {
            entry.1.push(call.id.clone());
        }
    }

    let mut conflicts = Vec::new();
    for (path, (writers, readers)) in by_path {
        if writers.len() >= 2 {
            conflicts.push(ResourceConflict {
                resource: path.clone(),
                tool_ids: writers.clone(),
                kind: ConflictKind::WriteWrite,
            });
        }
        if !writers.is_empty() && !readers.is_empty() {
            let mut ids = writers;
            ids.extend(readers);
            conflicts.push(ResourceConflict {
                resource: path,
                tool_ids: ids,
                kind: ConflictKind::ReadWrite,
            });
        }
    }
    conflicts
}
