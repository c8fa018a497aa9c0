//! Tool call and parameter types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// A single structured instruction the agent wants executed against the
/// workspace.
///
/// Immutable once submitted to the graph builder; `id` must be unique
/// within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique id within the batch (assigned by the model/agent loop)
    pub id: String,
    /// Typed parameter record, tagged by tool name
    pub params: ToolParams,
    /// Estimated wall-clock duration in milliseconds, if the model guessed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    /// Higher runs earlier among otherwise-unordered calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Explicit ordering hint: id of a prior call this one must follow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, params: ToolParams) -> Self {
        Self {
            id: id.into(),
            params,
            estimated_duration_ms: None,
            priority: None,
            depends_on: None,
        }
    }

    pub fn with_estimated_duration(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = Some(ms);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on = Some(id.into());
        self
    }

    pub fn tool_name(&self) -> &str {
        self.params.tool_name()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.params.file_path()
    }
}

/// Closed set of per-tool parameter records.
///
/// `Custom` carries anything the builder does not recognize; the
/// dependency rule engine only needs the tool name and an optional path,
/// so unknown tools still participate via explicit `depends_on` edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "camelCase")]
pub enum ToolParams {
    #[serde(rename_all = "camelCase")]
    ReadFile { path: std::path::PathBuf },
    #[serde(rename_all = "camelCase")]
    WriteFile {
        path: std::path::PathBuf,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    CreateFile {
        path: std::path::PathBuf,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    ReplaceInFile {
        path: std::path::PathBuf,
        search: String,
        replace: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteFile { path: std::path::PathBuf },
    #[serde(rename_all = "camelCase")]
    SearchFiles {
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<std::path::PathBuf>,
    },
    #[serde(rename_all = "camelCase")]
    ListFiles { path: std::path::PathBuf },
    #[serde(rename_all = "camelCase")]
    RunCommand { command: String },
    #[serde(rename_all = "camelCase")]
    Custom { name: String, args: Value },
}

impl ToolParams {
    pub fn tool_name(&self) -> &str {
        match self {
            Self::ReadFile { .. } => "readFile",
            Self::WriteFile { .. } => "writeFile",
            Self::CreateFile { .. } => "createFile",
            Self::ReplaceInFile { .. } => "replaceInFile",
            Self::DeleteFile { .. } => "deleteFile",
            Self::SearchFiles { .. } => "searchFiles",
            Self::ListFiles { .. } => "listFiles",
            Self::RunCommand { .. } => "runCommand",
            Self::Custom { name, .. } => name,
        }
    }

    /// The file path this call reads or mutates, if any.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::ReadFile { path }
            | Self::WriteFile { path, .. }
            | Self::CreateFile { path, .. }
            | Self::ReplaceInFile { path, .. }
            | Self::DeleteFile { path } => Some(path),
            Self::SearchFiles { path, .. } => path.as_deref(),
            Self::ListFiles { path } => Some(path),
            Self::RunCommand { .. } => None,
            // Custom tools may name a path in their args; the builder only
            // trusts typed records, so they count as path-free.
            Self::Custom { .. } => None,
        }
    }

    /// Whether this call mutates the file it names.
    pub fn is_file_write(&self) -> bool {
        matches!(
            self,
            Self::WriteFile { .. }
                | Self::CreateFile { .. }
                | Self::ReplaceInFile { .. }
                | Self::DeleteFile { .. }
        )
    }

    /// Whether this call only reads the file it names.
    pub fn is_file_read(&self) -> bool {
        self.file_path().is_some() && !self.is_file_write()
    }
}
