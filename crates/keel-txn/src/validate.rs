//! Staged-set validation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::TransactionFile;

/// Extensions the built-in validation pass treats as source code.
pub const SOURCE_EXTENSIONS: &[&str] = &["rs", "ts", "tsx", "js", "jsx", "py", "go", "java"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: PathBuf,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    pub fn error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity: IssueSeverity::Error,
        }
    }

    pub fn warning(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity: IssueSeverity::Warning,
        }
    }
}

/// Combined outcome of all validation hooks over a staged file set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = issues
            .into_iter()
            .partition(|i| i.severity == IssueSeverity::Error);
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// External syntax checker consulted for recognized source extensions.
///
/// The core does not parse code itself; wire a real checker here or leave
/// the no-op default in place.
#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    async fn check(&self, path: &Path, content: &str) -> Vec<ValidationIssue>;
}

pub(crate) struct NoopSyntaxChecker;

#[async_trait]
impl SyntaxChecker for NoopSyntaxChecker {
    async fn check(&self, _path: &Path, _content: &str) -> Vec<ValidationIssue> {
        Vec::new()
    }
}

pub(crate) fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Run the built-in syntax pass over staged creates/modifies.
pub(crate) async fn syntax_pass(
    checker: &dyn SyntaxChecker,
    files: &[TransactionFile],
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for file in files {
        let Some(content) = &file.new_content else { continue };
        if is_source_file(&file.path) {
            issues.extend(checker.check(&file.path, content).await);
        }
    }
    issues
}
