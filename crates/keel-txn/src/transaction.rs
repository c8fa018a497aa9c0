//! Transaction state

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transaction lifecycle state machine.
///
/// `Active → Committing → Committed` on success,
/// `Active → Committing → Failed → RollingBack → RolledBack` when a commit
/// fails, `Active → RollingBack → RolledBack` on explicit rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Committing,
    Committed,
    Failed,
    RollingBack,
    RolledBack,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committing => write!(f, "committing"),
            Self::Committed => write!(f, "committed"),
            Self::Failed => write!(f, "failed"),
            Self::RollingBack => write!(f, "rolling_back"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
    Modify,
    Delete,
}

/// One staged file mutation.
///
/// `original_content` is captured the first time this path is staged and
/// never overwritten for the life of the transaction; it is what rollback
/// restores. `None` means the file did not exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionFile {
    pub path: PathBuf,
    pub original_content: Option<String>,
    /// `None` when the operation deletes the file
    pub new_content: Option<String>,
    pub operation: FileOperation,
}

/// One open unit of work over the workspace. Staging order is preserved
/// and drives commit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub files: IndexMap<PathBuf, TransactionFile>,
    pub started_at: DateTime<Utc>,
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            files: IndexMap::new(),
            started_at: Utc::now(),
            status: TransactionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    pub fn staged_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_active() {
        let txn = Transaction::new("t1");
        assert!(txn.is_active());
        assert!(txn.files.is_empty());
        assert!(!txn.status.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(TransactionStatus::RolledBack.is_terminal());
        assert!(!TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TransactionStatus::RollingBack.to_string(), "rolling_back");
        assert_eq!(TransactionStatus::Active.to_string(), "active");
    }
}
