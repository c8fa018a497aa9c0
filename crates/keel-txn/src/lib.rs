//! Keel Txn - Transactional workspace mutation
//!
//! Provides staged, locked, validated, atomically-committed-or-rolled-back
//! mutation of a set of files. Writes proposed by the agent are staged in
//! memory first; commit applies them to the real workspace in staging
//! order and a failure triggers compensating writes of the frozen
//! originals. Not a database: a hard crash mid-commit can leave partial
//! state, which is acceptable for a developer workspace.

mod error;
mod hooks;
mod manager;
mod transaction;
mod validate;
mod workspace;

pub use error::TransactionError;
pub use hooks::{HookHandle, TxnHook, ValidationHook};
pub use manager::TransactionManager;
pub use transaction::{FileOperation, Transaction, TransactionFile, TransactionStatus};
pub use validate::{
    IssueSeverity, SyntaxChecker, ValidationIssue, ValidationResult, SOURCE_EXTENSIONS,
};
pub use workspace::{LocalWorkspace, MemoryWorkspace, WorkspaceIo};
