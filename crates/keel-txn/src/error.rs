//! Transaction error types

use crate::TransactionStatus;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction not found: {id}")]
    NotFound { id: String },

    #[error("transaction {id} is {state}")]
    InvalidState {
        id: String,
        state: TransactionStatus,
    },

    #[error("file {path} is locked by transaction {holder}")]
    Locked { path: PathBuf, holder: String },

    #[error("file already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("file not found: {path}")]
    FileMissing { path: PathBuf },

    #[error("commit of transaction {id} failed: {message} (rolled back: {rolled_back})")]
    CommitFailed {
        id: String,
        message: String,
        /// Whether the automatic compensating rollback completed
        rolled_back: bool,
    },

    #[error("workspace I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl TransactionError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
