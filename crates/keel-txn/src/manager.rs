//! Transaction manager

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::hooks::HookList;
use crate::validate::{syntax_pass, NoopSyntaxChecker};
use crate::{
    FileOperation, HookHandle, SyntaxChecker, Transaction, TransactionError, TransactionFile,
    TransactionStatus, TxnHook, ValidationHook, ValidationIssue, ValidationResult, WorkspaceIo,
};

#[derive(Default)]
struct ManagerState {
    transactions: HashMap<String, Transaction>,
    /// Global path -> holding transaction id. A path is staged by at most
    /// one active transaction at a time.
    locks: HashMap<PathBuf, String>,
    /// Staged-but-uncommitted content keyed by (transaction, path);
    /// `None` means the transaction would delete the file.
    shadow: HashMap<(String, PathBuf), Option<String>>,
}

/// Staged, locked, validated mutation of a set of workspace files.
///
/// All failures come back as typed errors. Locks are released on commit
/// (per path, as each change is applied) or rollback (all at once), never
/// partially.
pub struct TransactionManager {
    workspace: Arc<dyn WorkspaceIo>,
    state: Mutex<ManagerState>,
    validation_hooks: HookList<dyn ValidationHook>,
    pre_commit_hooks: HookList<dyn TxnHook>,
    rollback_hooks: HookList<dyn TxnHook>,
    syntax_checker: Arc<dyn SyntaxChecker>,
}

impl TransactionManager {
    pub fn new(workspace: Arc<dyn WorkspaceIo>) -> Self {
        Self {
            workspace,
            state: Mutex::new(ManagerState::default()),
            validation_hooks: HookList::default(),
            pre_commit_hooks: HookList::default(),
            rollback_hooks: HookList::default(),
            syntax_checker: Arc::new(NoopSyntaxChecker),
        }
    }

    pub fn set_syntax_checker(&mut self, checker: Arc<dyn SyntaxChecker>) {
        self.syntax_checker = checker;
    }

    pub fn register_validation_hook(&mut self, hook: Arc<dyn ValidationHook>) -> HookHandle {
        self.validation_hooks.register(hook)
    }

    pub fn unregister_validation_hook(&mut self, handle: HookHandle) -> bool {
        self.validation_hooks.unregister(handle)
    }

    pub fn register_pre_commit_hook(&mut self, hook: Arc<dyn TxnHook>) -> HookHandle {
        self.pre_commit_hooks.register(hook)
    }

    pub fn unregister_pre_commit_hook(&mut self, handle: HookHandle) -> bool {
        self.pre_commit_hooks.unregister(handle)
    }

    pub fn register_rollback_hook(&mut self, hook: Arc<dyn TxnHook>) -> HookHandle {
        self.rollback_hooks.register(hook)
    }

    pub fn unregister_rollback_hook(&mut self, handle: HookHandle) -> bool {
        self.rollback_hooks.unregister(handle)
    }

    /// Open a new transaction and return its id.
    pub async fn begin_transaction(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.lock().await;
        state.transactions.insert(id.clone(), Transaction::new(id.clone()));
        tracing::debug!(txn_id = %id, "transaction started");
        id
    }

    /// Stage creation of a file that must not already exist.
    pub async fn stage_create(
        &self,
        txn_id: &str,
        path: impl AsRef<Path>,
        content: impl Into<String>,
    ) -> Result<(), TransactionError> {
        let path = path.as_ref().to_path_buf();
        let content = content.into();
        let mut state = self.state.lock().await;
        self.check_stageable(&state, txn_id, &path)?;

        let already_staged = state.transactions[txn_id].files.contains_key(&path);
        if !already_staged && self.workspace.exists(&path).await {
            return Err(TransactionError::AlreadyExists { path });
        }

        self.record_staging(
            &mut state,
            txn_id,
            path,
            Some(content),
            FileOperation::Create,
            None,
        );
        Ok(())
    }

    /// Stage new content for an existing file. The original content is
    /// frozen from the live workspace on first touch and reused on every
    /// later re-staging of the same path, so a partial write elsewhere can
    /// never skew what rollback restores.
    pub async fn stage_modify(
        &self,
        txn_id: &str,
        path: impl AsRef<Path>,
        new_content: impl Into<String>,
    ) -> Result<(), TransactionError> {
        let path = path.as_ref().to_path_buf();
        let new_content = new_content.into();
        let mut state = self.state.lock().await;
        self.check_stageable(&state, txn_id, &path)?;

        let original = self.freeze_original(&state, txn_id, &path).await?;
        self.record_staging(
            &mut state,
            txn_id,
            path,
            Some(new_content),
            FileOperation::Modify,
            original,
        );
        Ok(())
    }

    /// Stage deletion of an existing file.
    pub async fn stage_delete(
        &self,
        txn_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), TransactionError> {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state.lock().await;
        self.check_stageable(&state, txn_id, &path)?;

        let original = self.freeze_original(&state, txn_id, &path).await?;
        self.record_staging(&mut state, txn_id, path, None, FileOperation::Delete, original);
        Ok(())
    }

    /// Run every registered validation hook plus the built-in syntax pass
    /// over the staged set. Does not mutate transaction state.
    pub async fn validate(&self, txn_id: &str) -> Result<ValidationResult, TransactionError> {
        let files: Vec<TransactionFile> = {
            let state = self.state.lock().await;
            let txn = state
                .transactions
                .get(txn_id)
                .ok_or_else(|| TransactionError::NotFound { id: txn_id.to_string() })?;
            txn.files.values().cloned().collect()
        };

        let mut issues = Vec::new();
        for hook in self.validation_hooks.iter() {
            match hook.validate(&files).await {
                Ok(found) => issues.extend(found),
                Err(e) => issues.push(ValidationIssue::error(
                    PathBuf::new(),
                    format!("validation hook failed: {e}"),
                )),
            }
        }
        issues.extend(syntax_pass(self.syntax_checker.as_ref(), &files).await);

        Ok(ValidationResult::from_issues(issues))
    }

    /// Apply every staged change to the workspace in staging order.
    ///
    /// Each path's lock and shadow entry is released as its change is
    /// applied. Any failure marks the transaction failed and triggers the
    /// compensating rollback automatically; the returned `CommitFailed`
    /// carries whether that rollback completed.
    pub async fn commit(&self, txn_id: &str) -> Result<(), TransactionError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let txn = state
                .transactions
                .get_mut(txn_id)
                .ok_or_else(|| TransactionError::NotFound { id: txn_id.to_string() })?;
            if txn.status != TransactionStatus::Active {
                return Err(TransactionError::InvalidState {
                    id: txn_id.to_string(),
                    state: txn.status,
                });
            }
            txn.status = TransactionStatus::Committing;
            txn.clone()
        };

        for hook in self.pre_commit_hooks.iter() {
            if let Err(e) = hook.run(&snapshot).await {
                return Err(self
                    .fail_commit(txn_id, format!("pre-commit hook failed: {e}"))
                    .await);
            }
        }

        for file in snapshot.files.values() {
            let applied = match file.operation {
                FileOperation::Create | FileOperation::Modify => {
                    let content = file.new_content.as_deref().unwrap_or_default();
                    self.workspace.write(&file.path, content).await
                }
                FileOperation::Delete => self.workspace.delete(&file.path).await,
            };
            if let Err(e) = applied {
                return Err(self
                    .fail_commit(txn_id, format!("applying {} failed: {e}", file.path.display()))
                    .await);
            }

            let mut state = self.state.lock().await;
            if state.locks.get(&file.path).is_some_and(|h| h.as_str() == txn_id) {
                state.locks.remove(&file.path);
            }
            state.shadow.remove(&(txn_id.to_string(), file.path.clone()));
        }

        let mut state = self.state.lock().await;
        if let Some(txn) = state.transactions.get_mut(txn_id) {
            txn.status = TransactionStatus::Committed;
        }
        tracing::info!(txn_id = %txn_id, files = snapshot.files.len(), "transaction committed");
        Ok(())
    }

    async fn fail_commit(&self, txn_id: &str, message: String) -> TransactionError {
        {
            let mut state = self.state.lock().await;
            if let Some(txn) = state.transactions.get_mut(txn_id) {
                txn.status = TransactionStatus::Failed;
            }
        }
        tracing::warn!(txn_id = %txn_id, error = %message, "commit failed, rolling back");
        let rolled_back = self.rollback(txn_id).await.is_ok();
        TransactionError::CommitFailed {
            id: txn_id.to_string(),
            message,
            rolled_back,
        }
    }

    /// Restore every staged path to its frozen original, release all of
    /// this transaction's locks and shadow entries. Idempotent: rolling
    /// back an already rolled-back transaction is a no-op success.
    pub async fn rollback(&self, txn_id: &str) -> Result<(), TransactionError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let txn = state
                .transactions
                .get_mut(txn_id)
                .ok_or_else(|| TransactionError::NotFound { id: txn_id.to_string() })?;
            match txn.status {
                TransactionStatus::RolledBack => return Ok(()),
                TransactionStatus::Active
                | TransactionStatus::Failed
                | TransactionStatus::RollingBack => {}
                status => {
                    return Err(TransactionError::InvalidState {
                        id: txn_id.to_string(),
                        state: status,
                    })
                }
            }
            txn.status = TransactionStatus::RollingBack;
            txn.clone()
        };

        for hook in self.rollback_hooks.iter() {
            if let Err(e) = hook.run(&snapshot).await {
                tracing::warn!(txn_id = %txn_id, error = %e, "rollback hook failed");
            }
        }

        let mut first_err: Option<TransactionError> = None;
        for file in snapshot.files.values() {
            let restored = match &file.original_content {
                Some(original) => self.workspace.write(&file.path, original).await,
                // The file did not exist before this transaction.
                None => self.workspace.delete(&file.path).await,
            };
            if let Err(e) = restored {
                tracing::warn!(
                    txn_id = %txn_id,
                    path = %file.path.display(),
                    error = %e,
                    "failed to restore file during rollback"
                );
                first_err.get_or_insert(TransactionError::io(file.path.clone(), e));
            }
        }

        let mut state = self.state.lock().await;
        state.locks.retain(|_, holder| holder.as_str() != txn_id);
        state.shadow.retain(|(id, _), _| id.as_str() != txn_id);
        if let Some(txn) = state.transactions.get_mut(txn_id) {
            txn.status = TransactionStatus::RolledBack;
        }
        tracing::info!(txn_id = %txn_id, files = snapshot.files.len(), "transaction rolled back");

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub async fn is_file_locked(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().await.locks.contains_key(path.as_ref())
    }

    pub async fn lock_holder(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state.lock().await.locks.get(path.as_ref()).cloned()
    }

    /// Preview what this transaction would produce for a path. `None`
    /// when the path is not staged or the transaction would delete it.
    pub async fn get_staged_content(&self, txn_id: &str, path: impl AsRef<Path>) -> Option<String> {
        self.state
            .lock()
            .await
            .shadow
            .get(&(txn_id.to_string(), path.as_ref().to_path_buf()))
            .cloned()
            .flatten()
    }

    /// Snapshot of a transaction's current state.
    pub async fn get_transaction(&self, txn_id: &str) -> Option<Transaction> {
        self.state.lock().await.transactions.get(txn_id).cloned()
    }

    /// The workspace this manager mutates.
    pub fn workspace(&self) -> &Arc<dyn WorkspaceIo> {
        &self.workspace
    }

    /// Stageability checks shared by all three staging calls: the
    /// transaction must exist and be active, and the path must not be
    /// locked by a different transaction.
    fn check_stageable(
        &self,
        state: &ManagerState,
        txn_id: &str,
        path: &Path,
    ) -> Result<(), TransactionError> {
        let txn = state
            .transactions
            .get(txn_id)
            .ok_or_else(|| TransactionError::NotFound { id: txn_id.to_string() })?;
        if txn.status != TransactionStatus::Active {
            return Err(TransactionError::InvalidState {
                id: txn_id.to_string(),
                state: txn.status,
            });
        }
        if let Some(holder) = state.locks.get(path) {
            if holder.as_str() != txn_id {
                return Err(TransactionError::Locked {
                    path: path.to_path_buf(),
                    holder: holder.clone(),
                });
            }
        }
        Ok(())
    }

    /// Frozen original for this path: the already-staged value when the
    /// path was touched before in this transaction, otherwise the live
    /// workspace content (which must exist).
    async fn freeze_original(
        &self,
        state: &ManagerState,
        txn_id: &str,
        path: &Path,
    ) -> Result<Option<String>, TransactionError> {
        if let Some(staged) = state.transactions[txn_id].files.get(path) {
            return Ok(staged.original_content.clone());
        }
        match self.workspace.read(path).await {
            Ok(Some(content)) => Ok(Some(content)),
            Ok(None) => Err(TransactionError::FileMissing {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(TransactionError::io(path.to_path_buf(), e)),
        }
    }

    fn record_staging(
        &self,
        state: &mut ManagerState,
        txn_id: &str,
        path: PathBuf,
        new_content: Option<String>,
        operation: FileOperation,
        fresh_original: Option<String>,
    ) {
        state.locks.insert(path.clone(), txn_id.to_string());
        state
            .shadow
            .insert((txn_id.to_string(), path.clone()), new_content.clone());

        let Some(txn) = state.transactions.get_mut(txn_id) else {
            return;
        };
        match txn.files.get_mut(&path) {
            Some(existing) => {
                // Re-staging the same path: the frozen original survives.
                existing.new_content = new_content;
                existing.operation = operation;
            }
            None => {
                txn.files.insert(
                    path.clone(),
                    TransactionFile {
                        path: path.clone(),
                        original_content: fresh_original,
                        new_content,
                        operation,
                    },
                );
            }
        }
        tracing::debug!(txn_id = %txn_id, path = %path.display(), ?operation, "file staged");
    }
}
