//! Hook registration
//!
//! Hooks are held in an explicit ordered list owned by the manager and
//! addressed by handle, so unregistering does not depend on closure
//! identity.

use async_trait::async_trait;

use crate::{Transaction, TransactionFile, ValidationIssue};

/// Opaque registration handle returned by `register_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(pub(crate) u64);

/// Arbitrary check over the full staged file set, consulted by `validate`.
#[async_trait]
pub trait ValidationHook: Send + Sync {
    async fn validate(&self, files: &[TransactionFile]) -> anyhow::Result<Vec<ValidationIssue>>;
}

/// Pre-commit or rollback observer. A pre-commit error fails the commit;
/// a rollback hook error is logged and rollback continues.
#[async_trait]
pub trait TxnHook: Send + Sync {
    async fn run(&self, txn: &Transaction) -> anyhow::Result<()>;
}

pub(crate) struct HookList<H: ?Sized> {
    next_handle: u64,
    entries: Vec<(HookHandle, std::sync::Arc<H>)>,
}

impl<H: ?Sized> Default for HookList<H> {
    fn default() -> Self {
        Self {
            next_handle: 0,
            entries: Vec::new(),
        }
    }
}

impl<H: ?Sized> HookList<H> {
    pub fn register(&mut self, hook: std::sync::Arc<H>) -> HookHandle {
        let handle = HookHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push((handle, hook));
        handle
    }

    /// Returns true when a hook was actually removed.
    pub fn unregister(&mut self, handle: HookHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _)| *h != handle);
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &std::sync::Arc<H>> {
        self.entries.iter().map(|(_, h)| h)
    }
}
