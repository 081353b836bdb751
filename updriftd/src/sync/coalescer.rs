use std::collections::HashMap;
use std::path::PathBuf;

use super::watcher::{ChangeEvent, ChangeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Upload,
    Delete,
    MakeDir,
    RemoveDir,
}

/// Immutable snapshot of one pending action, taken at flush time. Owned by
/// the dispatcher until a worker completes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub local_path: PathBuf,
    pub action: PendingAction,
}

/// Merge rule for two actions pending on the same path: the latest event
/// wins, so stale intermediate states are never dispatched (a create
/// followed rapidly by a delete collapses to the delete alone).
pub fn merge(_old: Option<PendingAction>, new: PendingAction) -> PendingAction {
    new
}

pub fn action_for(kind: ChangeKind) -> PendingAction {
    match kind {
        ChangeKind::Created | ChangeKind::Modified => PendingAction::Upload,
        ChangeKind::Removed => PendingAction::Delete,
        ChangeKind::DirCreated => PendingAction::MakeDir,
        ChangeKind::DirRemoved => PendingAction::RemoveDir,
    }
}

/// Pending map of the change-coalescing engine. Only the ingestion path
/// mutates it; workers never see it. Key uniqueness is the sole map
/// invariant, insertion order is irrelevant.
#[derive(Debug, Default)]
pub struct Coalescer {
    pending: HashMap<PathBuf, PendingAction>,
}

impl Coalescer {
    pub fn insert(&mut self, event: ChangeEvent) {
        let action = action_for(event.kind);
        let old = self.pending.get(&event.path).copied();
        self.pending.insert(event.path, merge(old, action));
    }

    /// Atomically drains the whole map into one batch and clears it.
    pub fn drain(&mut self) -> Vec<WorkItem> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(local_path, action)| WorkItem { local_path, action })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
