use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    DirCreated,
    DirRemoved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

pub fn start_notify_watcher(
    root: &Path,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<ChangeEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            for change in map_event(event) {
                let _ = tx.send(change);
            }
        }
    })?;
    watcher.watch(root.as_path(), RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

fn map_event(event: Event) -> Vec<ChangeEvent> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => with_kind(event.paths, ChangeKind::DirCreated),
        EventKind::Create(_) => with_kind(event.paths, ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Rename pairs are decomposed; there is no move action downstream.
            if event.paths.len() >= 2 {
                let mut paths = event.paths.into_iter();
                let from = paths.next();
                let to = paths.next();
                let mut changes = Vec::new();
                if let Some(from) = from {
                    changes.push(ChangeEvent {
                        kind: ChangeKind::Removed,
                        path: from,
                    });
                }
                if let Some(to) = to {
                    changes.push(ChangeEvent {
                        kind: ChangeKind::Created,
                        path: to,
                    });
                }
                changes
            } else {
                with_kind(event.paths, ChangeKind::Modified)
            }
        }
        EventKind::Modify(_) => with_kind(event.paths, ChangeKind::Modified),
        EventKind::Remove(RemoveKind::Folder) => with_kind(event.paths, ChangeKind::DirRemoved),
        EventKind::Remove(_) => with_kind(event.paths, ChangeKind::Removed),
        _ => Vec::new(),
    }
}

fn with_kind(paths: Vec<PathBuf>, kind: ChangeKind) -> Vec<ChangeEvent> {
    paths
        .into_iter()
        .map(|path| ChangeEvent { kind, path })
        .collect()
}
