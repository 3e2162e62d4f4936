//! Sync events and their derivation from filesystem notifications.

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::EventKind;
use std::path::{Path, PathBuf};

/// Kind of change carried by a [`SyncEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change to a regular file in the sync folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl SyncEvent {
    pub fn new(kind: ChangeKind, path: PathBuf) -> Self {
        match kind {
            ChangeKind::Created => SyncEvent::Created(path),
            ChangeKind::Modified => SyncEvent::Modified(path),
            ChangeKind::Deleted => SyncEvent::Deleted(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            SyncEvent::Created(p) | SyncEvent::Modified(p) | SyncEvent::Deleted(p) => p,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            SyncEvent::Created(_) => ChangeKind::Created,
            SyncEvent::Modified(_) => ChangeKind::Modified,
            SyncEvent::Deleted(_) => ChangeKind::Deleted,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            SyncEvent::Created(p) | SyncEvent::Modified(p) | SyncEvent::Deleted(p) => p,
        }
    }
}

/// Convert a notify event into zero or more sync events.
///
/// Directory events are dropped. Where the notification does not say whether
/// the path is a directory, the filesystem is consulted; removed paths cannot
/// be inspected and are passed on as files.
pub fn events_from_notify(event: &notify::Event) -> Vec<SyncEvent> {
    let kind = match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            return Vec::new();
        }
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(mode)) => return rename_events(mode, &event.paths),
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| kind == ChangeKind::Deleted || !path.is_dir())
        .map(|path| SyncEvent::new(kind, path.clone()))
        .collect()
}

fn rename_events(mode: RenameMode, paths: &[PathBuf]) -> Vec<SyncEvent> {
    match mode {
        RenameMode::From => paths.iter().map(|p| SyncEvent::Deleted(p.clone())).collect(),
        // The target name may already exist remotely (atomic saves rename a
        // temp file over the original), so it is uploaded with overwrite.
        RenameMode::To => paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| SyncEvent::Modified(p.clone()))
            .collect(),
        // Backends that report From and To separately also send Both; the
        // halves already produced the events.
        RenameMode::Both => Vec::new(),
        RenameMode::Any | RenameMode::Other => paths
            .iter()
            .filter_map(|p| {
                if p.is_dir() {
                    None
                } else if p.exists() {
                    Some(SyncEvent::Modified(p.clone()))
                } else {
                    Some(SyncEvent::Deleted(p.clone()))
                }
            })
            .collect(),
    }
}
