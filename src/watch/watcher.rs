use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    MovedIn,
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileEventKind::Created => f.write_str("created"),
            FileEventKind::MovedIn => f.write_str("moved in"),
        }
    }
}

/// A notification reduced to what the dispatcher acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    /// Set when the backend already knows the path is a directory.
    pub is_dir: bool,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Created,
            is_dir: false,
        }
    }

    pub fn moved_in(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::MovedIn,
            is_dir: false,
        }
    }
}

/// Watches `path` (non-recursive) and forwards raw events into `tx`. The
/// callback runs on the backend's thread and never blocks.
pub fn watch(
    path: &Path,
    tx: UnboundedSender<notify::Result<Event>>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;

    Ok(watcher)
}

/// Maps a backend event onto creations and moves into the directory.
/// Everything else is dropped.
pub fn normalize(event: Event) -> Vec<FileEvent> {
    let Event { kind, mut paths, .. } = event;
    match kind {
        EventKind::Create(create) => {
            let is_dir = create == CreateKind::Folder;
            paths
                .into_iter()
                .map(|path| FileEvent {
                    is_dir,
                    ..FileEvent::created(path)
                })
                .collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(FileEvent::moved_in).collect()
        }
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                vec![FileEvent::moved_in(paths.swap_remove(1))]
            } else {
                Vec::new()
            }
        }
        // Some backends cannot tell the two sides of a rename apart.
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => paths
            .into_iter()
            .filter(|p| p.exists())
            .map(FileEvent::moved_in)
            .collect(),
        _ => Vec::new(),
    }
}
