//! Filesystem change source backed by `notify`
//!
//! On Linux a write only counts once the writer closes the file, so a
//! half-written file is never reported as changed. Other platforms have no
//! close event and report data modifications instead; the pipeline's settle
//! delay covers those.

use std::path::Path;

#[cfg(not(target_os = "linux"))]
use notify::event::ModifyKind;
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

use super::{ChangeKind, RawChange};

/// Watcher setup errors
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => ChangeKind::Write,
            #[cfg(not(target_os = "linux"))]
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                ChangeKind::Write
            }
            _ => ChangeKind::Other,
        }
    }
}

/// Recursive watcher pushing raw changes into a channel
///
/// Watching stops when this value is dropped.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Watch `root` recursively, sending every notification to `tx`
    pub fn start(root: &Path, tx: mpsc::Sender<RawChange>) -> Result<Self, WatchError> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    let kind = ChangeKind::from(&event.kind);
                    for path in event.paths {
                        // Runs on the watcher's own thread, outside the runtime.
                        if tx.blocking_send(RawChange { path, kind }).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::error!("Watcher error: {}", e),
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "Watching for resource changes");

        Ok(Self { _watcher: watcher })
    }
}
