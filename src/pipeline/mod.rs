//! Change event pipeline
//!
//! Turns raw filesystem notifications into resource changes:
//!
//! 1. Keep only content writes on files with the resource extension
//! 2. Derive the resource ID from the file path
//! 3. Read the file; on failure, or if it is still empty, the event is dropped
//! 4. Hash the bytes and hand the change to a [`ChangeHandler`]
//!
//! Notifications are gathered until the queue has been quiet for the
//! settle delay, then repeated writes to one path collapse into a single
//! read of its final content. Paths are processed one at a time in the
//! order they first appeared, and each handler call completes before the
//! next file is read.
//!
//! Reading a file and handing it on happens inside the [`ChangeGate`].
//! Anything else that reads a resource and must not miss the change that
//! follows it (opening a subscription) enters the same gate.

mod watcher;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::resource::{ResourceId, ResourceStore};
use crate::version::Version;

pub use watcher::{FsWatcher, WatchError};

/// Capacity of the raw change queue between the watcher and the pipeline
pub const CHANGE_QUEUE_CAPACITY: usize = 256;

/// Default quiet period before queued changes are read
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// A steady stream of writes is still flushed after this many settle delays
const MAX_SETTLE_ROUNDS: u32 = 10;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Content was written
    Write,
    /// Anything else (create, rename, remove, metadata)
    Other,
}

/// Raw notification from a change source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RawChange {
    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Write,
        }
    }
}

/// New content for a resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChange {
    pub resource_id: ResourceId,
    pub body: Bytes,
    pub version: Version,
}

impl ResourceChange {
    pub fn new(resource_id: ResourceId, body: Bytes) -> Self {
        let version = Version::of(&body);
        Self {
            resource_id,
            body,
            version,
        }
    }
}

/// Receiver of resource changes
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_change(&self, change: ResourceChange);
}

/// Mutual exclusion between change handling and resource readers
#[derive(Debug, Clone, Default)]
pub struct ChangeGate(Arc<Mutex<()>>);

impl ChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no change is being handled, and hold further ones off
    pub async fn enter(&self) -> OwnedMutexGuard<()> {
        self.0.clone().lock_owned().await
    }
}

/// Serial consumer of raw change notifications
pub struct ChangePipeline {
    store: ResourceStore,
    handler: Arc<dyn ChangeHandler>,
    gate: ChangeGate,
    settle: Duration,
}

impl ChangePipeline {
    pub fn new(store: ResourceStore, handler: Arc<dyn ChangeHandler>) -> Self {
        Self {
            store,
            handler,
            gate: ChangeGate::new(),
            settle: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Share a gate with readers outside the pipeline
    pub fn with_gate(mut self, gate: ChangeGate) -> Self {
        self.gate = gate;
        self
    }

    /// Set the quiet period; zero handles whatever is already queued
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Process one notification
    ///
    /// Returns the change that was handed on, if any.
    pub async fn process(&self, raw: RawChange) -> Option<ResourceChange> {
        if raw.kind != ChangeKind::Write || !self.store.is_resource_file(&raw.path) {
            return None;
        }

        let resource_id = match self.store.resource_id_for(&raw.path) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(path = %raw.path.display(), "Error determining resource ID: {}", e);
                return None;
            }
        };

        let _guard = self.gate.enter().await;

        let body = match tokio::fs::read(&raw.path).await {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                tracing::error!(
                    path = %raw.path.display(),
                    resource = %resource_id,
                    "Error reading changed file, dropping event: {}",
                    e
                );
                return None;
            }
        };

        if body.is_empty() {
            tracing::debug!(
                path = %raw.path.display(),
                resource = %resource_id,
                "Changed file is empty, waiting for its content"
            );
            return None;
        }

        tracing::info!(
            path = %raw.path.display(),
            resource = %resource_id,
            "File changed"
        );

        let change = ResourceChange::new(resource_id, body);
        self.handler.on_change(change.clone()).await;
        Some(change)
    }

    /// Consume notifications until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<RawChange>) {
        while let Some(first) = rx.recv().await {
            let mut pending = vec![first];
            let flush_by = Instant::now() + self.settle * MAX_SETTLE_ROUNDS;

            loop {
                let quiet_until = (Instant::now() + self.settle).min(flush_by);
                match tokio::time::timeout_at(quiet_until, rx.recv()).await {
                    Ok(Some(raw)) => pending.push(raw),
                    Ok(None) | Err(_) => break,
                }
            }

            for raw in coalesce(pending) {
                self.process(raw).await;
            }
        }
        tracing::info!("Change pipeline stopped");
    }

    /// Run the pipeline on its own task
    pub fn spawn(self, rx: mpsc::Receiver<RawChange>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}

/// Writes only, one per path, in order of first appearance
fn coalesce(pending: Vec<RawChange>) -> Vec<RawChange> {
    let mut seen = HashSet::new();
    pending
        .into_iter()
        .filter(|raw| raw.kind == ChangeKind::Write && seen.insert(raw.path.clone()))
        .collect()
}
