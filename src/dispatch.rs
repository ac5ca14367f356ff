//! Update dispatcher
//!
//! Fans a resource change out to every subscriber of that resource. Each
//! subscriber is handled independently:
//!
//! - already at the new version: skipped
//! - never received a body: full update
//! - otherwise: patch against what that subscriber last received, falling
//!   back to a full update when the diff fails or is empty
//!
//! Writes never wait. A closed connection or a subscriber whose queue is
//! full is deregistered and dispatch moves on.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::patch;
use crate::pipeline::{ChangeHandler, ResourceChange};
use crate::protocol::{encode, UpdateFrame};
use crate::resource::ResourceId;
use crate::subscription::{SinkError, Subscription, SubscriptionRegistry};
use crate::version::Version;

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers sent a full body
    pub full: usize,
    /// Subscribers sent a patch
    pub patched: usize,
    /// Subscribers already at the new version
    pub skipped: usize,
    /// Subscribers removed because their connection was gone or stalled
    pub dropped: usize,
}

/// Coordinates registry, patch engine and frame encoder per change
#[derive(Clone)]
pub struct UpdateDispatcher {
    registry: SubscriptionRegistry,
}

impl UpdateDispatcher {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Deliver new content of a resource to its subscribers
    pub fn notify(
        &self,
        resource_id: &ResourceId,
        body: Bytes,
        version: Version,
    ) -> DispatchReport {
        let subscribers = self.registry.snapshot(resource_id);
        let mut report = DispatchReport::default();

        if subscribers.is_empty() {
            return report;
        }

        tracing::info!(
            resource = %resource_id,
            version = %version,
            subscribers = subscribers.len(),
            "Notifying subscribers"
        );

        // Subscribers at the same version get byte-identical frames.
        let mut encoded: HashMap<Option<Version>, (Bytes, bool)> = HashMap::new();

        for subscriber in subscribers {
            if subscriber.last_version == version {
                tracing::debug!(
                    resource = %resource_id,
                    subscription = %subscriber.id,
                    "Subscriber already current, skipping update"
                );
                report.skipped += 1;
                continue;
            }

            if !self.registry.contains(resource_id, &subscriber.id) {
                continue;
            }

            if subscriber.sink.is_closed() {
                tracing::debug!(
                    resource = %resource_id,
                    subscription = %subscriber.id,
                    "Subscriber connection already closed, removing"
                );
                self.registry.remove(resource_id, &subscriber.id);
                report.dropped += 1;
                continue;
            }

            let base = (!subscriber.last_body.is_empty()).then_some(subscriber.last_version);
            let (frame, is_patch) = encoded
                .entry(base)
                .or_insert_with(|| {
                    let frame = build_frame(&subscriber, &body, version);
                    let is_patch = frame.is_patch();
                    (encode(&frame), is_patch)
                })
                .clone();

            match subscriber.sink.send_frame(frame) {
                Ok(()) => {
                    self.registry.update_delivered(
                        resource_id,
                        &subscriber.id,
                        body.clone(),
                        version,
                    );
                    if is_patch {
                        report.patched += 1;
                    } else {
                        report.full += 1;
                    }
                }
                Err(SinkError::Full) => {
                    tracing::warn!(
                        resource = %resource_id,
                        subscription = %subscriber.id,
                        "Subscriber is not reading its frames, evicting"
                    );
                    subscriber.sink.close();
                    self.registry.remove(resource_id, &subscriber.id);
                    report.dropped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        resource = %resource_id,
                        subscription = %subscriber.id,
                        "Write to subscriber failed, removing: {}",
                        e
                    );
                    self.registry.remove(resource_id, &subscriber.id);
                    report.dropped += 1;
                }
            }
        }

        tracing::debug!(
            resource = %resource_id,
            full = report.full,
            patched = report.patched,
            skipped = report.skipped,
            dropped = report.dropped,
            "Dispatch complete"
        );

        report
    }
}

#[async_trait]
impl ChangeHandler for UpdateDispatcher {
    async fn on_change(&self, change: ResourceChange) {
        self.notify(&change.resource_id, change.body, change.version);
    }
}

/// Choose between a patch and a full update for one subscriber
fn build_frame(subscriber: &Subscription, body: &Bytes, version: Version) -> UpdateFrame {
    if subscriber.last_body.is_empty() {
        return UpdateFrame::full(version, body.clone());
    }

    match patch::diff(&subscriber.last_body, body) {
        Ok(ops) if !ops.is_empty() => UpdateFrame::patch(version, subscriber.last_version, ops),
        Ok(_) => {
            tracing::debug!(
                resource = %subscriber.resource_id,
                subscription = %subscriber.id,
                "Diff produced no operations, sending full update"
            );
            UpdateFrame::full(version, body.clone())
        }
        Err(e) => {
            tracing::warn!(
                resource = %subscriber.resource_id,
                subscription = %subscriber.id,
                "Error computing patch, falling back to full update: {}",
                e
            );
            UpdateFrame::full(version, body.clone())
        }
    }
}
