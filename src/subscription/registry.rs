//! Per-resource subscriber buckets

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::id::{IdGenerator, SubscriptionId, UuidIds};
use super::sink::FrameSink;
use crate::resource::ResourceId;
use crate::version::Version;

/// One subscriber's registration and private view of the resource
#[derive(Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub resource_id: ResourceId,
    pub sink: Arc<dyn FrameSink>,
    /// Body last written to this subscriber
    pub last_body: Bytes,
    /// Version of `last_body`
    pub last_version: Version,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("resource_id", &self.resource_id)
            .field("last_version", &self.last_version)
            .field("last_body_len", &self.last_body.len())
            .finish()
    }
}

type Bucket = HashMap<SubscriptionId, Subscription>;

/// Shared registry of live subscriptions
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Never contains an empty bucket
    buckets: RwLock<HashMap<ResourceId, Bucket>>,

    ids: Box<dyn IdGenerator>,
}

impl SubscriptionRegistry {
    /// Create a registry handing out random UUIDs
    pub fn new() -> Self {
        Self::with_id_generator(UuidIds)
    }

    /// Create a registry with a specific ID generator
    pub fn with_id_generator(ids: impl IdGenerator + 'static) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                buckets: RwLock::new(HashMap::new()),
                ids: Box::new(ids),
            }),
        }
    }

    /// Register a subscriber whose baseline is `initial_body`
    ///
    /// Sends nothing; the caller is responsible for the initial frame.
    pub fn add(
        &self,
        resource_id: ResourceId,
        sink: Arc<dyn FrameSink>,
        initial_body: Bytes,
    ) -> SubscriptionId {
        let id = self.inner.ids.next_id();
        let subscription = Subscription {
            id: id.clone(),
            resource_id: resource_id.clone(),
            sink,
            last_version: Version::of(&initial_body),
            last_body: initial_body,
        };

        let count = {
            let mut buckets = self.inner.buckets.write();
            let bucket = buckets.entry(resource_id.clone()).or_default();
            bucket.insert(id.clone(), subscription);
            bucket.len()
        };

        tracing::info!(
            resource = %resource_id,
            subscription = %id,
            subscribers = count,
            "Added subscription"
        );

        id
    }

    /// Deregister a subscriber; removing an unknown subscriber is a no-op
    ///
    /// Returns whether a subscription was removed.
    pub fn remove(&self, resource_id: &ResourceId, id: &SubscriptionId) -> bool {
        let removed = {
            let mut buckets = self.inner.buckets.write();
            match buckets.get_mut(resource_id) {
                Some(bucket) => {
                    let removed = bucket.remove(id).is_some();
                    if bucket.is_empty() {
                        buckets.remove(resource_id);
                    }
                    removed
                }
                None => false,
            }
        };

        if removed {
            tracing::info!(
                resource = %resource_id,
                subscription = %id,
                "Removed subscription"
            );
        }

        removed
    }

    /// Point-in-time copy of a resource's subscribers
    pub fn snapshot(&self, resource_id: &ResourceId) -> Vec<Subscription> {
        let buckets = self.inner.buckets.read();
        buckets
            .get(resource_id)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Record what was just written to one subscriber
    ///
    /// Returns `false` if the subscriber has gone away in the meantime.
    pub fn update_delivered(
        &self,
        resource_id: &ResourceId,
        id: &SubscriptionId,
        body: Bytes,
        version: Version,
    ) -> bool {
        let mut buckets = self.inner.buckets.write();
        match buckets
            .get_mut(resource_id)
            .and_then(|bucket| bucket.get_mut(id))
        {
            Some(subscription) => {
                subscription.last_body = body;
                subscription.last_version = version;
                true
            }
            None => false,
        }
    }

    /// Whether the subscriber is still registered
    pub fn contains(&self, resource_id: &ResourceId, id: &SubscriptionId) -> bool {
        let buckets = self.inner.buckets.read();
        buckets
            .get(resource_id)
            .is_some_and(|bucket| bucket.contains_key(id))
    }

    /// Look up a single subscriber
    pub fn get(&self, resource_id: &ResourceId, id: &SubscriptionId) -> Option<Subscription> {
        let buckets = self.inner.buckets.read();
        buckets
            .get(resource_id)
            .and_then(|bucket| bucket.get(id))
            .cloned()
    }

    /// Number of subscribers for one resource
    pub fn subscriber_count(&self, resource_id: &ResourceId) -> usize {
        let buckets = self.inner.buckets.read();
        buckets.get(resource_id).map_or(0, |bucket| bucket.len())
    }

    /// Number of resources with at least one subscriber
    pub fn resource_count(&self) -> usize {
        self.inner.buckets.read().len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
