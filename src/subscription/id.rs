//! Subscription identifiers

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Opaque subscription identifier, unique within a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh subscription IDs
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> SubscriptionId;
}

/// Monotonic counter starting at 1
#[derive(Debug, Default)]
pub struct SequentialIds {
    last: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> SubscriptionId {
        let id = self.last.fetch_add(1, Ordering::Relaxed) + 1;
        SubscriptionId(id.to_string())
    }
}

/// Random v4 UUIDs
#[derive(Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids_are_monotonic() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id().as_str(), "1");
        assert_eq!(ids.next_id().as_str(), "2");
        assert_eq!(ids.next_id().as_str(), "3");
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
