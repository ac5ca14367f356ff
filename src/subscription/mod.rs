//! Subscription registry
//!
//! Tracks, per resource, the live subscribers and what each one was last
//! sent. Subscribers of the same resource can sit at different versions;
//! each one's patches are always based on its own last delivery.
//!
//! # Locking
//!
//! A single `parking_lot::RwLock` guards the per-resource buckets.
//! Inserts, removals and delivery updates take it exclusively, snapshots
//! take it shared. It is never held across an `.await`, so no connection
//! write ever happens under the lock.

mod id;
mod registry;
mod sink;

pub use id::{IdGenerator, SequentialIds, SubscriptionId, UuidIds};
pub use registry::{Subscription, SubscriptionRegistry};
pub use sink::{ChannelSink, FrameSink, SinkError};
