//! # Event Broadcasting
//!
//! Publish/subscribe fan-out of lifecycle milestones plus pollable progress tracking.

pub mod broadcaster;
pub mod types;

pub use broadcaster::{EventBroadcaster, EventSubscriber, SubscriptionStats};
pub use types::{BroadcastEvent, EventKind, EventQuery, EventSeverity, ProgressOperation, Subscription};
