//! Live status synchronization.
//!
//! The [`StatsSynchronizer`] keeps per-building visit/scan counters current:
//! it subscribes to a push feed when one is available and degrades to
//! interval polling when it is not. Updates flow through one callback
//! interface either way, then into the [`FeatureStateApplier`] and targeted
//! cache invalidation. Transient failures are logged and absorbed; they
//! never propagate to the caller.

pub mod applier;
pub mod feed;
pub mod synchronizer;

pub use applier::{FeatureStateApplier, FeatureStateSink};
pub use feed::{BroadcastFeed, StatsFeed};
pub use synchronizer::{
  DEFAULT_POLL_INTERVAL, StatsSynchronizer, SyncState, UpdateCallback,
};

#[cfg(test)]
mod tests;
