//! Incremental feature-state writes to the render engine.

use std::{
  collections::HashMap,
  sync::{Mutex, PoisonError},
};

use uuid::Uuid;

use doorstep_core::stats::StatusColor;

/// The render engine's per-feature property write, as seen by the core.
///
/// Implementations receive one `(entity, color)` pair at a time; the applier
/// guarantees a sink never sees the same color twice in a row for the same
/// entity.
pub trait FeatureStateSink: Send + Sync {
  fn set_feature_color(&self, entity_id: Uuid, color: StatusColor);
}

/// Applies status-color updates to a [`FeatureStateSink`] incrementally,
/// never re-sending the full dataset.
pub struct FeatureStateApplier<K> {
  sink:    K,
  applied: Mutex<HashMap<Uuid, StatusColor>>,
}

impl<K> FeatureStateApplier<K>
where
  K: FeatureStateSink,
{
  pub fn new(sink: K) -> Self {
    Self { sink, applied: Mutex::new(HashMap::new()) }
  }

  pub fn sink(&self) -> &K { &self.sink }

  /// Push one feature's color. Idempotent: re-applying the current color is
  /// a no-op.
  pub fn apply_status(&self, entity_id: Uuid, color: StatusColor) {
    let mut applied =
      self.applied.lock().unwrap_or_else(PoisonError::into_inner);
    if applied.get(&entity_id) == Some(&color) {
      return;
    }
    applied.insert(entity_id, color);
    self.sink.set_feature_color(entity_id, color);
  }

  /// Forget the applied state, e.g. after the render engine reloaded the
  /// full dataset.
  pub fn reset(&self) {
    self
      .applied
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
  }
}
