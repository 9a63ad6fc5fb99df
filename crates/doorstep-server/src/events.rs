//! SSE stream of per-feature status-color updates.
//!
//! Each connection owns its own [`StatsSynchronizer`] and
//! [`FeatureStateApplier`]; the applier's dedup means a connection never
//! sees the same color twice in a row for an entity. Dropping the stream
//! tears the subscription down exactly once.

use std::{convert::Infallible, sync::Arc};

use axum::response::sse::{Event, KeepAlive, Sse};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt as _, wrappers::UnboundedReceiverStream};
use uuid::Uuid;

use doorstep_core::{stats::StatusColor, store::CampaignStore};
use doorstep_sync::{
  FeatureStateApplier, FeatureStateSink, StatsFeed, StatsSynchronizer,
};

use crate::AppState;

struct SseSink {
  tx: mpsc::UnboundedSender<(Uuid, StatusColor)>,
}

impl FeatureStateSink for SseSink {
  fn set_feature_color(&self, entity_id: Uuid, color: StatusColor) {
    // Err means the connection is gone; teardown is already underway.
    let _ = self.tx.send((entity_id, color));
  }
}

struct TeardownGuard<S: CampaignStore + Clone + 'static>(StatsSynchronizer<S>);

impl<S: CampaignStore + Clone + 'static> Drop for TeardownGuard<S> {
  fn drop(&mut self) {
    self.0.unsubscribe();
  }
}

/// Build the SSE response for one campaign subscription.
pub fn status_stream<S>(
  state: &AppState<S>,
  campaign_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<S>>
where
  S: CampaignStore + Clone + 'static,
{
  let (tx, rx) = mpsc::unbounded_channel();
  let applier = Arc::new(FeatureStateApplier::new(SseSink { tx }));

  let synchronizer = StatsSynchronizer::new(
    state.resolver.store().clone(),
    Arc::clone(&state.feed) as Arc<dyn StatsFeed>,
    state.resolver.shared_cache(),
  );
  {
    let applier = Arc::clone(&applier);
    synchronizer.subscribe(campaign_id, move |update| {
      applier.apply_status(update.building_id, update.status_color());
    });
  }

  let guard = TeardownGuard(synchronizer);
  let stream = UnboundedReceiverStream::new(rx).map(move |(entity_id, color)| {
    // The guard lives as long as the stream does.
    let _bound_to_stream = &guard;
    Ok::<_, Infallible>(
      Event::default().event("status").data(
        json!({
          "entity_id":    entity_id,
          "status_color": color.as_str(),
        })
        .to_string(),
      ),
    )
  });

  Sse::new(stream).keep_alive(KeepAlive::default())
}
