//! Push-based change feeds.
//!
//! [`StatsFeed`] is the seam between the synchronizer and whatever transport
//! delivers change events. [`BroadcastFeed`] is the in-process
//! implementation used by the server: write paths publish into a
//! per-campaign broadcast channel, subscribers get a forwarded mpsc stream.

use std::{
  collections::HashMap,
  sync::{Mutex, PoisonError},
};

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use doorstep_core::stats::StatsUpdate;

/// A source of push-delivered stats updates.
pub trait StatsFeed: Send + Sync + 'static {
  /// Open a push subscription scoped to one campaign.
  ///
  /// Returns `None` when push delivery is unavailable; the caller degrades
  /// to polling. The subscription ends when the returned receiver yields
  /// `None`.
  fn subscribe(&self, campaign_id: Uuid) -> Option<mpsc::Receiver<StatsUpdate>>;
}

const FEED_BUFFER: usize = 64;

/// In-process feed backed by per-campaign [`broadcast`] channels.
pub struct BroadcastFeed {
  channels: Mutex<HashMap<Uuid, broadcast::Sender<StatsUpdate>>>,
}

impl Default for BroadcastFeed {
  fn default() -> Self { Self::new() }
}

impl BroadcastFeed {
  pub fn new() -> Self { Self { channels: Mutex::new(HashMap::new()) } }

  fn lock(
    &self,
  ) -> std::sync::MutexGuard<'_, HashMap<Uuid, broadcast::Sender<StatsUpdate>>>
  {
    self.channels.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Publish an update to every subscriber of `campaign_id`. A campaign with
  /// no subscribers drops the update silently.
  pub fn publish(&self, campaign_id: Uuid, update: StatsUpdate) {
    let sender = self.lock().get(&campaign_id).cloned();
    if let Some(sender) = sender {
      // Err means no live receivers; nothing to deliver to.
      let _ = sender.send(update);
    }
  }

  /// Tear down the channel for a campaign, ending every open subscription.
  pub fn close(&self, campaign_id: Uuid) {
    self.lock().remove(&campaign_id);
  }
}

impl StatsFeed for BroadcastFeed {
  fn subscribe(&self, campaign_id: Uuid) -> Option<mpsc::Receiver<StatsUpdate>> {
    let mut rx = {
      let mut channels = self.lock();
      channels
        .entry(campaign_id)
        .or_insert_with(|| broadcast::channel(FEED_BUFFER).0)
        .subscribe()
    };

    let (tx, forwarded) = mpsc::channel(FEED_BUFFER);
    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(update) => {
            if tx.send(update).await.is_err() {
              break;
            }
          },
          // A lagged subscriber has lost events and can no longer trust its
          // last-seen state; end the subscription so the synchronizer
          // degrades to polling.
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(%campaign_id, skipped, "feed subscriber lagged");
            break;
          },
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });

    Some(forwarded)
  }
}
