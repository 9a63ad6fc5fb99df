//! The push-then-poll stats synchronizer.
//!
//! State machine: `Idle → (Delivering | Polling) → Unsubscribed`. Push
//! delivery is preferred; when the feed declines a subscription or the push
//! stream ends (transport drop, lagged subscriber), the synchronizer
//! degrades to interval polling against the store. Both paths deliver
//! through the same callback, clamp `scans_total` to be monotonically
//! non-decreasing, and trigger targeted cache invalidation.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use tokio::task::JoinHandle;
use uuid::Uuid;

use doorstep_core::{stats::StatsUpdate, store::CampaignStore};
use doorstep_resolve::ResolutionCache;

use crate::feed::StatsFeed;

/// Fixed polling fallback interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  /// Push subscription open and flowing.
  Delivering,
  /// Push unavailable; diffing the store on an interval timer.
  Polling,
  Unsubscribed,
}

pub type UpdateCallback = Arc<dyn Fn(StatsUpdate) + Send + Sync>;

struct Shared {
  state:      SyncState,
  /// Bumped on every subscribe/unsubscribe; stale tasks check it before
  /// touching state, so an aborted task caught mid-await cannot emit.
  generation: u64,
  campaign:   Option<Uuid>,
  callback:   Option<UpdateCallback>,
  last_seen:  HashMap<Uuid, StatsUpdate>,
  tasks:      Vec<JoinHandle<()>>,
}

/// Keeps one campaign's live stats flowing to one owning context (a map
/// screen, an SSE connection). At most one subscription is active at a time;
/// a second `subscribe` resets it rather than leaking a second timer.
pub struct StatsSynchronizer<S> {
  store:         S,
  feed:          Arc<dyn StatsFeed>,
  cache:         Arc<ResolutionCache>,
  poll_interval: Duration,
  shared:        Arc<Mutex<Shared>>,
}

impl<S> StatsSynchronizer<S>
where
  S: CampaignStore + Clone + 'static,
{
  pub fn new(store: S, feed: Arc<dyn StatsFeed>, cache: Arc<ResolutionCache>) -> Self {
    Self::with_poll_interval(store, feed, cache, DEFAULT_POLL_INTERVAL)
  }

  pub fn with_poll_interval(
    store: S,
    feed: Arc<dyn StatsFeed>,
    cache: Arc<ResolutionCache>,
    poll_interval: Duration,
  ) -> Self {
    Self {
      store,
      feed,
      cache,
      poll_interval,
      shared: Arc::new(Mutex::new(Shared {
        state:      SyncState::Idle,
        generation: 0,
        campaign:   None,
        callback:   None,
        last_seen:  HashMap::new(),
        tasks:      Vec::new(),
      })),
    }
  }

  pub fn state(&self) -> SyncState {
    lock(&self.shared).state
  }

  /// Open a subscription for `campaign_id`, delivering every update through
  /// `callback`.
  ///
  /// Calling this while already subscribed resets the existing subscription
  /// in place. The callback runs under the synchronizer's lock and must not
  /// block.
  pub fn subscribe(
    &self,
    campaign_id: Uuid,
    callback: impl Fn(StatsUpdate) + Send + Sync + 'static,
  ) {
    let generation;
    let stale_tasks;
    {
      let mut shared = lock(&self.shared);
      stale_tasks = std::mem::take(&mut shared.tasks);
      shared.generation += 1;
      generation = shared.generation;
      shared.campaign = Some(campaign_id);
      shared.callback = Some(Arc::new(callback));
      shared.last_seen.clear();
      shared.state = SyncState::Idle;
    }
    for task in stale_tasks {
      task.abort();
    }

    let receiver = self.feed.subscribe(campaign_id);

    // The task only emits while this generation is current, so set the
    // state before spawning it.
    {
      let mut shared = lock(&self.shared);
      if shared.generation != generation {
        // An unsubscribe raced us.
        return;
      }
      shared.state = match receiver {
        Some(_) => SyncState::Delivering,
        None => {
          tracing::info!(%campaign_id, "push feed unavailable, polling");
          SyncState::Polling
        },
      };
    }

    let ctx = self.task_ctx(campaign_id, generation);
    let task = match receiver {
      Some(receiver) => tokio::spawn(ctx.deliver(receiver)),
      None => tokio::spawn(ctx.poll()),
    };

    let mut shared = lock(&self.shared);
    if shared.generation == generation {
      shared.tasks.push(task);
    } else {
      task.abort();
    }
  }

  /// Tear the subscription down. Idempotent and synchronous: once this
  /// returns, no further callback invocation can occur, even for push
  /// events already in flight.
  pub fn unsubscribe(&self) {
    let stale_tasks;
    {
      let mut shared = lock(&self.shared);
      shared.state = SyncState::Unsubscribed;
      shared.generation += 1;
      shared.campaign = None;
      shared.callback = None;
      shared.last_seen.clear();
      stale_tasks = std::mem::take(&mut shared.tasks);
    }
    for task in stale_tasks {
      task.abort();
    }
  }

  fn task_ctx(&self, campaign_id: Uuid, generation: u64) -> TaskCtx<S> {
    TaskCtx {
      store: self.store.clone(),
      cache: Arc::clone(&self.cache),
      shared: Arc::clone(&self.shared),
      campaign_id,
      generation,
      poll_interval: self.poll_interval,
    }
  }
}

impl<S> Drop for StatsSynchronizer<S> {
  fn drop(&mut self) {
    for task in std::mem::take(&mut lock(&self.shared).tasks) {
      task.abort();
    }
  }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
  shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Background tasks ────────────────────────────────────────────────────────

struct TaskCtx<S> {
  store:         S,
  cache:         Arc<ResolutionCache>,
  shared:        Arc<Mutex<Shared>>,
  campaign_id:   Uuid,
  generation:    u64,
  poll_interval: Duration,
}

impl<S> TaskCtx<S>
where
  S: CampaignStore + Clone + 'static,
{
  /// Forward push events until the stream ends, then degrade to polling.
  async fn deliver(self, mut receiver: tokio::sync::mpsc::Receiver<StatsUpdate>) {
    while let Some(update) = receiver.recv().await {
      if self.emit(update) {
        self.invalidate(update.building_id).await;
      }
    }

    // Stream ended without an unsubscribe: the push transport is gone.
    let degrade = {
      let mut shared = lock(&self.shared);
      if shared.generation == self.generation
        && shared.state == SyncState::Delivering
      {
        shared.state = SyncState::Polling;
        true
      } else {
        false
      }
    };
    if degrade {
      tracing::warn!(campaign_id = %self.campaign_id, "push feed ended, polling");
      let shared = Arc::clone(&self.shared);
      let generation = self.generation;
      let task = tokio::spawn(self.poll());
      let mut shared = lock(&shared);
      if shared.generation == generation {
        shared.tasks.push(task);
      } else {
        // An unsubscribe raced the degrade; don't leave the timer running.
        task.abort();
      }
    }
  }

  /// Interval-poll the store and emit a diff against last-seen values.
  async fn poll(self) {
    let mut interval = tokio::time::interval(self.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
      interval.tick().await;
      match self.store.stats_for_campaign(self.campaign_id).await {
        Ok(rows) => {
          for row in rows {
            let update = StatsUpdate {
              building_id: row.entity_id,
              status:      row.status,
              scans_total: row.scans_total,
              qr_scanned:  row.qr_scanned(),
            };
            if self.emit(update) {
              self.invalidate(update.building_id).await;
            }
          }
        },
        // Transient fetch failure: keep the existing schedule, no retry
        // storm.
        Err(err) => {
          tracing::warn!(campaign_id = %self.campaign_id, %err, "polling fetch failed");
        },
      }
    }
  }

  /// Clamp, dedup, and deliver one update. Returns whether the callback ran.
  ///
  /// Runs entirely under the shared lock so it serializes against
  /// `unsubscribe`: after unsubscribe returns, the generation check makes
  /// any late event a no-op.
  fn emit(&self, mut update: StatsUpdate) -> bool {
    let shared = &mut *lock(&self.shared);
    if shared.generation != self.generation
      || !matches!(shared.state, SyncState::Delivering | SyncState::Polling)
    {
      return false;
    }

    update.qr_scanned = update.qr_scanned || update.scans_total > 0;
    if let Some(prev) = shared.last_seen.get(&update.building_id) {
      // scans_total never goes backwards within a session.
      if update.scans_total < prev.scans_total {
        update.scans_total = prev.scans_total;
        update.qr_scanned = update.qr_scanned || prev.qr_scanned;
      }
      if *prev == update {
        return false;
      }
    }
    shared.last_seen.insert(update.building_id, update);

    if let Some(callback) = &shared.callback {
      callback(update);
      true
    } else {
      false
    }
  }

  /// A delivered update makes cached records for the building stale; drop
  /// the building-keyed entry and fan out to its linked addresses.
  async fn invalidate(&self, building_id: Uuid) {
    if let Err(err) = self
      .cache
      .invalidate_for_building(&self.store, self.campaign_id, building_id)
      .await
    {
      tracing::warn!(%building_id, %err, "cache invalidation failed");
    }
  }
}
