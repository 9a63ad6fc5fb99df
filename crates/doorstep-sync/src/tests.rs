//! Tests for the synchronizer state machine, the broadcast feed, and the
//! feature-state applier.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use tokio::{
  sync::mpsc::{UnboundedReceiver, unbounded_channel},
  time::{sleep, timeout},
};
use uuid::Uuid;

use doorstep_core::{
  address::Address,
  building::Building,
  link::{Link, NewLink},
  stats::{BuildingStats, StatsUpdate, StatusColor, VisitStatus},
  store::CampaignStore,
};
use doorstep_resolve::ResolutionCache;
use doorstep_store_sqlite::SqliteStore;

use crate::{
  applier::{FeatureStateApplier, FeatureStateSink},
  feed::{BroadcastFeed, StatsFeed},
  synchronizer::{StatsSynchronizer, SyncState},
};

const WAIT: Duration = Duration::from_secs(2);
const FAST_POLL: Duration = Duration::from_millis(25);
// Long enough that polling never fires within a test.
const NO_POLL: Duration = Duration::from_secs(600);

/// A feed whose subscription always fails to open.
struct DeadFeed;

impl StatsFeed for DeadFeed {
  fn subscribe(
    &self,
    _campaign_id: Uuid,
  ) -> Option<tokio::sync::mpsc::Receiver<StatsUpdate>> {
    None
  }
}

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// Delegates to SQLite while counting polling fetches.
#[derive(Clone)]
struct CountingStore {
  inner: SqliteStore,
  polls: Arc<AtomicUsize>,
}

impl CampaignStore for CountingStore {
  type Error = doorstep_store_sqlite::Error;

  async fn insert_address(&self, address: Address) -> Result<(), Self::Error> {
    self.inner.insert_address(address).await
  }

  async fn get_address(&self, id: Uuid) -> Result<Option<Address>, Self::Error> {
    self.inner.get_address(id).await
  }

  async fn list_addresses(
    &self,
    campaign_id: Uuid,
  ) -> Result<Vec<Address>, Self::Error> {
    self.inner.list_addresses(campaign_id).await
  }

  async fn address_by_external_id(
    &self,
    campaign_id: Uuid,
    external_id: &str,
  ) -> Result<Option<Address>, Self::Error> {
    self.inner.address_by_external_id(campaign_id, external_id).await
  }

  async fn address_by_text(
    &self,
    campaign_id: Uuid,
    text: &str,
  ) -> Result<Option<Address>, Self::Error> {
    self.inner.address_by_text(campaign_id, text).await
  }

  async fn set_address_fallback(
    &self,
    address_id: Uuid,
  ) -> Result<(), Self::Error> {
    self.inner.set_address_fallback(address_id).await
  }

  async fn insert_building(
    &self,
    building: Building,
  ) -> Result<(), Self::Error> {
    self.inner.insert_building(building).await
  }

  async fn get_building(
    &self,
    id: Uuid,
  ) -> Result<Option<Building>, Self::Error> {
    self.inner.get_building(id).await
  }

  async fn list_buildings(
    &self,
    campaign_id: Uuid,
  ) -> Result<Vec<Building>, Self::Error> {
    self.inner.list_buildings(campaign_id).await
  }

  async fn upsert_link(&self, link: NewLink) -> Result<Link, Self::Error> {
    self.inner.upsert_link(link).await
  }

  async fn primary_link_for_address(
    &self,
    campaign_id: Uuid,
    address_id: Uuid,
  ) -> Result<Option<Link>, Self::Error> {
    self.inner.primary_link_for_address(campaign_id, address_id).await
  }

  async fn links_for_building(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
  ) -> Result<Vec<Link>, Self::Error> {
    self.inner.links_for_building(campaign_id, building_id).await
  }

  async fn add_secondary_link(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
    address_id: Uuid,
  ) -> Result<(), Self::Error> {
    self
      .inner
      .add_secondary_link(campaign_id, building_id, address_id)
      .await
  }

  async fn secondary_addresses_for_building(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
  ) -> Result<Vec<Uuid>, Self::Error> {
    self
      .inner
      .secondary_addresses_for_building(campaign_id, building_id)
      .await
  }

  async fn stats_for_entity(
    &self,
    entity_id: Uuid,
  ) -> Result<Option<BuildingStats>, Self::Error> {
    self.inner.stats_for_entity(entity_id).await
  }

  async fn stats_for_campaign(
    &self,
    campaign_id: Uuid,
  ) -> Result<Vec<BuildingStats>, Self::Error> {
    self.polls.fetch_add(1, Ordering::SeqCst);
    self.inner.stats_for_campaign(campaign_id).await
  }

  async fn record_scan(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
  ) -> Result<BuildingStats, Self::Error> {
    self.inner.record_scan(campaign_id, entity_id).await
  }

  async fn set_visit_status(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
    status: VisitStatus,
  ) -> Result<BuildingStats, Self::Error> {
    self.inner.set_visit_status(campaign_id, entity_id, status).await
  }
}

fn update(building_id: Uuid, scans_total: u64, status: VisitStatus) -> StatsUpdate {
  StatsUpdate {
    building_id,
    status,
    scans_total,
    qr_scanned: scans_total > 0,
  }
}

fn channel_callback() -> (
  impl Fn(StatsUpdate) + Send + Sync + 'static,
  UnboundedReceiver<StatsUpdate>,
) {
  let (tx, rx) = unbounded_channel();
  (
    move |u: StatsUpdate| {
      let _ = tx.send(u);
    },
    rx,
  )
}

async fn wait_for_state<S>(sync: &StatsSynchronizer<S>, want: SyncState)
where
  S: CampaignStore + Clone + 'static,
{
  timeout(WAIT, async {
    while sync.state() != want {
      sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .unwrap_or_else(|_| panic!("never reached {want:?}, at {:?}", sync.state()));
}

// ─── Push delivery ───────────────────────────────────────────────────────────

#[tokio::test]
async fn push_updates_reach_the_callback() {
  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    store().await,
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    NO_POLL,
  );
  let campaign = Uuid::new_v4();
  let building = Uuid::new_v4();

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);
  assert_eq!(sync.state(), SyncState::Delivering);

  feed.publish(campaign, update(building, 1, VisitStatus::NotVisited));

  let delivered = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
  assert_eq!(delivered.building_id, building);
  assert_eq!(delivered.scans_total, 1);
  assert!(delivered.qr_scanned);
}

#[tokio::test]
async fn updates_for_other_campaigns_are_not_delivered() {
  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    store().await,
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    NO_POLL,
  );
  let campaign = Uuid::new_v4();

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);

  feed.publish(Uuid::new_v4(), update(Uuid::new_v4(), 1, VisitStatus::Hot));
  sleep(Duration::from_millis(50)).await;
  assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn scans_total_never_decreases() {
  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    store().await,
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    NO_POLL,
  );
  let campaign = Uuid::new_v4();
  let building = Uuid::new_v4();

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);

  feed.publish(campaign, update(building, 5, VisitStatus::NotVisited));
  // A stale, out-of-order snapshot with a lower counter.
  feed.publish(campaign, update(building, 3, VisitStatus::Hot));

  let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
  assert_eq!(first.scans_total, 5);

  let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
  assert_eq!(second.status, VisitStatus::Hot);
  // Clamped to the highest value seen.
  assert_eq!(second.scans_total, 5);
}

#[tokio::test]
async fn duplicate_updates_are_suppressed() {
  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    store().await,
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    NO_POLL,
  );
  let campaign = Uuid::new_v4();
  let building = Uuid::new_v4();

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);

  feed.publish(campaign, update(building, 2, VisitStatus::Visited));
  feed.publish(campaign, update(building, 2, VisitStatus::Visited));

  timeout(WAIT, rx.recv()).await.unwrap().unwrap();
  sleep(Duration::from_millis(50)).await;
  assert!(rx.try_recv().is_err());
}

// ─── Degrading to polling ────────────────────────────────────────────────────

#[tokio::test]
async fn failed_subscription_open_falls_back_to_polling() {
  let s = store().await;
  let campaign = Uuid::new_v4();
  let building = Uuid::new_v4();
  s.record_scan(campaign, building).await.unwrap();

  let sync = StatsSynchronizer::with_poll_interval(
    s.clone(),
    Arc::new(DeadFeed),
    Arc::new(ResolutionCache::new()),
    FAST_POLL,
  );

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);
  assert_eq!(sync.state(), SyncState::Polling);

  // The first poll delivers current state through the same callback
  // interface as push would.
  let seeded = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
  assert_eq!(seeded.building_id, building);
  assert_eq!(seeded.scans_total, 1);

  // A later change is picked up by diffing.
  s.set_visit_status(campaign, building, VisitStatus::Hot)
    .await
    .unwrap();
  let changed = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
  assert_eq!(changed.status, VisitStatus::Hot);
}

#[tokio::test]
async fn push_stream_end_degrades_to_polling() {
  let s = store().await;
  let campaign = Uuid::new_v4();
  let building = Uuid::new_v4();

  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    s.clone(),
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    FAST_POLL,
  );

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);
  assert_eq!(sync.state(), SyncState::Delivering);

  // Kill the push transport.
  feed.close(campaign);
  wait_for_state(&sync, SyncState::Polling).await;

  // Updates keep flowing, now via polling.
  s.record_scan(campaign, building).await.unwrap();
  let delivered = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
  assert_eq!(delivered.building_id, building);
}

// ─── Unsubscribe ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn late_push_after_unsubscribe_is_silent() {
  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    store().await,
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    NO_POLL,
  );
  let campaign = Uuid::new_v4();

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);
  sync.unsubscribe();
  // Idempotent.
  sync.unsubscribe();
  assert_eq!(sync.state(), SyncState::Unsubscribed);

  feed.publish(campaign, update(Uuid::new_v4(), 1, VisitStatus::Hot));
  sleep(Duration::from_millis(50)).await;
  assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unsubscribe_after_degrade_stops_the_polling_timer() {
  let polls = Arc::new(AtomicUsize::new(0));
  let counting = CountingStore {
    inner: store().await,
    polls: polls.clone(),
  };
  let campaign = Uuid::new_v4();

  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    counting,
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    FAST_POLL,
  );

  let (callback, _rx) = channel_callback();
  sync.subscribe(campaign, callback);
  assert_eq!(sync.state(), SyncState::Delivering);

  // Degrade to polling, then tear down while the poll task is being handed
  // over; the timer must stop either way.
  feed.close(campaign);
  wait_for_state(&sync, SyncState::Polling).await;
  sync.unsubscribe();

  sleep(FAST_POLL * 2).await;
  let settled = polls.load(Ordering::SeqCst);
  sleep(FAST_POLL * 4).await;
  assert_eq!(polls.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn resubscribe_replaces_the_old_subscription() {
  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    store().await,
    feed.clone(),
    Arc::new(ResolutionCache::new()),
    NO_POLL,
  );
  let campaign = Uuid::new_v4();
  let building = Uuid::new_v4();

  let (old_callback, mut old_rx) = channel_callback();
  sync.subscribe(campaign, old_callback);

  let (new_callback, mut new_rx) = channel_callback();
  sync.subscribe(campaign, new_callback);

  feed.publish(campaign, update(building, 1, VisitStatus::NotVisited));

  let delivered = timeout(WAIT, new_rx.recv()).await.unwrap().unwrap();
  assert_eq!(delivered.building_id, building);

  sleep(Duration::from_millis(50)).await;
  assert!(old_rx.try_recv().is_err());
}

// ─── Cache invalidation ──────────────────────────────────────────────────────

#[tokio::test]
async fn delivered_update_invalidates_cached_entries() {
  let s = store().await;
  let campaign = Uuid::new_v4();
  let building = Uuid::new_v4();

  let cache = Arc::new(ResolutionCache::new());
  // Any record will do for occupying the key.
  let placeholder = {
    use doorstep_core::{
      address::{Address, SourceTier},
      record::{ChainStep, ResolvedRecord},
    };
    ResolvedRecord {
      address:      Address {
        address_id:   Uuid::new_v4(),
        campaign_id:  campaign,
        lon:          0.0,
        lat:          0.0,
        formatted:    String::new(),
        house_number: None,
        street_name:  None,
        source_tier:  SourceTier::PrimarySource,
        building_id:  Some(building),
        external_id:  None,
      },
      building:     None,
      stats:        None,
      status_color: StatusColor::Red,
      match_method: None,
      confidence:   None,
      source_tier:  SourceTier::PrimarySource,
      resolved_via: ChainStep::FastPath,
    }
  };
  cache.store(campaign, building, placeholder);

  let feed = Arc::new(BroadcastFeed::new());
  let sync = StatsSynchronizer::with_poll_interval(
    s,
    feed.clone(),
    cache.clone(),
    NO_POLL,
  );

  let (callback, mut rx) = channel_callback();
  sync.subscribe(campaign, callback);
  feed.publish(campaign, update(building, 1, VisitStatus::NotVisited));
  timeout(WAIT, rx.recv()).await.unwrap().unwrap();

  timeout(WAIT, async {
    while cache.lookup(campaign, building).is_some() {
      sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .expect("cache entry still present");
}

// ─── Feature-state applier ───────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
  calls: Mutex<Vec<(Uuid, StatusColor)>>,
}

impl FeatureStateSink for RecordingSink {
  fn set_feature_color(&self, entity_id: Uuid, color: StatusColor) {
    self.calls.lock().unwrap().push((entity_id, color));
  }
}

#[test]
fn applier_is_idempotent_per_entity() {
  let applier = FeatureStateApplier::new(RecordingSink::default());
  let entity = Uuid::new_v4();

  applier.apply_status(entity, StatusColor::Purple);
  applier.apply_status(entity, StatusColor::Purple);
  assert_eq!(applier.sink().calls.lock().unwrap().len(), 1);

  // A genuine change still goes through.
  applier.apply_status(entity, StatusColor::Green);
  assert_eq!(applier.sink().calls.lock().unwrap().len(), 2);
}

#[test]
fn applier_reset_forgets_applied_state() {
  let applier = FeatureStateApplier::new(RecordingSink::default());
  let entity = Uuid::new_v4();

  applier.apply_status(entity, StatusColor::Blue);
  applier.reset();
  applier.apply_status(entity, StatusColor::Blue);
  assert_eq!(applier.sink().calls.lock().unwrap().len(), 2);
}
