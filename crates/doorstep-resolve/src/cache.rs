//! Read-through resolution cache with an absolute TTL.
//!
//! Keyed by `(campaign_id, entity_id)`, where the entity id is a building id
//! or an address id depending on which the tapped feature carried. Write
//! paths must invalidate both possible keys for an affected record;
//! [`ResolutionCache::invalidate_for_building`] performs the multi-unit
//! fan-out.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
  time::{Duration, Instant},
};

use uuid::Uuid;

use doorstep_core::{
  record::{FeatureRef, Resolution, ResolvedRecord},
  store::CampaignStore,
};

use crate::{Error, Result, chain::ResolutionChain};

/// Absolute (not sliding) time-to-live for cached records.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
  stored_at: Instant,
  record:    ResolvedRecord,
}

/// The cache map itself. Concurrency is low-contention reads from UI
/// interactions, so a single mutex around the map is sufficient.
pub struct ResolutionCache {
  ttl:     Duration,
  entries: Mutex<HashMap<(Uuid, Uuid), Entry>>,
}

impl Default for ResolutionCache {
  fn default() -> Self { Self::new() }
}

impl ResolutionCache {
  pub fn new() -> Self { Self::with_ttl(DEFAULT_CACHE_TTL) }

  pub fn with_ttl(ttl: Duration) -> Self {
    Self { ttl, entries: Mutex::new(HashMap::new()) }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(Uuid, Uuid), Entry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Fetch a live entry, pruning expired ones opportunistically.
  pub fn lookup(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
  ) -> Option<ResolvedRecord> {
    let mut entries = self.lock();
    let now = Instant::now();
    entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
    entries
      .get(&(campaign_id, entity_id))
      .map(|entry| entry.record.clone())
  }

  pub fn store(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
    record: ResolvedRecord,
  ) {
    self.lock().insert(
      (campaign_id, entity_id),
      Entry { stored_at: Instant::now(), record },
    );
  }

  /// Remove one entry. Safe to call for keys that were never cached.
  pub fn invalidate(&self, campaign_id: Uuid, entity_id: Uuid) {
    self.lock().remove(&(campaign_id, entity_id));
  }

  /// Remove all expired entries.
  pub fn prune(&self) {
    let mut entries = self.lock();
    let now = Instant::now();
    entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
  }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.lock().is_empty() }

  /// Invalidate the building-keyed entry plus every address linked to the
  /// building through either tier. A building-level status change affects
  /// all of them (multi-unit fan-out), so the conservative default is to
  /// drop them all.
  pub async fn invalidate_for_building<S>(
    &self,
    store: &S,
    campaign_id: Uuid,
    building_id: Uuid,
  ) -> Result<()>
  where
    S: CampaignStore,
  {
    self.invalidate(campaign_id, building_id);

    let links = store
      .links_for_building(campaign_id, building_id)
      .await
      .map_err(Error::store)?;
    for link in links {
      self.invalidate(campaign_id, link.address_id);
    }

    let secondary = store
      .secondary_addresses_for_building(campaign_id, building_id)
      .await
      .map_err(Error::store)?;
    for address_id in secondary {
      self.invalidate(campaign_id, address_id);
    }

    Ok(())
  }
}

// ─── CachedResolver ──────────────────────────────────────────────────────────

/// A [`ResolutionChain`] behind a [`ResolutionCache`]: computes on miss,
/// returns the cached record on hit.
///
/// Unlinked outcomes are never cached — an orphaned feature stays cheap to
/// re-check and becomes resolvable the moment ingestion links it.
pub struct CachedResolver<S> {
  chain: ResolutionChain<S>,
  cache: Arc<ResolutionCache>,
}

impl<S> CachedResolver<S>
where
  S: CampaignStore,
{
  pub fn new(store: S) -> Self {
    Self::with_cache(store, Arc::new(ResolutionCache::new()))
  }

  pub fn with_cache(store: S, cache: Arc<ResolutionCache>) -> Self {
    Self { chain: ResolutionChain::new(store), cache }
  }

  pub fn cache(&self) -> &ResolutionCache { &self.cache }

  /// The cache handle, for sharing with components that invalidate entries
  /// (e.g. a stats synchronizer).
  pub fn shared_cache(&self) -> Arc<ResolutionCache> { Arc::clone(&self.cache) }

  pub fn store(&self) -> &S { self.chain.store() }

  /// Resolve a tapped feature through the cache.
  ///
  /// The record is cached under the key the caller looked up with — the
  /// feature's own entity id — never under derived keys.
  pub async fn resolve(
    &self,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Resolution> {
    let entity_id = feature.entity_id();

    if let Some(entity_id) = entity_id {
      if let Some(record) = self.cache.lookup(campaign_id, entity_id) {
        return Ok(Resolution::Resolved(record));
      }
    }

    let resolution = self.chain.resolve(campaign_id, feature).await?;

    if let (Some(entity_id), Resolution::Resolved(record)) =
      (entity_id, &resolution)
    {
      self.cache.store(campaign_id, entity_id, record.clone());
    }

    Ok(resolution)
  }
}
