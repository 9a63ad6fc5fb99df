//! The ordered resolution chain.
//!
//! Steps run cheapest-and-most-authoritative first; the first success
//! short-circuits the rest. Exhausting every step is not an error — it
//! yields [`Resolution::Unlinked`], which callers render as a degraded view.

use uuid::Uuid;

use doorstep_core::{
  address::{Address, SourceTier},
  record::{ChainStep, FeatureRef, FeatureTier, Resolution, ResolvedRecord},
  stats::{BuildingStats, StatusColor},
  store::CampaignStore,
};

use crate::{Error, Result};

/// Declaration order is execution order.
const STEPS: [ChainStep; 5] = [
  ChainStep::FastPath,
  ChainStep::PrimaryLink,
  ChainStep::ExternalId,
  ChainStep::SecondaryJoin,
  ChainStep::FuzzyText,
];

/// Resolves tapped features against a campaign store.
#[derive(Clone)]
pub struct ResolutionChain<S> {
  store: S,
}

impl<S> ResolutionChain<S>
where
  S: CampaignStore,
{
  pub fn new(store: S) -> Self { Self { store } }

  pub fn store(&self) -> &S { &self.store }

  /// Run the chain. First step to produce a record wins.
  pub async fn resolve(
    &self,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Resolution> {
    for step in STEPS {
      if let Some(record) = self.try_step(step, campaign_id, feature).await? {
        tracing::debug!(feature_id = %feature.feature_id, ?step, "resolved");
        return Ok(Resolution::Resolved(record));
      }
    }
    tracing::debug!(feature_id = %feature.feature_id, "unlinked feature");
    Ok(Resolution::Unlinked { feature_id: feature.feature_id.clone() })
  }

  async fn try_step(
    &self,
    step: ChainStep,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Option<ResolvedRecord>> {
    match step {
      ChainStep::FastPath => self.fast_path(campaign_id, feature),
      ChainStep::PrimaryLink => {
        self.primary_link(campaign_id, feature).await
      },
      ChainStep::ExternalId => self.external_id(campaign_id, feature).await,
      ChainStep::SecondaryJoin => {
        self.secondary_join(campaign_id, feature).await
      },
      ChainStep::FuzzyText => self.fuzzy_text(campaign_id, feature).await,
    }
  }

  // ── Step 1: fast path ─────────────────────────────────────────────────────

  /// Primary- and fallback-tier ingestion writes address fields onto every
  /// feature, so the record can be built from the feature's own properties
  /// with zero store queries.
  fn fast_path(
    &self,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Option<ResolvedRecord>> {
    if !matches!(feature.tier, FeatureTier::Primary | FeatureTier::Fallback) {
      return Ok(None);
    }
    let Some(address_id) = feature.address_id else {
      return Ok(None);
    };

    let building_id = match feature.tier {
      FeatureTier::Fallback => None,
      _ => feature.building_id(),
    };
    let entity_id = building_id.unwrap_or(address_id);

    let address = Address {
      address_id,
      campaign_id,
      lon: feature.lon,
      lat: feature.lat,
      formatted: feature.address_text.clone().unwrap_or_default(),
      house_number: feature.house_number.clone(),
      street_name: feature.street_name.clone(),
      source_tier: match feature.tier {
        FeatureTier::Fallback => SourceTier::Fallback,
        _ => SourceTier::PrimarySource,
      },
      building_id,
      external_id: feature.external_id.clone(),
    };

    let stats = BuildingStats {
      entity_id,
      campaign_id,
      scans_total: feature.scans_total,
      scans_today: 0,
      last_scan_at: None,
      status: feature.status,
    };

    Ok(Some(ResolvedRecord {
      status_color: stats.status_color(),
      stats: Some(stats),
      address,
      building: None,
      match_method: feature.match_method,
      confidence: feature.confidence,
      source_tier: match feature.tier {
        FeatureTier::Fallback => SourceTier::Fallback,
        _ => SourceTier::PrimarySource,
      },
      resolved_via: ChainStep::FastPath,
    }))
  }

  // ── Step 2: primary-tier link lookup ──────────────────────────────────────

  async fn primary_link(
    &self,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Option<ResolvedRecord>> {
    let Some(address_id) = feature.address_id else {
      return Ok(None);
    };
    let Some(link) = self
      .store
      .primary_link_for_address(campaign_id, address_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };
    let Some(address) = self
      .store
      .get_address(address_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };

    self
      .assemble(campaign_id, address, ChainStep::PrimaryLink)
      .await
      .map(|mut record| {
        record.match_method = Some(link.method);
        record.confidence = Some(link.confidence);
        Some(record)
      })
  }

  // ── Step 3: external parcel-id lookup ─────────────────────────────────────

  async fn external_id(
    &self,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Option<ResolvedRecord>> {
    let Some(external_id) = feature.external_id.as_deref() else {
      return Ok(None);
    };
    let Some(address) = self
      .store
      .address_by_external_id(campaign_id, external_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };

    self
      .assemble(campaign_id, address, ChainStep::ExternalId)
      .await
      .map(Some)
  }

  // ── Step 4: secondary-tier join lookup ────────────────────────────────────

  async fn secondary_join(
    &self,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Option<ResolvedRecord>> {
    let Some(building_id) = feature.building_id() else {
      return Ok(None);
    };
    let address_ids = self
      .store
      .secondary_addresses_for_building(campaign_id, building_id)
      .await
      .map_err(Error::store)?;
    let Some(&address_id) = address_ids.first() else {
      return Ok(None);
    };
    let Some(mut address) = self
      .store
      .get_address(address_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };

    // Secondary-tier addresses carry no mirrored building id; the join row
    // itself is the association.
    address.building_id = address.building_id.or(Some(building_id));

    self
      .assemble(campaign_id, address, ChainStep::SecondaryJoin)
      .await
      .map(Some)
  }

  // ── Step 5: fuzzy text fallback ───────────────────────────────────────────

  async fn fuzzy_text(
    &self,
    campaign_id: Uuid,
    feature: &FeatureRef,
  ) -> Result<Option<ResolvedRecord>> {
    let Some(text) = feature.address_text.as_deref() else {
      return Ok(None);
    };
    if text.trim().is_empty() {
      return Ok(None);
    }
    let Some(address) = self
      .store
      .address_by_text(campaign_id, text)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };

    self
      .assemble(campaign_id, address, ChainStep::FuzzyText)
      .await
      .map(Some)
  }

  // ── Assembly ──────────────────────────────────────────────────────────────

  /// Join an address with its building (if any), live stats, and derived
  /// status color.
  async fn assemble(
    &self,
    campaign_id: Uuid,
    address: Address,
    resolved_via: ChainStep,
  ) -> Result<ResolvedRecord> {
    let link = self
      .store
      .primary_link_for_address(campaign_id, address.address_id)
      .await
      .map_err(Error::store)?;

    let building_id = address
      .building_id
      .or_else(|| link.as_ref().map(|l| l.building_id));
    let building = match building_id {
      Some(id) => self.store.get_building(id).await.map_err(Error::store)?,
      None => None,
    };

    // Stats are keyed by building id when a footprint exists, otherwise by
    // address id.
    let entity_id = building_id.unwrap_or(address.address_id);
    let stats = self
      .store
      .stats_for_entity(entity_id)
      .await
      .map_err(Error::store)?;

    let status_color = stats
      .as_ref()
      .map(BuildingStats::status_color)
      .unwrap_or(StatusColor::Red);

    Ok(ResolvedRecord {
      source_tier: address.source_tier,
      match_method: link.as_ref().map(|l| l.method),
      confidence: link.as_ref().map(|l| l.confidence),
      address,
      building,
      stats,
      status_color,
      resolved_via,
    })
  }
}
