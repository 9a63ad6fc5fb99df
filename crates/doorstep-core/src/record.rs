//! The resolved aggregate view and the tapped-feature reference it is
//! computed from.
//!
//! A [`ResolvedRecord`] is never stored; it is assembled on demand by the
//! resolution chain and lives only in the resolution cache.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  address::{Address, SourceTier},
  building::Building,
  link::MatchMethod,
  stats::{BuildingStats, StatusColor, VisitStatus},
};

// ─── FeatureRef ──────────────────────────────────────────────────────────────

/// Which ingestion path wrote this map feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureTier {
  Primary,
  Secondary,
  Fallback,
}

/// The identifying fields carried by a tapped map feature.
///
/// Whatever the ingestion job knew about the feature is embedded in its
/// properties; the resolution chain tries them cheapest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRef {
  /// The feature id — a building UUID for footprint features, an address
  /// UUID for point-only fallback features.
  pub feature_id:   String,
  pub tier:         FeatureTier,
  /// Representative point of the tapped geometry (the point itself, or the
  /// footprint centroid).
  pub lon:          f64,
  pub lat:          f64,
  pub address_id:   Option<Uuid>,
  pub address_text: Option<String>,
  pub house_number: Option<String>,
  pub street_name:  Option<String>,
  pub external_id:  Option<String>,
  pub status:       VisitStatus,
  pub scans_total:  u64,
  pub confidence:   Option<f64>,
  pub match_method: Option<MatchMethod>,
}

impl FeatureRef {
  /// The feature id parsed as a building UUID, if it is one.
  pub fn building_id(&self) -> Option<Uuid> {
    Uuid::parse_str(&self.feature_id).ok()
  }

  /// The entity id used as the cache key: the feature's own UUID when
  /// parseable, otherwise the embedded address id.
  pub fn entity_id(&self) -> Option<Uuid> {
    self.building_id().or(self.address_id)
  }
}

// ─── ChainStep ───────────────────────────────────────────────────────────────

/// Which resolution step produced a record. Steps run in declaration order;
/// the first success short-circuits the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStep {
  FastPath,
  PrimaryLink,
  ExternalId,
  SecondaryJoin,
  FuzzyText,
}

// ─── ResolvedRecord ──────────────────────────────────────────────────────────

/// The aggregate view returned to callers: address + building (if any) +
/// live stats + derived color.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedRecord {
  pub address:      Address,
  pub building:     Option<Building>,
  pub stats:        Option<BuildingStats>,
  pub status_color: StatusColor,
  pub match_method: Option<MatchMethod>,
  pub confidence:   Option<f64>,
  pub source_tier:  SourceTier,
  pub resolved_via: ChainStep,
}

/// Outcome of resolving a tapped feature.
///
/// `Unlinked` is a distinct, non-error state: the geometry exists but no
/// address ever matched it. Callers render a degraded view (e.g. allow
/// marking visited without full address context) rather than fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
  Resolved(ResolvedRecord),
  Unlinked { feature_id: String },
}

impl Resolution {
  pub fn record(&self) -> Option<&ResolvedRecord> {
    match self {
      Self::Resolved(r) => Some(r),
      Self::Unlinked { .. } => None,
    }
  }
}
