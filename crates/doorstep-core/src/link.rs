//! Link — the association between one address and one building.
//!
//! A building may be linked to many addresses (multi-unit), but at most one
//! link per (campaign, address) is *primary*. The store enforces the
//! invariant by demoting any prior primary link inside the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the spatial matcher paired the address with the building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
  /// The footprint contains the address point. Confidence is always 1.0.
  Contains,
  /// Closest centroid within the search radius.
  Nearby,
  /// Largest candidate by area, regardless of distance. Confidence 0.5.
  Largest,
}

/// A persisted address↔building association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
  pub link_id:     Uuid,
  pub campaign_id: Uuid,
  pub address_id:  Uuid,
  pub building_id: Uuid,
  pub method:      MatchMethod,
  /// Match quality in [0, 1]; 1.0 for `contains`.
  pub confidence:  f64,
  pub is_primary:  bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::CampaignStore::upsert_link`].
/// `link_id` and `created_at` are always set by the store.
#[derive(Debug, Clone)]
pub struct NewLink {
  pub campaign_id: Uuid,
  pub address_id:  Uuid,
  pub building_id: Uuid,
  pub method:      MatchMethod,
  pub confidence:  f64,
  pub is_primary:  bool,
}
