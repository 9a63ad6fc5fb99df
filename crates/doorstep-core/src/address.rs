//! Address — one record per physical address within a campaign.
//!
//! Addresses are created once by an ingestion pass and are immutable from the
//! core's perspective, except for `building_id` (set when a link is made
//! primary) and `source_tier` (downgraded to `fallback` when the matcher
//! finds no footprint at all).

use geo_types::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which ingestion path produced this address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
  /// Authoritative source; features of this tier carry embedded address
  /// fields, so resolution can skip the link store entirely.
  PrimarySource,
  /// Joined-table source; resolution goes through the secondary link tier.
  SecondarySource,
  /// No footprint matched even after the radius retry; point-only record.
  Fallback,
}

/// A point address inside a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
  pub address_id:   Uuid,
  pub campaign_id:  Uuid,
  pub lon:          f64,
  pub lat:          f64,
  /// Formatted full-address text, e.g. "12 Maple St, Toronto".
  pub formatted:    String,
  pub house_number: Option<String>,
  pub street_name:  Option<String>,
  pub source_tier:  SourceTier,
  /// Set when a primary link exists for this address.
  pub building_id:  Option<Uuid>,
  /// External parcel identifier from the footprint provider, if any.
  pub external_id:  Option<String>,
}

impl Address {
  pub fn point(&self) -> Point<f64> { Point::new(self.lon, self.lat) }
}
