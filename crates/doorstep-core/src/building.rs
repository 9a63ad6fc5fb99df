//! Building — one record per matched footprint.

use geo_types::Polygon;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which ingestion path produced this building's footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingTier {
  Primary,
  Secondary,
  /// No polygon ever existed; the entity degrades to its address point.
  None,
}

/// A building footprint inside a campaign.
///
/// `footprint` may be absent, in which case the entity is represented by the
/// point of its linked address and can never win a `contains` match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
  pub building_id: Uuid,
  pub campaign_id: Uuid,
  pub footprint:   Option<Polygon<f64>>,
  pub height_m:    Option<f64>,
  /// Geodesic footprint area in square metres; 0.0 when no polygon exists.
  pub area_sq_m:   f64,
  /// External parcel identifier from the footprint provider.
  pub external_id: Option<String>,
  pub tier:        BuildingTier,
}
