//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Footprints are stored as
//! GeoJSON geometry strings. UUIDs are stored as hyphenated lowercase
//! strings; enum discriminants as their serde snake_case tags.

use chrono::{DateTime, Utc};
use geo_types::Polygon;
use uuid::Uuid;

use doorstep_core::{
  address::{Address, SourceTier},
  building::{Building, BuildingTier},
  link::{Link, MatchMethod},
  stats::{BuildingStats, VisitStatus},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SourceTier ──────────────────────────────────────────────────────────────

pub fn encode_source_tier(t: SourceTier) -> &'static str {
  match t {
    SourceTier::PrimarySource => "primary_source",
    SourceTier::SecondarySource => "secondary_source",
    SourceTier::Fallback => "fallback",
  }
}

pub fn decode_source_tier(s: &str) -> Result<SourceTier> {
  match s {
    "primary_source" => Ok(SourceTier::PrimarySource),
    "secondary_source" => Ok(SourceTier::SecondarySource),
    "fallback" => Ok(SourceTier::Fallback),
    other => Err(Error::Core(doorstep_core::Error::UnknownTier(
      other.to_string(),
    ))),
  }
}

// ─── BuildingTier ────────────────────────────────────────────────────────────

pub fn encode_building_tier(t: BuildingTier) -> &'static str {
  match t {
    BuildingTier::Primary => "primary",
    BuildingTier::Secondary => "secondary",
    BuildingTier::None => "none",
  }
}

pub fn decode_building_tier(s: &str) -> Result<BuildingTier> {
  match s {
    "primary" => Ok(BuildingTier::Primary),
    "secondary" => Ok(BuildingTier::Secondary),
    "none" => Ok(BuildingTier::None),
    other => Err(Error::Core(doorstep_core::Error::UnknownTier(
      other.to_string(),
    ))),
  }
}

// ─── MatchMethod ─────────────────────────────────────────────────────────────

pub fn encode_method(m: MatchMethod) -> &'static str {
  match m {
    MatchMethod::Contains => "contains",
    MatchMethod::Nearby => "nearby",
    MatchMethod::Largest => "largest",
  }
}

pub fn decode_method(s: &str) -> Result<MatchMethod> {
  match s {
    "contains" => Ok(MatchMethod::Contains),
    "nearby" => Ok(MatchMethod::Nearby),
    "largest" => Ok(MatchMethod::Largest),
    other => Err(Error::Core(doorstep_core::Error::UnknownMethod(
      other.to_string(),
    ))),
  }
}

// ─── VisitStatus ─────────────────────────────────────────────────────────────

pub fn encode_status(s: VisitStatus) -> &'static str {
  match s {
    VisitStatus::NotVisited => "not_visited",
    VisitStatus::Visited => "visited",
    VisitStatus::Hot => "hot",
    VisitStatus::Delivered => "delivered",
    VisitStatus::NoAnswer => "no_answer",
    VisitStatus::DoNotKnock => "do_not_knock",
    VisitStatus::FutureSeller => "future_seller",
  }
}

pub fn decode_status(s: &str) -> Result<VisitStatus> {
  match s {
    "not_visited" => Ok(VisitStatus::NotVisited),
    "visited" => Ok(VisitStatus::Visited),
    "hot" => Ok(VisitStatus::Hot),
    "delivered" => Ok(VisitStatus::Delivered),
    "no_answer" => Ok(VisitStatus::NoAnswer),
    "do_not_knock" => Ok(VisitStatus::DoNotKnock),
    "future_seller" => Ok(VisitStatus::FutureSeller),
    other => Err(Error::Core(doorstep_core::Error::UnknownStatus(
      other.to_string(),
    ))),
  }
}

// ─── Footprint ───────────────────────────────────────────────────────────────

pub fn encode_footprint(p: &Polygon<f64>) -> Result<String> {
  let geometry = geojson::Geometry::new(geojson::Value::from(p));
  Ok(serde_json::to_string(&geometry)?)
}

pub fn decode_footprint(s: &str) -> Result<Polygon<f64>> {
  let geometry: geojson::Geometry = serde_json::from_str(s)?;
  Ok(Polygon::<f64>::try_from(geometry)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `addresses` row.
pub struct RawAddress {
  pub address_id:   String,
  pub campaign_id:  String,
  pub lon:          f64,
  pub lat:          f64,
  pub formatted:    String,
  pub house_number: Option<String>,
  pub street_name:  Option<String>,
  pub source_tier:  String,
  pub building_id:  Option<String>,
  pub external_id:  Option<String>,
}

impl RawAddress {
  pub fn into_address(self) -> Result<Address> {
    Ok(Address {
      address_id:   decode_uuid(&self.address_id)?,
      campaign_id:  decode_uuid(&self.campaign_id)?,
      lon:          self.lon,
      lat:          self.lat,
      formatted:    self.formatted,
      house_number: self.house_number,
      street_name:  self.street_name,
      source_tier:  decode_source_tier(&self.source_tier)?,
      building_id:  self.building_id.as_deref().map(decode_uuid).transpose()?,
      external_id:  self.external_id,
    })
  }
}

/// Raw strings read directly from a `buildings` row.
pub struct RawBuilding {
  pub building_id: String,
  pub campaign_id: String,
  pub footprint:   Option<String>,
  pub height_m:    Option<f64>,
  pub area_sq_m:   f64,
  pub external_id: Option<String>,
  pub tier:        String,
}

impl RawBuilding {
  pub fn into_building(self) -> Result<Building> {
    Ok(Building {
      building_id: decode_uuid(&self.building_id)?,
      campaign_id: decode_uuid(&self.campaign_id)?,
      footprint:   self
        .footprint
        .as_deref()
        .map(decode_footprint)
        .transpose()?,
      height_m:    self.height_m,
      area_sq_m:   self.area_sq_m,
      external_id: self.external_id,
      tier:        decode_building_tier(&self.tier)?,
    })
  }
}

/// Raw strings read directly from a `links` row.
pub struct RawLink {
  pub link_id:     String,
  pub campaign_id: String,
  pub address_id:  String,
  pub building_id: String,
  pub method:      String,
  pub confidence:  f64,
  pub is_primary:  bool,
  pub created_at:  String,
}

impl RawLink {
  pub fn into_link(self) -> Result<Link> {
    Ok(Link {
      link_id:     decode_uuid(&self.link_id)?,
      campaign_id: decode_uuid(&self.campaign_id)?,
      address_id:  decode_uuid(&self.address_id)?,
      building_id: decode_uuid(&self.building_id)?,
      method:      decode_method(&self.method)?,
      confidence:  self.confidence,
      is_primary:  self.is_primary,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `building_stats` row.
pub struct RawStats {
  pub entity_id:    String,
  pub campaign_id:  String,
  pub scans_total:  i64,
  pub scans_today:  i64,
  pub last_scan_at: Option<String>,
  pub status:       String,
}

impl RawStats {
  pub fn into_stats(self) -> Result<BuildingStats> {
    Ok(BuildingStats {
      entity_id:    decode_uuid(&self.entity_id)?,
      campaign_id:  decode_uuid(&self.campaign_id)?,
      scans_total:  self.scans_total.max(0) as u64,
      scans_today:  self.scans_today.max(0) as u64,
      last_scan_at: self.last_scan_at.as_deref().map(decode_dt).transpose()?,
      status:       decode_status(&self.status)?,
    })
  }
}
