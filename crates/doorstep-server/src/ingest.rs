//! Campaign ingestion: GeoJSON in, rows + links out.
//!
//! Malformed features never abort a batch — they are skipped, warned about,
//! and counted in the response.

use geo_types::Polygon;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use doorstep_core::{
  address::{Address, SourceTier},
  building::{Building, BuildingTier},
  store::CampaignStore,
};
use doorstep_geo::{DEFAULT_SEARCH_RADIUS_M, polygon_area_m2};
use doorstep_resolve::link_campaign;

use crate::error::ApiError;

/// Request body for `POST /api/campaigns/{id}/ingest`.
#[derive(Deserialize)]
pub struct IngestBody {
  pub addresses: geojson::FeatureCollection,
  pub buildings: geojson::FeatureCollection,
}

/// Response body: linking outcome plus how many features were dropped.
#[derive(Debug, serde::Serialize, PartialEq, Eq)]
pub struct IngestReport {
  pub linked:   usize,
  pub fallback: usize,
  pub skipped:  usize,
}

struct Skip(&'static str);

fn prop_str<'a>(feature: &'a geojson::Feature, name: &str) -> Option<&'a str> {
  feature
    .properties
    .as_ref()
    .and_then(|props| props.get(name))
    .and_then(Value::as_str)
}

fn prop_f64(feature: &geojson::Feature, name: &str) -> Option<f64> {
  feature
    .properties
    .as_ref()
    .and_then(|props| props.get(name))
    .and_then(Value::as_f64)
}

fn prop_uuid(feature: &geojson::Feature, name: &str) -> Result<Uuid, Skip> {
  prop_str(feature, name)
    .ok_or(Skip("missing id"))
    .and_then(|s| Uuid::parse_str(s).map_err(|_| Skip("invalid id")))
}

fn address_from_feature(
  campaign_id: Uuid,
  feature: &geojson::Feature,
) -> Result<Address, Skip> {
  let address_id = prop_uuid(feature, "id")?;

  let (lon, lat) = match feature.geometry.as_ref().map(|g| &g.value) {
    Some(geojson::Value::Point(coords)) if coords.len() >= 2 => {
      (coords[0], coords[1])
    },
    _ => return Err(Skip("address feature needs a Point geometry")),
  };

  let source_tier = match prop_str(feature, "tier") {
    None | Some("primary") => SourceTier::PrimarySource,
    Some("secondary") => SourceTier::SecondarySource,
    Some("fallback") => SourceTier::Fallback,
    Some(_) => return Err(Skip("unknown address tier")),
  };

  Ok(Address {
    address_id,
    campaign_id,
    lon,
    lat,
    formatted: prop_str(feature, "address_text").unwrap_or_default().to_string(),
    house_number: prop_str(feature, "house_number").map(str::to_string),
    street_name: prop_str(feature, "street_name").map(str::to_string),
    source_tier,
    building_id: None,
    external_id: prop_str(feature, "external_id").map(str::to_string),
  })
}

fn building_from_feature(
  campaign_id: Uuid,
  feature: &geojson::Feature,
) -> Result<Building, Skip> {
  let building_id = prop_uuid(feature, "id")?;

  let footprint: Polygon<f64> = feature
    .geometry
    .as_ref()
    .filter(|g| matches!(g.value, geojson::Value::Polygon(_)))
    .and_then(|g| Polygon::try_from(g.value.clone()).ok())
    .ok_or(Skip("building feature needs a Polygon geometry"))?;

  let tier = match prop_str(feature, "tier") {
    None | Some("primary") => BuildingTier::Primary,
    Some("secondary") => BuildingTier::Secondary,
    Some("none") => BuildingTier::None,
    Some(_) => return Err(Skip("unknown building tier")),
  };

  Ok(Building {
    building_id,
    campaign_id,
    area_sq_m: polygon_area_m2(&footprint),
    footprint: Some(footprint),
    height_m: prop_f64(feature, "height_m"),
    external_id: prop_str(feature, "external_id").map(str::to_string),
    tier,
  })
}

/// Insert a batch of address and building features, then run the linking
/// pass over the whole campaign.
pub async fn ingest_campaign<S>(
  store: &S,
  campaign_id: Uuid,
  body: &IngestBody,
) -> Result<IngestReport, ApiError>
where
  S: CampaignStore,
{
  let mut skipped = 0;

  for feature in &body.buildings.features {
    match building_from_feature(campaign_id, feature) {
      Ok(building) => {
        store
          .insert_building(building)
          .await
          .map_err(ApiError::store)?;
      },
      Err(Skip(reason)) => {
        tracing::warn!(%campaign_id, reason, "skipping building feature");
        skipped += 1;
      },
    }
  }

  for feature in &body.addresses.features {
    match address_from_feature(campaign_id, feature) {
      Ok(address) => {
        store
          .insert_address(address)
          .await
          .map_err(ApiError::store)?;
      },
      Err(Skip(reason)) => {
        tracing::warn!(%campaign_id, reason, "skipping address feature");
        skipped += 1;
      },
    }
  }

  let summary = link_campaign(store, campaign_id, DEFAULT_SEARCH_RADIUS_M)
    .await
    .map_err(ApiError::from)?;

  Ok(IngestReport {
    linked:   summary.linked,
    fallback: summary.fallback,
    skipped,
  })
}
