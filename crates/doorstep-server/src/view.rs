//! Campaign GeoJSON assembly for `GET /api/campaigns/{id}/buildings`.
//!
//! Every feature carries the ingested property shape (id, tier, address
//! fields, stats) plus the server-derived `status_color`, so the render
//! engine and the resolution fast path can both work from properties alone.

use std::collections::HashMap;

use serde_json::{Value, json};
use uuid::Uuid;

use doorstep_core::{
  address::{Address, SourceTier},
  building::BuildingTier,
  stats::{BuildingStats, StatusColor, VisitStatus},
  store::CampaignStore,
};

use crate::error::ApiError;

fn props(value: Value) -> geojson::JsonObject {
  match value {
    Value::Object(map) => map,
    _ => geojson::JsonObject::new(),
  }
}

fn color_for(stats: Option<&BuildingStats>) -> StatusColor {
  stats.map(BuildingStats::status_color).unwrap_or(StatusColor::Red)
}

fn status_for(stats: Option<&BuildingStats>) -> VisitStatus {
  stats.map(|s| s.status).unwrap_or_default()
}

fn scans_for(stats: Option<&BuildingStats>) -> u64 {
  stats.map(|s| s.scans_total).unwrap_or(0)
}

/// Build the campaign's FeatureCollection: one polygon feature per building
/// with a footprint, one point feature per unlinked (fallback) address.
///
/// Returns `None` when the campaign has no data at all.
pub async fn campaign_collection<S>(
  store: &S,
  campaign_id: Uuid,
) -> Result<Option<geojson::FeatureCollection>, ApiError>
where
  S: CampaignStore,
{
  let buildings = store
    .list_buildings(campaign_id)
    .await
    .map_err(ApiError::store)?;
  let addresses = store
    .list_addresses(campaign_id)
    .await
    .map_err(ApiError::store)?;

  if buildings.is_empty() && addresses.is_empty() {
    return Ok(None);
  }

  let stats: HashMap<Uuid, BuildingStats> = store
    .stats_for_campaign(campaign_id)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|row| (row.entity_id, row))
    .collect();

  // First linked address per building, for the fast-path properties.
  let mut address_for_building: HashMap<Uuid, &Address> = HashMap::new();
  for address in &addresses {
    if let Some(building_id) = address.building_id {
      address_for_building.entry(building_id).or_insert(address);
    }
  }

  let mut features = Vec::new();

  for building in &buildings {
    let Some(footprint) = building.footprint.as_ref() else {
      continue;
    };
    let entity_stats = stats.get(&building.building_id);
    let address = address_for_building.get(&building.building_id).copied();

    let link = match address {
      Some(address) => store
        .primary_link_for_address(campaign_id, address.address_id)
        .await
        .map_err(ApiError::store)?,
      None => None,
    };

    let tier = match building.tier {
      BuildingTier::Primary => "primary",
      _ => "secondary",
    };

    features.push(geojson::Feature {
      bbox: None,
      geometry: Some(geojson::Geometry::new(geojson::Value::from(footprint))),
      id: None,
      properties: Some(props(json!({
        "id":           building.building_id,
        "tier":         tier,
        "status":       status_for(entity_stats),
        "scans_total":  scans_for(entity_stats),
        "status_color": color_for(entity_stats).as_str(),
        "address_id":   address.map(|a| a.address_id),
        "address_text": address.map(|a| a.formatted.clone()),
        "house_number": address.and_then(|a| a.house_number.clone()),
        "street_name":  address.and_then(|a| a.street_name.clone()),
        "external_id":  building
          .external_id
          .clone()
          .or_else(|| address.and_then(|a| a.external_id.clone())),
        "confidence":   link.as_ref().map(|l| l.confidence),
        "match_method": link.as_ref().map(|l| l.method),
      }))),
      foreign_members: None,
    });
  }

  for address in &addresses {
    // Linked addresses render through their building's footprint.
    if address.building_id.is_some()
      && address.source_tier != SourceTier::Fallback
    {
      continue;
    }
    let entity_stats = stats.get(&address.address_id);

    features.push(geojson::Feature {
      bbox: None,
      geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
        address.lon,
        address.lat,
      ]))),
      id: None,
      properties: Some(props(json!({
        "id":           address.address_id,
        "tier":         "fallback",
        "status":       status_for(entity_stats),
        "scans_total":  scans_for(entity_stats),
        "status_color": color_for(entity_stats).as_str(),
        "address_id":   address.address_id,
        "address_text": address.formatted,
        "house_number": address.house_number,
        "street_name":  address.street_name,
        "external_id":  address.external_id,
      }))),
      foreign_members: None,
    });
  }

  Ok(Some(geojson::FeatureCollection {
    bbox:            None,
    features,
    foreign_members: None,
  }))
}
