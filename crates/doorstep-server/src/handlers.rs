//! axum handlers for the campaign API.

use axum::{
  Json,
  extract::{Path, State},
  response::sse::{Event, Sse},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::Stream;
use uuid::Uuid;

use doorstep_core::{
  record::Resolution,
  stats::{BuildingStats, StatsUpdate, VisitStatus},
  store::CampaignStore,
};
use doorstep_resolve::parse_feature;

use crate::{
  AppState,
  error::ApiError,
  events,
  ingest::{IngestBody, IngestReport, ingest_campaign},
  view,
};

pub async fn health() -> Json<Value> {
  Json(json!({ "status": "ok" }))
}

/// `GET /api/campaigns/{id}/buildings`
pub async fn campaign_buildings<S>(
  State(state): State<AppState<S>>,
  Path(campaign_id): Path<Uuid>,
) -> Result<Json<geojson::FeatureCollection>, ApiError>
where
  S: CampaignStore + Clone + 'static,
{
  view::campaign_collection(state.resolver.store(), campaign_id)
    .await?
    .map(Json)
    .ok_or_else(|| {
      ApiError::NotFound(format!("campaign {campaign_id} has no data"))
    })
}

/// `POST /api/campaigns/{id}/ingest`
pub async fn ingest<S>(
  State(state): State<AppState<S>>,
  Path(campaign_id): Path<Uuid>,
  Json(body): Json<IngestBody>,
) -> Result<Json<IngestReport>, ApiError>
where
  S: CampaignStore + Clone + 'static,
{
  let report =
    ingest_campaign(state.resolver.store(), campaign_id, &body).await?;
  Ok(Json(report))
}

/// `POST /api/campaigns/{id}/resolve` — resolve a tapped feature through
/// the cache.
pub async fn resolve_feature<S>(
  State(state): State<AppState<S>>,
  Path(campaign_id): Path<Uuid>,
  Json(feature): Json<geojson::Feature>,
) -> Result<Json<Resolution>, ApiError>
where
  S: CampaignStore + Clone + 'static,
{
  let feature_ref = parse_feature(&feature)
    .map_err(|err| ApiError::BadRequest(err.to_string()))?;
  let resolution = state.resolver.resolve(campaign_id, &feature_ref).await?;
  Ok(Json(resolution))
}

/// `GET /api/campaigns/{id}/stats` — the polling fetch used by degraded
/// synchronizers.
pub async fn campaign_stats<S>(
  State(state): State<AppState<S>>,
  Path(campaign_id): Path<Uuid>,
) -> Result<Json<Vec<BuildingStats>>, ApiError>
where
  S: CampaignStore + Clone + 'static,
{
  let stats = state
    .resolver
    .store()
    .stats_for_campaign(campaign_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct ScanBody {
  pub entity_id: Uuid,
}

/// `POST /api/campaigns/{id}/scans`
pub async fn record_scan<S>(
  State(state): State<AppState<S>>,
  Path(campaign_id): Path<Uuid>,
  Json(body): Json<ScanBody>,
) -> Result<Json<BuildingStats>, ApiError>
where
  S: CampaignStore + Clone + 'static,
{
  let stats = state
    .resolver
    .store()
    .record_scan(campaign_id, body.entity_id)
    .await
    .map_err(ApiError::store)?;
  after_stats_write(&state, campaign_id, body.entity_id, &stats).await;
  Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct VisitBody {
  pub entity_id: Uuid,
  pub status:    VisitStatus,
}

/// `POST /api/campaigns/{id}/visits`
pub async fn record_visit<S>(
  State(state): State<AppState<S>>,
  Path(campaign_id): Path<Uuid>,
  Json(body): Json<VisitBody>,
) -> Result<Json<BuildingStats>, ApiError>
where
  S: CampaignStore + Clone + 'static,
{
  let stats = state
    .resolver
    .store()
    .set_visit_status(campaign_id, body.entity_id, body.status)
    .await
    .map_err(ApiError::store)?;
  after_stats_write(&state, campaign_id, body.entity_id, &stats).await;
  Ok(Json(stats))
}

/// `GET /api/campaigns/{id}/events`
pub async fn campaign_events<S>(
  State(state): State<AppState<S>>,
  Path(campaign_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>
where
  S: CampaignStore + Clone + 'static,
{
  events::status_stream(&state, campaign_id)
}

/// Every stats write must drop both possible cache keys for the affected
/// record — a lookup may have been keyed by building id or address id — and
/// publish the update to push subscribers.
///
/// The stats write has already committed by the time this runs, so lookup
/// failures here never fail the request; a surviving stale entry ages out
/// through the cache TTL.
async fn after_stats_write<S>(
  state: &AppState<S>,
  campaign_id: Uuid,
  entity_id: Uuid,
  stats: &BuildingStats,
) where
  S: CampaignStore + Clone + 'static,
{
  let store = state.resolver.store();
  let cache = state.resolver.cache();

  cache.invalidate(campaign_id, entity_id);
  // Treat the entity as a building: fan out to its linked addresses. For a
  // point-only entity these queries simply find nothing.
  if let Err(err) = cache
    .invalidate_for_building(store, campaign_id, entity_id)
    .await
  {
    tracing::warn!(%entity_id, %err, "cache fan-out invalidation failed");
  }
  // Treat it as an address: drop the building-keyed entry too.
  match store.get_address(entity_id).await {
    Ok(Some(address)) => {
      if let Some(building_id) = address.building_id {
        cache.invalidate(campaign_id, building_id);
      }
    },
    Ok(None) => {},
    Err(err) => {
      tracing::warn!(%entity_id, %err, "address lookup after write failed");
    },
  }

  state.feed.publish(campaign_id, StatsUpdate {
    building_id: entity_id,
    status:      stats.status,
    scans_total: stats.scans_total,
    qr_scanned:  stats.qr_scanned(),
  });
}
