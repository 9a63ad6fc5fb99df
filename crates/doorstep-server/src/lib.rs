//! HTTP serving layer for Doorstep.
//!
//! Exposes an axum [`Router`] over any [`CampaignStore`]: campaign GeoJSON,
//! tap resolution through the cache, scan/visit writes (which invalidate
//! cache entries and publish to the in-process stats feed), and an SSE
//! stream of status-color updates.

pub mod error;
pub mod events;
pub mod handlers;
pub mod ingest;
pub mod view;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use doorstep_core::store::CampaignStore;
use doorstep_resolve::CachedResolver;
use doorstep_sync::BroadcastFeed;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// `DOORSTEP_`-prefixed environment.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub resolver: Arc<CachedResolver<S>>,
  pub feed:     Arc<BroadcastFeed>,
  pub config:   Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      resolver: Arc::clone(&self.resolver),
      feed:     Arc::clone(&self.feed),
      config:   Arc::clone(&self.config),
    }
  }
}

impl<S> AppState<S>
where
  S: CampaignStore + Clone + 'static,
{
  pub fn new(store: S, config: ServerConfig) -> Self {
    Self {
      resolver: Arc::new(CachedResolver::new(store)),
      feed:     Arc::new(BroadcastFeed::new()),
      config:   Arc::new(config),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the campaign API router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: CampaignStore + Clone + 'static,
{
  Router::new()
    .route("/health", get(handlers::health))
    .route(
      "/api/campaigns/{id}/buildings",
      get(handlers::campaign_buildings::<S>),
    )
    .route("/api/campaigns/{id}/ingest", post(handlers::ingest::<S>))
    .route(
      "/api/campaigns/{id}/resolve",
      post(handlers::resolve_feature::<S>),
    )
    .route("/api/campaigns/{id}/stats", get(handlers::campaign_stats::<S>))
    .route("/api/campaigns/{id}/scans", post(handlers::record_scan::<S>))
    .route("/api/campaigns/{id}/visits", post(handlers::record_visit::<S>))
    .route("/api/campaigns/{id}/events", get(handlers::campaign_events::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────
