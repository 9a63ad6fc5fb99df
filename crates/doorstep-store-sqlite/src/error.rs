//! Error type for `doorstep-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] doorstep_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("geometry error: {0}")]
  Geometry(#[from] geojson::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("address not found: {0}")]
  AddressNotFound(uuid::Uuid),

  #[error("building not found: {0}")]
  BuildingNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
