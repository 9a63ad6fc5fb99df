//! Error types for `doorstep-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("address not found: {0}")]
  AddressNotFound(Uuid),

  #[error("building not found: {0}")]
  BuildingNotFound(Uuid),

  #[error("unknown tier: {0:?}")]
  UnknownTier(String),

  #[error("unknown match method: {0:?}")]
  UnknownMethod(String),

  #[error("unknown visit status: {0:?}")]
  UnknownStatus(String),

  #[error("confidence {0} outside [0, 1]")]
  ConfidenceOutOfRange(f64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
