//! Error type for `doorstep-resolve`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A backend store call failed. The concrete error type depends on the
  /// store implementation, so it is boxed here.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("feature is missing required property `{0}`")]
  MissingProperty(&'static str),

  #[error("feature property `{0}` has an invalid value")]
  InvalidProperty(&'static str),

  #[error("feature has no geometry")]
  MissingGeometry,
}

impl Error {
  /// Box a store backend error into [`Error::Store`].
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
