//! Resolution layer: turns a tapped map feature into a fully joined record.
//!
//! The [`ResolutionChain`] tries ordered lookup strategies against a
//! [`CampaignStore`](doorstep_core::store::CampaignStore) until one succeeds;
//! the [`ResolutionCache`] wraps it with a short-TTL read-through cache. The
//! [`linker`] module runs the spatial matcher over a whole campaign and
//! persists the resulting links.

pub mod cache;
pub mod chain;
pub mod error;
pub mod feature;
pub mod linker;

pub use cache::{CachedResolver, DEFAULT_CACHE_TTL, ResolutionCache};
pub use chain::ResolutionChain;
pub use error::{Error, Result};
pub use feature::{parse_feature, parse_feature_collection};
pub use linker::{LinkSummary, link_campaign};
