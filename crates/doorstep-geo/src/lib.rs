//! Spatial matching between address points and building footprints.
//!
//! All distances are great-circle (haversine) in metres and all areas are
//! geodesic in square metres — planar approximations drift by metres at
//! higher latitudes, enough to flip a tie-break.

pub mod matcher;
pub mod measure;

pub use matcher::{DEFAULT_SEARCH_RADIUS_M, SpatialMatch, match_building};
pub use measure::{haversine_m, polygon_area_m2};
