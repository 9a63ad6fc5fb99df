//! Geodesic measurement helpers shared by the matcher and the ingestion
//! path (which stores `area_sq_m` on every building).

use geo::{Centroid, GeodesicArea, HaversineDistance};
use geo_types::{Point, Polygon};

/// Great-circle distance between two points, in metres.
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
  a.haversine_distance(&b)
}

/// Unsigned geodesic area of a footprint, in square metres.
pub fn polygon_area_m2(polygon: &Polygon<f64>) -> f64 {
  polygon.geodesic_area_unsigned()
}

/// Distance from `point` to the footprint's centroid, in metres.
/// `None` for degenerate polygons with no centroid.
pub fn centroid_distance_m(point: Point<f64>, polygon: &Polygon<f64>) -> Option<f64> {
  polygon.centroid().map(|c| haversine_m(point, c))
}

/// Distance from `point` to the nearest exterior-ring vertex, in metres.
///
/// Footprint rings are densely sampled, so the nearest vertex is a good
/// stand-in for the nearest edge point without planar projection.
pub fn nearest_vertex_m(point: Point<f64>, polygon: &Polygon<f64>) -> Option<f64> {
  polygon
    .exterior()
    .points()
    .map(|v| haversine_m(point, v))
    .min_by(|a, b| a.total_cmp(b))
}
