//! The tie-break spatial matcher.
//!
//! Strict priority order: `contains` beats `nearby` even when the nearby
//! footprint is larger, and `nearby` beats `largest` even when the nearest
//! footprint is tiny. A candidate is any footprint that contains the point,
//! or whose centroid or nearest exterior vertex lies within the search
//! radius. If one pass finds no candidate at all, the whole procedure is
//! retried once with the radius doubled; only then does the matcher give up
//! and the caller persists the address as a point-only `fallback` record.

use geo::Contains;
use geo_types::Point;
use uuid::Uuid;

use doorstep_core::{building::Building, link::MatchMethod};

use crate::measure::{centroid_distance_m, nearest_vertex_m, polygon_area_m2};

/// Default candidate search radius in metres.
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 15.0;

/// A successful match: the chosen building, how it was chosen, and a
/// quality score in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialMatch {
  pub building_id: Uuid,
  pub method:      MatchMethod,
  pub confidence:  f64,
}

/// Match an address point against candidate footprints.
///
/// Buildings without a footprint are never candidates — they have no
/// geometry to contain or approach. Returns `None` only when both the
/// initial pass and the doubled-radius retry find an empty candidate set.
pub fn match_building(
  point:      Point<f64>,
  candidates: &[Building],
  radius_m:   f64,
) -> Option<SpatialMatch> {
  attempt(point, candidates, radius_m).or_else(|| {
    tracing::debug!(radius_m, "no candidates in radius, retrying doubled");
    attempt(point, candidates, radius_m * 2.0)
  })
}

fn attempt(
  point:      Point<f64>,
  candidates: &[Building],
  radius_m:   f64,
) -> Option<SpatialMatch> {
  // (building, area) for footprints containing the point.
  let mut containing: Vec<(&Building, f64)> = Vec::new();
  // (building, centroid distance) for centroids within radius.
  let mut nearby: Vec<(&Building, f64)> = Vec::new();
  // (building, area) within vertex reach but with a distant centroid.
  let mut in_reach: Vec<(&Building, f64)> = Vec::new();

  for building in candidates {
    let Some(footprint) = &building.footprint else {
      continue;
    };

    if footprint.contains(&point) {
      containing.push((building, polygon_area_m2(footprint)));
      continue;
    }

    let centroid_d = centroid_distance_m(point, footprint);
    let vertex_d   = nearest_vertex_m(point, footprint);

    match (centroid_d, vertex_d) {
      (Some(d), _) if d <= radius_m => nearby.push((building, d)),
      (_, Some(d)) if d <= radius_m => {
        in_reach.push((building, polygon_area_m2(footprint)));
      }
      _ => {}
    }
  }

  // 1. Contains: largest area wins a multi-containment tie; equal areas
  //    keep the first candidate (stable input order).
  if let Some((building, _)) = largest_first(&containing) {
    return Some(SpatialMatch {
      building_id: building.building_id,
      method:      MatchMethod::Contains,
      confidence:  1.0,
    });
  }

  // 2. Nearby: closest centroid, confidence falling off linearly with
  //    distance.
  if let Some((building, d)) = nearby
    .into_iter()
    .min_by(|(_, a), (_, b)| a.total_cmp(b))
  {
    return Some(SpatialMatch {
      building_id: building.building_id,
      method:      MatchMethod::Nearby,
      confidence:  (1.0 - d / radius_m).clamp(0.0, 1.0),
    });
  }

  // 3. Largest: a footprint is in reach but its centroid is not; distance
  //    no longer ranks, area does.
  if let Some((building, _)) = largest_first(&in_reach) {
    return Some(SpatialMatch {
      building_id: building.building_id,
      method:      MatchMethod::Largest,
      confidence:  0.5,
    });
  }

  None
}

/// The entry with the largest area; the first of any equal-area tie.
/// An explicit fold rather than `max_by`, which would keep the last.
fn largest_first<'a>(
  entries: &[(&'a Building, f64)],
) -> Option<(&'a Building, f64)> {
  entries.iter().copied().fold(None, |best, candidate| {
    match best {
      Some((_, best_area)) if candidate.1 > best_area => Some(candidate),
      Some(best) => Some(best),
      None => Some(candidate),
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use doorstep_core::building::BuildingTier;
  use geo_types::{LineString, Polygon};

  const LAT: f64 = 43.65;
  const LON: f64 = -79.38;

  /// Degrees of longitude/latitude per metre at the test latitude.
  fn metres_to_deg(east_m: f64, north_m: f64) -> (f64, f64) {
    let dlat = north_m / 111_320.0;
    let dlon = east_m / (111_320.0 * LAT.to_radians().cos());
    (dlon, dlat)
  }

  /// Axis-aligned square footprint: centre offset from the test point in
  /// metres, with the given side length.
  fn square(east_m: f64, north_m: f64, side_m: f64) -> Polygon<f64> {
    let (cx, cy) = metres_to_deg(east_m, north_m);
    let (hx, hy) = metres_to_deg(side_m / 2.0, side_m / 2.0);
    let (cx, cy) = (LON + cx, LAT + cy);
    Polygon::new(
      LineString::from(vec![
        (cx - hx, cy - hy),
        (cx + hx, cy - hy),
        (cx + hx, cy + hy),
        (cx - hx, cy + hy),
        (cx - hx, cy - hy),
      ]),
      vec![],
    )
  }

  fn building(footprint: Option<Polygon<f64>>) -> Building {
    let area = footprint.as_ref().map(polygon_area_m2).unwrap_or(0.0);
    Building {
      building_id: Uuid::new_v4(),
      campaign_id: Uuid::new_v4(),
      footprint,
      height_m:    None,
      area_sq_m:   area,
      external_id: None,
      tier:        BuildingTier::Primary,
    }
  }

  fn point() -> Point<f64> { Point::new(LON, LAT) }

  #[test]
  fn contains_beats_larger_nearby() {
    // A small footprint containing the point, a larger one 10 m away.
    let containing = building(Some(square(0.0, 0.0, 9.0)));
    let nearby     = building(Some(square(10.0, 0.0, 14.0)));
    let id         = containing.building_id;

    let m = match_building(
      point(),
      &[nearby, containing],
      DEFAULT_SEARCH_RADIUS_M,
    )
    .unwrap();

    assert_eq!(m.building_id, id);
    assert_eq!(m.method, MatchMethod::Contains);
    assert_eq!(m.confidence, 1.0);
  }

  #[test]
  fn contains_tie_breaks_to_largest() {
    let small = building(Some(square(0.0, 0.0, 8.0)));
    let large = building(Some(square(1.0, 0.0, 20.0)));
    let id    = large.building_id;

    let m = match_building(point(), &[small, large], DEFAULT_SEARCH_RADIUS_M)
      .unwrap();

    assert_eq!(m.building_id, id);
    assert_eq!(m.method, MatchMethod::Contains);
  }

  #[test]
  fn nearby_picks_closest_centroid() {
    // No containment; centroids at 12 m and 40 m.
    let close = building(Some(square(12.0, 0.0, 4.0)));
    let far   = building(Some(square(40.0, 0.0, 4.0)));
    let id    = close.building_id;

    let m = match_building(point(), &[far, close], DEFAULT_SEARCH_RADIUS_M)
      .unwrap();

    assert_eq!(m.building_id, id);
    assert_eq!(m.method, MatchMethod::Nearby);
    // 1 − 12/15 ≈ 0.2; geometry construction is approximate.
    assert!((m.confidence - 0.2).abs() < 0.05, "confidence {}", m.confidence);
  }

  #[test]
  fn nearby_beats_larger_in_reach() {
    // A tiny footprint with a close centroid must beat a huge footprint
    // whose corner is in reach but whose centroid is not.
    let tiny = building(Some(square(10.0, 0.0, 3.0)));
    let huge = {
      // Corner 5 m east of the point, centroid ~40 m away.
      let (ox, oy) = metres_to_deg(5.0, 0.0);
      let (sx, sy) = metres_to_deg(50.0, 50.0);
      Building {
        footprint: Some(Polygon::new(
          LineString::from(vec![
            (LON + ox, LAT + oy),
            (LON + ox + sx, LAT + oy),
            (LON + ox + sx, LAT + oy + sy),
            (LON + ox, LAT + oy + sy),
            (LON + ox, LAT + oy),
          ]),
          vec![],
        )),
        ..building(None)
      }
    };
    let id = tiny.building_id;

    let m = match_building(point(), &[huge, tiny], DEFAULT_SEARCH_RADIUS_M)
      .unwrap();

    assert_eq!(m.building_id, id);
    assert_eq!(m.method, MatchMethod::Nearby);
  }

  #[test]
  fn largest_when_no_centroid_in_radius() {
    // Corner 5 m away, centroid far beyond the radius.
    let (ox, oy) = metres_to_deg(5.0, 0.0);
    let (sx, sy) = metres_to_deg(60.0, 60.0);
    let reachable = Building {
      footprint: Some(Polygon::new(
        LineString::from(vec![
          (LON + ox, LAT + oy),
          (LON + ox + sx, LAT + oy),
          (LON + ox + sx, LAT + oy + sy),
          (LON + ox, LAT + oy + sy),
          (LON + ox, LAT + oy),
        ]),
        vec![],
      )),
      ..building(None)
    };
    let id = reachable.building_id;

    let m =
      match_building(point(), &[reachable], DEFAULT_SEARCH_RADIUS_M).unwrap();

    assert_eq!(m.building_id, id);
    assert_eq!(m.method, MatchMethod::Largest);
    assert_eq!(m.confidence, 0.5);
  }

  #[test]
  fn retry_doubles_radius_before_giving_up() {
    // Centroid at 25 m: outside 15 m, inside the 30 m retry.
    let b  = building(Some(square(25.0, 0.0, 4.0)));
    let id = b.building_id;

    let m = match_building(point(), &[b], DEFAULT_SEARCH_RADIUS_M).unwrap();

    assert_eq!(m.building_id, id);
    assert_eq!(m.method, MatchMethod::Nearby);
  }

  #[test]
  fn none_when_out_of_reach_after_retry() {
    let b = building(Some(square(100.0, 0.0, 6.0)));
    assert!(match_building(point(), &[b], DEFAULT_SEARCH_RADIUS_M).is_none());
  }

  #[test]
  fn empty_candidate_set_returns_none() {
    assert!(match_building(point(), &[], DEFAULT_SEARCH_RADIUS_M).is_none());
    // Footprint-less buildings are not candidates either.
    let b = building(None);
    assert!(match_building(point(), &[b], DEFAULT_SEARCH_RADIUS_M).is_none());
  }

  #[test]
  fn confidence_always_in_unit_interval() {
    for east in [1.0, 5.0, 10.0, 14.9, 20.0, 29.0] {
      let b = building(Some(square(east, 0.0, 4.0)));
      if let Some(m) = match_building(point(), &[b], DEFAULT_SEARCH_RADIUS_M) {
        assert!((0.0..=1.0).contains(&m.confidence), "east={east}");
      }
    }
  }

  #[test]
  fn equal_area_tie_keeps_first() {
    // Two byte-identical footprints both containing the point: the fold
    // keeps the earlier candidate, never the later one.
    let a = building(Some(square(0.0, 0.0, 10.0)));
    let b = building(Some(square(0.0, 0.0, 10.0)));
    let first = a.building_id;

    let m = match_building(point(), &[a, b], DEFAULT_SEARCH_RADIUS_M).unwrap();
    assert_eq!(m.method, MatchMethod::Contains);
    assert_eq!(m.building_id, first);
  }
}
