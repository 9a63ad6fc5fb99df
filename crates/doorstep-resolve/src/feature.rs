//! Parsing tapped GeoJSON features into [`FeatureRef`]s.
//!
//! The ingestion job writes identifying properties onto every rendered
//! feature (`id`, `tier`, and whatever address fields it knew). Individual
//! malformed features are skipped with a warning; they never abort a batch.

use geo::Centroid;
use geo_types::{Point, Polygon};
use serde_json::{Map, Value};
use uuid::Uuid;

use doorstep_core::{
  link::MatchMethod,
  record::{FeatureRef, FeatureTier},
  stats::VisitStatus,
};

use crate::{Error, Result};

fn str_prop<'a>(props: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
  props.get(name).and_then(Value::as_str)
}

fn uuid_prop(
  props: &Map<String, Value>,
  name: &'static str,
) -> Result<Option<Uuid>> {
  match str_prop(props, name) {
    None => Ok(None),
    Some(s) => Uuid::parse_str(s)
      .map(Some)
      .map_err(|_| Error::InvalidProperty(name)),
  }
}

fn enum_prop<T: serde::de::DeserializeOwned>(
  props: &Map<String, Value>,
  name: &'static str,
) -> Result<Option<T>> {
  match props.get(name) {
    None | Some(Value::Null) => Ok(None),
    Some(v) => serde_json::from_value(v.clone())
      .map(Some)
      .map_err(|_| Error::InvalidProperty(name)),
  }
}

/// Representative point of a feature's geometry: the point itself, or the
/// footprint centroid (first exterior vertex if the centroid is degenerate).
fn representative_point(geometry: &geojson::Geometry) -> Result<Point<f64>> {
  match &geometry.value {
    geojson::Value::Point(coords) if coords.len() >= 2 => {
      Ok(Point::new(coords[0], coords[1]))
    },
    geojson::Value::Polygon(_) => {
      let polygon = Polygon::<f64>::try_from(geometry.value.clone())
        .map_err(|_| Error::MissingGeometry)?;
      polygon
        .centroid()
        .or_else(|| {
          polygon
            .exterior()
            .points()
            .next()
        })
        .ok_or(Error::MissingGeometry)
    },
    _ => Err(Error::MissingGeometry),
  }
}

/// Parse one tapped feature into a [`FeatureRef`].
pub fn parse_feature(feature: &geojson::Feature) -> Result<FeatureRef> {
  let props = feature
    .properties
    .as_ref()
    .ok_or(Error::MissingProperty("id"))?;

  let feature_id = str_prop(props, "id")
    .ok_or(Error::MissingProperty("id"))?
    .to_string();
  let tier: FeatureTier =
    enum_prop(props, "tier")?.ok_or(Error::MissingProperty("tier"))?;

  let geometry = feature.geometry.as_ref().ok_or(Error::MissingGeometry)?;
  let point = representative_point(geometry)?;

  Ok(FeatureRef {
    feature_id,
    tier,
    lon: point.x(),
    lat: point.y(),
    address_id: uuid_prop(props, "address_id")?,
    address_text: str_prop(props, "address_text").map(str::to_string),
    house_number: str_prop(props, "house_number").map(str::to_string),
    street_name: str_prop(props, "street_name").map(str::to_string),
    external_id: str_prop(props, "external_id").map(str::to_string),
    status: enum_prop::<VisitStatus>(props, "status")?.unwrap_or_default(),
    scans_total: props
      .get("scans_total")
      .and_then(Value::as_u64)
      .unwrap_or(0),
    confidence: props.get("confidence").and_then(Value::as_f64),
    match_method: enum_prop::<MatchMethod>(props, "match_method")?,
  })
}

/// Parse a whole collection, skipping malformed features.
pub fn parse_feature_collection(
  collection: &geojson::FeatureCollection,
) -> Vec<FeatureRef> {
  collection
    .features
    .iter()
    .filter_map(|feature| match parse_feature(feature) {
      Ok(parsed) => Some(parsed),
      Err(err) => {
        tracing::warn!(%err, "skipping malformed feature");
        None
      },
    })
    .collect()
}
