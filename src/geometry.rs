//! Geometry decoding for warehouse spatial cells.
//!
//! Spatial columns arrive as GeoJSON text (`{"type": ..., "coordinates": ...}`)
//! with positions in `[longitude, latitude]` order. Decoding parses the text
//! once into a typed [`Geometry`]; [`Position::to_lat_lon`] is the only place
//! the axis order is swapped for the map.

use crate::canvas::LatLon;
use crate::error::{AtlasError, Result};
use crate::warehouse::Value;

/// A GeoJSON position, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
}

impl Position {
    /// Map-ready coordinate (latitude first).
    pub fn to_lat_lon(self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// A decoded spatial value.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    /// Linear rings; the first is the outer boundary.
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    /// The GeoJSON type name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::MultiPoint(_) => "MultiPoint",
            Self::Polygon(_) => "Polygon",
        }
    }
}

/// Decodes a geometry cell.
pub fn decode(cell: &Value) -> Result<Geometry> {
    let text = cell.as_str().ok_or_else(|| {
        AtlasError::malformed_geometry(format!("expected GeoJSON text, found {cell:?}"))
    })?;

    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| AtlasError::malformed_geometry(format!("invalid JSON: {e}")))?;

    let object = parsed
        .as_object()
        .ok_or_else(|| AtlasError::malformed_geometry("geometry is not a JSON object"))?;

    let kind = object
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| AtlasError::malformed_geometry("missing \"type\""))?;

    let coordinates = object
        .get("coordinates")
        .ok_or_else(|| AtlasError::malformed_geometry("missing \"coordinates\""))?;

    match kind {
        "Point" => position(coordinates).map(Geometry::Point),
        "MultiPoint" => positions(coordinates).map(Geometry::MultiPoint),
        "Polygon" => {
            let rings = non_empty_array(coordinates)?
                .iter()
                .map(positions)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::Polygon(rings))
        }
        other => Err(AtlasError::malformed_geometry(format!(
            "unsupported geometry type \"{other}\""
        ))),
    }
}

/// Decodes a Point cell into a map coordinate.
pub fn decode_point(cell: &Value) -> Result<LatLon> {
    match decode(cell)? {
        Geometry::Point(p) => Ok(p.to_lat_lon()),
        other => Err(AtlasError::malformed_geometry(format!(
            "expected Point, found {}",
            other.kind()
        ))),
    }
}

/// Decodes a Polygon cell into its outer ring as map coordinates.
///
/// The ring is returned exactly as encoded (a closed ring keeps its repeated
/// first vertex); holes are dropped.
pub fn decode_polygon(cell: &Value) -> Result<Vec<LatLon>> {
    match decode(cell)? {
        Geometry::Polygon(rings) => Ok(rings
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(Position::to_lat_lon)
            .collect()),
        other => Err(AtlasError::malformed_geometry(format!(
            "expected Polygon, found {}",
            other.kind()
        ))),
    }
}

fn non_empty_array(value: &serde_json::Value) -> Result<&Vec<serde_json::Value>> {
    match value.as_array() {
        Some(items) if !items.is_empty() => Ok(items),
        Some(_) => Err(AtlasError::malformed_geometry("empty \"coordinates\"")),
        None => Err(AtlasError::malformed_geometry(
            "\"coordinates\" is not an array",
        )),
    }
}

fn positions(value: &serde_json::Value) -> Result<Vec<Position>> {
    non_empty_array(value)?.iter().map(position).collect()
}

fn position(value: &serde_json::Value) -> Result<Position> {
    let pair = non_empty_array(value)?;
    let (Some(lon), Some(lat)) = (
        pair.first().and_then(serde_json::Value::as_f64),
        pair.get(1).and_then(serde_json::Value::as_f64),
    ) else {
        return Err(AtlasError::malformed_geometry(format!(
            "position {value} is not a [longitude, latitude] pair"
        )));
    };

    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(AtlasError::malformed_geometry(format!(
            "position [{lon}, {lat}] is out of range"
        )));
    }

    Ok(Position { lon, lat })
}
