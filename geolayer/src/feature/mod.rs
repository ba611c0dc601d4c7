//! GeoJSON feature model.
//!
//! Parses an untyped feature-collection payload into typed [`Feature`]
//! records with a partial-success policy: a malformed record is skipped
//! and its index and reason recorded, while parsing of the rest of the
//! collection continues. A bad feed entry never aborts the whole feed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while parsing a single feature record.
///
/// All of these are feature-local: the parser records them per index
/// and keeps going.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    /// Geometry is missing, has an inconsistent coordinate nesting for
    /// its kind, or violates a coordinate-range invariant.
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    /// `properties` is present but is not a key/value mapping.
    #[error("malformed properties: {0}")]
    MalformedProperties(String),

    /// Geometry `type` names a kind this pipeline does not render
    /// (e.g. `GeometryCollection`).
    #[error("unsupported geometry kind: {0}")]
    UnsupportedGeometryKind(String),

    /// The payload as a whole is not a feature collection.
    #[error("not a feature collection: {0}")]
    MalformedCollection(String),
}

/// A (longitude, latitude) position in decimal degrees.
///
/// Serializable so hosts can persist view state across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    /// Creates a position, validating the coordinate-range invariant:
    /// longitude in [-180, 180], latitude in [-90, 90].
    pub fn new(lon: f64, lat: f64) -> Result<Self, FeatureError> {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(FeatureError::MalformedGeometry(format!(
                "longitude {} outside [-180, 180]",
                lon
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(FeatureError::MalformedGeometry(format!(
                "latitude {} outside [-90, 90]",
                lat
            )));
        }
        Ok(Self { lon, lat })
    }
}

/// The geometry kinds this pipeline renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    /// Returns the GeoJSON `type` string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }

    /// Returns true for kinds rendered as point primitives.
    pub fn is_point_like(&self) -> bool {
        matches!(self, GeometryKind::Point | GeometryKind::MultiPoint)
    }

    /// All renderable kinds, in a stable order.
    pub fn all() -> [GeometryKind; 6] {
        [
            GeometryKind::Point,
            GeometryKind::MultiPoint,
            GeometryKind::LineString,
            GeometryKind::MultiLineString,
            GeometryKind::Polygon,
            GeometryKind::MultiPolygon,
        ]
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feature's geometry as a tagged variant.
///
/// Downstream dispatch (the layer factory) matches exhaustively on this
/// enum; new kinds are added here and in the match arms, not via
/// scattered conditional chains.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(LonLat),
    MultiPoint(Vec<LonLat>),
    LineString(Vec<LonLat>),
    MultiLineString(Vec<Vec<LonLat>>),
    Polygon(Vec<Vec<LonLat>>),
    MultiPolygon(Vec<Vec<Vec<LonLat>>>),
}

impl Geometry {
    /// Returns the kind tag for this geometry.
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Returns every point-like position in this geometry.
    ///
    /// For point kinds these are the marker anchors; for paths and
    /// polygons they are the constituent vertices.
    pub fn positions(&self) -> Vec<LonLat> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => ps.clone(),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polys) => {
                polys.iter().flatten().flatten().copied().collect()
            }
        }
    }
}

/// A non-spatial attribute value.
///
/// GeoJSON allows arbitrary JSON here; this model is scalar-only, so
/// nested arrays/objects degrade to [`PropValue::Null`] rather than
/// failing the record.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl PropValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => PropValue::Str(s.clone()),
            Value::Number(n) => n.as_f64().map(PropValue::Num).unwrap_or(PropValue::Null),
            Value::Bool(b) => PropValue::Bool(*b),
            _ => PropValue::Null,
        }
    }

    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Renders this value for popup interpolation.
    ///
    /// Null renders as the empty string; whole numbers render without a
    /// trailing `.0` so popup text reads naturally.
    pub fn display(&self) -> String {
        match self {
            PropValue::Str(s) => s.clone(),
            PropValue::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            PropValue::Bool(b) => b.to_string(),
            PropValue::Null => String::new(),
        }
    }
}

/// One geographic record: a geometry plus named non-spatial attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: BTreeMap<String, PropValue>,
}

impl Feature {
    /// Looks up a property by key.
    pub fn property(&self, key: &str) -> Option<&PropValue> {
        self.properties.get(key)
    }

    /// Looks up a numeric property, treating absent and non-numeric
    /// values alike.
    pub fn numeric_property(&self, key: &str) -> Option<f64> {
        self.property(key).and_then(PropValue::as_f64)
    }

    /// Renders a property for popup interpolation; absent keys render
    /// as the empty string.
    pub fn property_display(&self, key: &str) -> String {
        self.property(key).map(PropValue::display).unwrap_or_default()
    }
}

/// An ordered set of features, the unit of a data feed.
///
/// Ordering defines draw order: later features draw on top. Empty
/// collections are valid and render nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Returns the number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the collection has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A record the parser skipped, with its index and reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFeature {
    /// Index of the record in the source `features` array.
    pub index: usize,
    /// Why the record was skipped.
    pub reason: FeatureError,
}

/// Result of parsing a feature-collection payload.
///
/// Tracks parsed features and skipped records separately so the
/// partial-success invariant is checkable:
/// `parsed_count() + skipped_count() == source record count`.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Successfully parsed features, in source order.
    pub collection: FeatureCollection,
    /// Records skipped with their index and reason.
    pub skipped: Vec<SkippedFeature>,
}

impl ParseOutcome {
    /// Returns the number of successfully parsed features.
    pub fn parsed_count(&self) -> usize {
        self.collection.len()
    }

    /// Returns the number of skipped records.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Returns the total number of records in the source payload.
    pub fn total_count(&self) -> usize {
        self.parsed_count() + self.skipped_count()
    }
}

/// Parses raw feed bytes into a feature collection.
///
/// # Errors
///
/// Returns [`FeatureError::MalformedCollection`] if the bytes are not
/// JSON or the JSON is not a feature collection. Per-record failures do
/// not error; they are recorded in [`ParseOutcome::skipped`].
pub fn parse_slice(bytes: &[u8]) -> Result<ParseOutcome, FeatureError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| FeatureError::MalformedCollection(format!("invalid JSON: {}", e)))?;
    parse_collection(&value)
}

/// Parses a deserialized feature-collection document.
///
/// The document must be an object carrying a `features` array; each
/// entry is parsed independently under the partial-success policy.
pub fn parse_collection(value: &Value) -> Result<ParseOutcome, FeatureError> {
    let obj = value.as_object().ok_or_else(|| {
        FeatureError::MalformedCollection("payload is not a JSON object".to_string())
    })?;

    if let Some(kind) = obj.get("type").and_then(Value::as_str) {
        if kind != "FeatureCollection" {
            return Err(FeatureError::MalformedCollection(format!(
                "expected type FeatureCollection, found {}",
                kind
            )));
        }
    }

    let features = obj
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            FeatureError::MalformedCollection("missing features array".to_string())
        })?;

    let mut outcome = ParseOutcome::default();
    for (index, raw) in features.iter().enumerate() {
        match parse_feature(raw) {
            Ok(feature) => outcome.collection.features.push(feature),
            Err(reason) => outcome.skipped.push(SkippedFeature { index, reason }),
        }
    }
    Ok(outcome)
}

/// Parses one feature record.
pub fn parse_feature(value: &Value) -> Result<Feature, FeatureError> {
    let obj = value.as_object().ok_or_else(|| {
        FeatureError::MalformedGeometry("feature is not a JSON object".to_string())
    })?;

    let geometry_value = obj
        .get("geometry")
        .and_then(Value::as_object)
        .ok_or_else(|| FeatureError::MalformedGeometry("missing geometry object".to_string()))?;

    let kind = geometry_value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FeatureError::MalformedGeometry("missing geometry type".to_string()))?;

    let coordinates = geometry_value
        .get("coordinates")
        .ok_or_else(|| FeatureError::MalformedGeometry("missing coordinates".to_string()))?;

    let geometry = parse_geometry(kind, coordinates)?;
    let properties = parse_properties(obj.get("properties"))?;

    Ok(Feature {
        geometry,
        properties,
    })
}

fn parse_geometry(kind: &str, coordinates: &Value) -> Result<Geometry, FeatureError> {
    match kind {
        "Point" => Ok(Geometry::Point(parse_position(coordinates)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_line(coordinates)?)),
        "LineString" => {
            let line = parse_line(coordinates)?;
            if line.len() < 2 {
                return Err(FeatureError::MalformedGeometry(
                    "LineString needs at least two positions".to_string(),
                ));
            }
            Ok(Geometry::LineString(line))
        }
        "MultiLineString" => {
            let lines = parse_nested(coordinates, parse_line)?;
            for line in &lines {
                if line.len() < 2 {
                    return Err(FeatureError::MalformedGeometry(
                        "MultiLineString member needs at least two positions".to_string(),
                    ));
                }
            }
            Ok(Geometry::MultiLineString(lines))
        }
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(coordinates)?)),
        "MultiPolygon" => Ok(Geometry::MultiPolygon(parse_nested(
            coordinates,
            parse_polygon,
        )?)),
        other => Err(FeatureError::UnsupportedGeometryKind(other.to_string())),
    }
}

fn parse_position(value: &Value) -> Result<LonLat, FeatureError> {
    let parts = value.as_array().ok_or_else(|| {
        FeatureError::MalformedGeometry("position is not an array".to_string())
    })?;
    if parts.len() < 2 {
        return Err(FeatureError::MalformedGeometry(
            "position needs longitude and latitude".to_string(),
        ));
    }
    let lon = parts[0].as_f64().ok_or_else(|| {
        FeatureError::MalformedGeometry("longitude is not a number".to_string())
    })?;
    let lat = parts[1].as_f64().ok_or_else(|| {
        FeatureError::MalformedGeometry("latitude is not a number".to_string())
    })?;
    LonLat::new(lon, lat)
}

fn parse_line(value: &Value) -> Result<Vec<LonLat>, FeatureError> {
    value
        .as_array()
        .ok_or_else(|| {
            FeatureError::MalformedGeometry("coordinate sequence is not an array".to_string())
        })?
        .iter()
        .map(parse_position)
        .collect()
}

fn parse_nested<T>(
    value: &Value,
    parse_member: impl Fn(&Value) -> Result<T, FeatureError>,
) -> Result<Vec<T>, FeatureError> {
    value
        .as_array()
        .ok_or_else(|| {
            FeatureError::MalformedGeometry("coordinate nesting is not an array".to_string())
        })?
        .iter()
        .map(parse_member)
        .collect()
}

fn parse_polygon(value: &Value) -> Result<Vec<Vec<LonLat>>, FeatureError> {
    let rings = parse_nested(value, parse_line)?;
    for ring in &rings {
        if ring.len() < 4 {
            return Err(FeatureError::MalformedGeometry(
                "polygon ring needs at least four positions".to_string(),
            ));
        }
        if ring.first() != ring.last() {
            return Err(FeatureError::MalformedGeometry(
                "polygon ring is not closed".to_string(),
            ));
        }
    }
    Ok(rings)
}

fn parse_properties(
    value: Option<&Value>,
) -> Result<BTreeMap<String, PropValue>, FeatureError> {
    match value {
        // Absent or null properties are valid: no required keys.
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), PropValue::from_json(v)))
            .collect()),
        Some(other) => Err(FeatureError::MalformedProperties(format!(
            "properties is not a key/value mapping (found {})",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
