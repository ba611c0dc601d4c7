//! Layer factory: feature + resolved style → renderable layer.
//!
//! Geometry dispatch is an exhaustive match over the tagged
//! [`Geometry`] enum; adding a kind means adding a variant and a match
//! arm, not another conditional chain. The factory constructs
//! primitives and binds popup content but never attaches anything to a
//! map surface; composition is the collection renderer's job.

use crate::feature::{Feature, Geometry, GeometryKind, LonLat};
use crate::style::StyleSpec;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building one layer.
///
/// These are feature-local: the collection renderer records them as
/// diagnostics and continues.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayerError {
    /// The render map has no primitive configured for this kind.
    #[error("no primitive configured for geometry kind {0}, skipping feature")]
    UnsupportedKind(GeometryKind),

    /// The render map pairs a kind with a primitive that cannot draw it
    /// (e.g. a marker for a polygon).
    #[error("primitive {primitive} cannot render geometry kind {kind}")]
    IncompatiblePrimitive {
        kind: GeometryKind,
        primitive: PrimitiveKind,
    },
}

/// The visual primitive families a feature can render as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// Icon marker at each point.
    Marker,
    /// Styled circle of the resolved radius at each point.
    Circle,
    /// Stroked (and, for polygons, filled) path.
    Path,
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveKind::Marker => f.write_str("Marker"),
            PrimitiveKind::Circle => f.write_str("Circle"),
            PrimitiveKind::Path => f.write_str("Path"),
        }
    }
}

/// Maps geometry kinds to the primitive used to draw them.
///
/// A kind absent from the map is skipped with a warning rather than
/// rendered; this is how a deployment can opt out of, say, polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRenderMap {
    entries: BTreeMap<GeometryKind, PrimitiveKind>,
}

impl GeometryRenderMap {
    /// Creates an empty map; every kind will be skipped.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Sets the primitive for one geometry kind.
    pub fn with(mut self, kind: GeometryKind, primitive: PrimitiveKind) -> Self {
        self.entries.insert(kind, primitive);
        self
    }

    /// Returns the configured primitive for a kind, if any.
    pub fn primitive_for(&self, kind: GeometryKind) -> Option<PrimitiveKind> {
        self.entries.get(&kind).copied()
    }

    /// Returns the (kind, primitive) pairs in stable order.
    pub fn entries(&self) -> impl Iterator<Item = (GeometryKind, PrimitiveKind)> + '_ {
        self.entries.iter().map(|(k, p)| (*k, *p))
    }
}

impl Default for GeometryRenderMap {
    /// Points render as styled circles, everything else as paths.
    fn default() -> Self {
        Self::empty()
            .with(GeometryKind::Point, PrimitiveKind::Circle)
            .with(GeometryKind::MultiPoint, PrimitiveKind::Circle)
            .with(GeometryKind::LineString, PrimitiveKind::Path)
            .with(GeometryKind::MultiLineString, PrimitiveKind::Path)
            .with(GeometryKind::Polygon, PrimitiveKind::Path)
            .with(GeometryKind::MultiPolygon, PrimitiveKind::Path)
    }
}

/// A concrete visual primitive, ready for a map surface to draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Icon markers at the given anchors.
    Marker { positions: Vec<LonLat> },
    /// Styled circles of a fixed pixel radius.
    Circle {
        centers: Vec<LonLat>,
        radius: f64,
        stroke_color: String,
        fill_color: String,
    },
    /// One or more polylines; closed paths are filled.
    Path {
        lines: Vec<Vec<LonLat>>,
        stroke_color: String,
        /// Fill color for closed paths; open paths carry no fill.
        fill_color: Option<String>,
        closed: bool,
    },
}

/// Renders popup text for a feature.
///
/// Implementations must be infallible: a missing property renders as
/// an empty substitution, never an error.
pub trait PopupTemplate: Send + Sync {
    fn render(&self, feature: &Feature) -> String;
}

/// Template segment: literal text or a `{key}` placeholder.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A popup template that substitutes `{key}` placeholders with feature
/// properties.
///
/// The template is split into segments once at parse time so rendering
/// is a single pass. An unterminated `{` is kept as literal text.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyTemplate {
    segments: Vec<Segment>,
}

impl PropertyTemplate {
    /// Parses a template string, e.g. `"<b>{place}</b> magnitude {mag}"`.
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            match rest[open..].find('}') {
                Some(close) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let key = &rest[open + 1..open + close];
                    segments.push(Segment::Placeholder(key.to_string()));
                    rest = &rest[open + close + 1..];
                }
                None => {
                    // Unterminated placeholder: treat the remainder as literal.
                    literal.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }
}

impl PopupTemplate for PropertyTemplate {
    fn render(&self, feature: &Feature) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => out.push_str(&feature.property_display(key)),
            }
        }
        out
    }
}

/// One renderable layer: a visual primitive plus its bound popup text.
///
/// Style and popup are fixed at construction and never mutated; a
/// rendered layer lives exactly as long as its owning [`LayerGroup`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLayer {
    pub primitive: Primitive,
    /// Popup text opened when the primitive is clicked.
    pub popup: String,
}

/// An atomically attachable/detachable set of rendered layers.
///
/// Layer order is draw order. The `generation` id is assigned by the
/// refresh controller and increases monotonically with each attached
/// group, which makes last-request-wins observable in logs and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerGroup {
    pub generation: u64,
    layers: Vec<RenderedLayer>,
}

impl LayerGroup {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            layers: Vec::new(),
        }
    }

    /// Appends a layer; it now draws above all earlier members.
    pub fn push(&mut self, layer: RenderedLayer) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[RenderedLayer] {
        &self.layers
    }
}

/// Builds one renderable layer from a feature and its resolved style.
///
/// Dispatches on the geometry kind through the render map, constructs
/// the primitive, and binds the popup text. Does not attach anything to
/// a map surface.
///
/// # Errors
///
/// Returns a feature-local [`LayerError`] when the render map skips or
/// mismatches the feature's geometry kind.
pub fn build_layer(
    feature: &Feature,
    style: &StyleSpec,
    render_map: &GeometryRenderMap,
    popup: &dyn PopupTemplate,
) -> Result<RenderedLayer, LayerError> {
    let kind = feature.geometry.kind();
    let primitive_kind = render_map
        .primitive_for(kind)
        .ok_or(LayerError::UnsupportedKind(kind))?;

    let primitive = match (&feature.geometry, primitive_kind) {
        (Geometry::Point(_) | Geometry::MultiPoint(_), PrimitiveKind::Marker) => {
            Primitive::Marker {
                positions: feature.geometry.positions(),
            }
        }
        (Geometry::Point(_) | Geometry::MultiPoint(_), PrimitiveKind::Circle) => {
            Primitive::Circle {
                centers: feature.geometry.positions(),
                radius: style.radius,
                stroke_color: style.stroke_color.clone(),
                fill_color: style.fill_color.clone(),
            }
        }
        (Geometry::LineString(line), PrimitiveKind::Path) => Primitive::Path {
            lines: vec![line.clone()],
            stroke_color: style.stroke_color.clone(),
            fill_color: None,
            closed: false,
        },
        (Geometry::MultiLineString(lines), PrimitiveKind::Path) => Primitive::Path {
            lines: lines.clone(),
            stroke_color: style.stroke_color.clone(),
            fill_color: None,
            closed: false,
        },
        (Geometry::Polygon(rings), PrimitiveKind::Path) => Primitive::Path {
            lines: rings.clone(),
            stroke_color: style.stroke_color.clone(),
            fill_color: Some(style.fill_color.clone()),
            closed: true,
        },
        (Geometry::MultiPolygon(polygons), PrimitiveKind::Path) => Primitive::Path {
            lines: polygons.iter().flatten().cloned().collect(),
            stroke_color: style.stroke_color.clone(),
            fill_color: Some(style.fill_color.clone()),
            closed: true,
        },
        _ => {
            return Err(LayerError::IncompatiblePrimitive {
                kind,
                primitive: primitive_kind,
            })
        }
    };

    Ok(RenderedLayer {
        primitive,
        popup: popup.render(feature),
    })
}

/// Shared handle to a popup template, cloneable across the pipeline.
pub type SharedPopupTemplate = Arc<dyn PopupTemplate>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{parse_feature, PropValue};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn test_style() -> StyleSpec {
        StyleSpec {
            radius: 5.0,
            stroke_color: "#ff7800".to_string(),
            fill_color: "#ffb366".to_string(),
            class_bucket: None,
        }
    }

    fn point_feature(props: serde_json::Value) -> Feature {
        parse_feature(&json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [-122.4, 37.8] },
            "properties": props
        }))
        .unwrap()
    }

    fn polygon_feature() -> Feature {
        parse_feature(&json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
            },
            "properties": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_point_renders_as_circle_by_default() {
        let feature = point_feature(json!({}));
        let layer = build_layer(
            &feature,
            &test_style(),
            &GeometryRenderMap::default(),
            &PropertyTemplate::parse(""),
        )
        .unwrap();

        match layer.primitive {
            Primitive::Circle {
                centers,
                radius,
                stroke_color,
                ..
            } => {
                assert_eq!(centers.len(), 1);
                assert_eq!(radius, 5.0);
                assert_eq!(stroke_color, "#ff7800");
            }
            other => panic!("expected circle, got {:?}", other),
        }
    }

    #[test]
    fn test_point_renders_as_marker_when_mapped() {
        let map = GeometryRenderMap::default().with(GeometryKind::Point, PrimitiveKind::Marker);
        let layer = build_layer(
            &point_feature(json!({})),
            &test_style(),
            &map,
            &PropertyTemplate::parse(""),
        )
        .unwrap();
        assert!(matches!(layer.primitive, Primitive::Marker { .. }));
    }

    #[test]
    fn test_polygon_renders_as_closed_filled_path() {
        let layer = build_layer(
            &polygon_feature(),
            &test_style(),
            &GeometryRenderMap::default(),
            &PropertyTemplate::parse(""),
        )
        .unwrap();

        match layer.primitive {
            Primitive::Path {
                closed, fill_color, ..
            } => {
                assert!(closed);
                assert_eq!(fill_color.as_deref(), Some("#ffb366"));
            }
            other => panic!("expected path, got {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_kind_is_skipped() {
        let map = GeometryRenderMap::empty().with(GeometryKind::Point, PrimitiveKind::Circle);
        let err = build_layer(
            &polygon_feature(),
            &test_style(),
            &map,
            &PropertyTemplate::parse(""),
        )
        .unwrap_err();
        assert_eq!(err, LayerError::UnsupportedKind(GeometryKind::Polygon));
    }

    #[test]
    fn test_incompatible_primitive_rejected() {
        let map = GeometryRenderMap::default().with(GeometryKind::Polygon, PrimitiveKind::Marker);
        let err = build_layer(
            &polygon_feature(),
            &test_style(),
            &map,
            &PropertyTemplate::parse(""),
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::IncompatiblePrimitive { .. }));
    }

    #[test]
    fn test_popup_substitution() {
        let template = PropertyTemplate::parse("<b>{place}</b><br>magnitude {mag}");
        let feature = point_feature(json!({"place": "Off the coast", "mag": 4.5}));
        assert_eq!(
            template.render(&feature),
            "<b>Off the coast</b><br>magnitude 4.5"
        );
    }

    #[test]
    fn test_popup_missing_key_renders_empty() {
        let template = PropertyTemplate::parse("more: {url}");
        let feature = point_feature(json!({"place": "somewhere"}));
        assert_eq!(template.render(&feature), "more: ");
    }

    #[test]
    fn test_popup_unterminated_placeholder_is_literal() {
        let template = PropertyTemplate::parse("broken {place");
        let feature = point_feature(json!({"place": "x"}));
        assert_eq!(template.render(&feature), "broken {place");
    }

    #[test]
    fn test_popup_bound_at_construction() {
        let template = PropertyTemplate::parse("{place}");
        let mut feature = point_feature(json!({"place": "before"}));
        let layer = build_layer(
            &feature,
            &test_style(),
            &GeometryRenderMap::default(),
            &template,
        )
        .unwrap();

        // Mutating the feature afterwards does not change the bound popup.
        feature.properties = BTreeMap::from([(
            "place".to_string(),
            PropValue::Str("after".to_string()),
        )]);
        assert_eq!(layer.popup, "before");
    }

    #[test]
    fn test_layer_group_order_is_draw_order() {
        let mut group = LayerGroup::new(1);
        for place in ["a", "b", "c"] {
            let feature = point_feature(json!({ "place": place }));
            group.push(
                build_layer(
                    &feature,
                    &test_style(),
                    &GeometryRenderMap::default(),
                    &PropertyTemplate::parse("{place}"),
                )
                .unwrap(),
            );
        }

        let popups: Vec<&str> = group.layers().iter().map(|l| l.popup.as_str()).collect();
        assert_eq!(popups, vec!["a", "b", "c"]);
    }
}
