//! Collection renderer: feature collection → layer group.
//!
//! Iterates features in collection order, resolves each feature's
//! style, and builds its layer. Per-feature failures become diagnostics
//! and never abort the render, so
//! `rendered_count() + diagnostic_count() == input feature count`.
//! Rendering is deterministic: identical input and configuration yield
//! an identical group, in the same order.

use crate::config::LayerConfig;
use crate::feature::FeatureCollection;
use crate::layer::{build_layer, LayerError, LayerGroup};
use crate::style;
use tracing::{debug, warn};

/// A feature the renderer skipped, with its index and reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDiagnostic {
    /// Index of the feature in the input collection.
    pub index: usize,
    /// Why the feature was skipped.
    pub error: LayerError,
}

/// Result of rendering one collection.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// The composed group, ready to attach. Not yet on any surface.
    pub group: LayerGroup,
    /// Features excluded from the group, with reasons.
    pub diagnostics: Vec<RenderDiagnostic>,
}

impl RenderOutcome {
    /// Returns the number of layers in the group.
    pub fn rendered_count(&self) -> usize {
        self.group.len()
    }

    /// Returns the number of skipped features.
    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns the number of input features this outcome accounts for.
    pub fn total_count(&self) -> usize {
        self.rendered_count() + self.diagnostic_count()
    }
}

/// Renders a feature collection into a layer group.
///
/// The `generation` id is stamped on the group; the refresh controller
/// passes a monotonically increasing value so attach order is
/// observable.
pub fn render_collection(
    collection: &FeatureCollection,
    config: &LayerConfig,
    generation: u64,
) -> RenderOutcome {
    let mut group = LayerGroup::new(generation);
    let mut diagnostics = Vec::new();

    for (index, feature) in collection.features.iter().enumerate() {
        let spec = style::resolve(feature, &config.style);
        match build_layer(feature, &spec, &config.render_map, config.popup.as_ref()) {
            Ok(layer) => group.push(layer),
            Err(error) => {
                warn!(
                    index = index,
                    kind = %feature.geometry.kind(),
                    error = %error,
                    "skipping feature"
                );
                diagnostics.push(RenderDiagnostic { index, error });
            }
        }
    }

    debug!(
        generation = generation,
        rendered = group.len(),
        skipped = diagnostics.len(),
        "rendered feature collection"
    );

    RenderOutcome { group, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerConfig;
    use crate::feature::{parse_collection, GeometryKind};
    use crate::layer::{GeometryRenderMap, LayerError, Primitive, PrimitiveKind};
    use serde_json::json;

    fn mixed_collection() -> FeatureCollection {
        parse_collection(&json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-122.4, 37.8] },
                    "properties": { "place": "first", "mag": 2.0 }
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[0.0, 0.0], [1.0, 1.0]]
                    },
                    "properties": { "place": "second" }
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                    },
                    "properties": { "place": "third" }
                }
            ]
        }))
        .unwrap()
        .collection
    }

    #[test]
    fn test_render_counts_add_up() {
        let collection = mixed_collection();
        let outcome = render_collection(&collection, &LayerConfig::with_defaults(), 1);

        assert_eq!(outcome.rendered_count(), 3);
        assert_eq!(outcome.diagnostic_count(), 0);
        assert_eq!(outcome.total_count(), collection.len());
    }

    #[test]
    fn test_skipped_kinds_become_diagnostics() {
        let collection = mixed_collection();
        let mut config = LayerConfig::with_defaults();
        // Only points are renderable; lines and polygons are skipped.
        config.render_map =
            GeometryRenderMap::empty().with(GeometryKind::Point, PrimitiveKind::Circle);

        let outcome = render_collection(&collection, &config, 1);
        assert_eq!(outcome.rendered_count(), 1);
        assert_eq!(outcome.diagnostic_count(), 2);
        assert_eq!(outcome.total_count(), collection.len());
        assert_eq!(outcome.diagnostics[0].index, 1);
        assert_eq!(
            outcome.diagnostics[0].error,
            LayerError::UnsupportedKind(GeometryKind::LineString)
        );
    }

    #[test]
    fn test_render_preserves_collection_order() {
        let outcome = render_collection(&mixed_collection(), &LayerConfig::with_defaults(), 1);
        let popups: Vec<&str> = outcome
            .group
            .layers()
            .iter()
            .map(|l| l.popup.as_str())
            .collect();
        assert_eq!(
            popups,
            vec![
                "<b>first</b><br>magnitude 2",
                "<b>second</b><br>magnitude ",
                "<b>third</b><br>magnitude "
            ]
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let collection = mixed_collection();
        let config = LayerConfig::with_defaults();

        let first = render_collection(&collection, &config, 7);
        let second = render_collection(&collection, &config, 7);

        assert_eq!(first.group, second.group);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn test_empty_collection_renders_empty_group() {
        let outcome = render_collection(
            &FeatureCollection::default(),
            &LayerConfig::with_defaults(),
            1,
        );
        assert!(outcome.group.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_style_flows_into_primitive() {
        let collection = mixed_collection();
        let mut config = LayerConfig::with_defaults();
        config.style.radius = crate::config::classified_magnitude_style();

        let outcome = render_collection(&collection, &config, 1);
        match &outcome.group.layers()[0].primitive {
            Primitive::Circle { radius, .. } => {
                // magnitude 2.0 exceeds the 1.0 bound only: "small".
                assert_eq!(*radius, 2.0);
            }
            other => panic!("expected circle, got {:?}", other),
        }
    }
}
