//! Pipeline configuration.
//!
//! These are pure data types plus startup validation. A configuration
//! error is the only fatal error class in the system: everything
//! feature-local or refresh-local degrades at runtime instead.

use crate::feature::GeometryKind;
use crate::layer::{GeometryRenderMap, PrimitiveKind, PropertyTemplate, SharedPopupTemplate};
use crate::style::{ColorRule, FallbackBucket, RadiusRule, StyleConfig, Threshold};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod defaults;

/// Errors raised by startup configuration validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Classified mode configured with no thresholds.
    #[error("classified styling requires at least one threshold")]
    EmptyThresholds,

    /// Threshold table not ordered by descending bound.
    #[error("thresholds must be ordered by descending bound: {lower} follows {upper}")]
    UnsortedThresholds { upper: f64, lower: f64 },

    /// A configured radius is zero or negative.
    #[error("radius for {context} must be positive, got {radius}")]
    NonPositiveRadius { context: String, radius: f64 },

    /// Continuous clamp bounds are inverted or non-positive.
    #[error("radius bounds ({min}, {max}) are invalid")]
    InvalidRadiusBounds { min: f64, max: f64 },

    /// The render map pairs a geometry kind with a primitive that
    /// cannot draw it.
    #[error("render map pairs {kind} with {primitive}")]
    IncompatibleRenderMap {
        kind: GeometryKind,
        primitive: PrimitiveKind,
    },

    /// Feed URL is empty.
    #[error("feed URL must not be empty")]
    EmptyFeedUrl,

    /// Refresh interval is zero.
    #[error("refresh interval must be greater than zero")]
    ZeroRefreshInterval,
}

/// Rendering configuration: styling rules, geometry dispatch, and the
/// popup template.
#[derive(Clone)]
pub struct LayerConfig {
    pub style: StyleConfig,
    pub render_map: GeometryRenderMap,
    pub popup: SharedPopupTemplate,
}

impl LayerConfig {
    /// Builds a configuration with the library defaults: continuous
    /// radius from the default property, constant colors, point
    /// circles, and a place/magnitude popup.
    pub fn with_defaults() -> Self {
        Self {
            style: StyleConfig {
                radius: RadiusRule::Continuous {
                    property: defaults::RADIUS_PROPERTY.to_string(),
                    bounds: defaults::RADIUS_BOUNDS,
                    default: defaults::DEFAULT_RADIUS,
                },
                stroke: ColorRule::Constant(defaults::STROKE_COLOR.to_string()),
                fill: ColorRule::Constant(defaults::FILL_COLOR.to_string()),
            },
            render_map: GeometryRenderMap::default(),
            popup: Arc::new(PropertyTemplate::parse(defaults::POPUP_TEMPLATE)),
        }
    }

    /// Validates the configuration; any error here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.style.radius {
            RadiusRule::Continuous {
                bounds, default, ..
            } => {
                let (min, max) = *bounds;
                if min <= 0.0 || max < min {
                    return Err(ConfigError::InvalidRadiusBounds { min, max });
                }
                require_positive_radius("continuous default", *default)?;
            }
            RadiusRule::Classified {
                thresholds,
                fallback,
                ..
            } => {
                if thresholds.is_empty() {
                    return Err(ConfigError::EmptyThresholds);
                }
                for pair in thresholds.windows(2) {
                    if pair[1].lower_bound >= pair[0].lower_bound {
                        return Err(ConfigError::UnsortedThresholds {
                            upper: pair[0].lower_bound,
                            lower: pair[1].lower_bound,
                        });
                    }
                }
                for threshold in thresholds {
                    require_positive_radius(&format!("bucket {}", threshold.label), threshold.radius)?;
                }
                require_positive_radius(&format!("bucket {}", fallback.label), fallback.radius)?;
            }
        }

        for (kind, primitive) in self.render_map.entries() {
            let compatible = match primitive {
                PrimitiveKind::Marker | PrimitiveKind::Circle => kind.is_point_like(),
                PrimitiveKind::Path => !kind.is_point_like(),
            };
            if !compatible {
                return Err(ConfigError::IncompatibleRenderMap { kind, primitive });
            }
        }

        Ok(())
    }
}

fn require_positive_radius(context: &str, radius: f64) -> Result<(), ConfigError> {
    if radius > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveRadius {
            context: context.to_string(),
            radius,
        })
    }
}

/// Refresh behavior: where the feed lives and how often to re-fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSettings {
    /// Feed URL, fetched with an unauthenticated HTTP GET.
    pub feed_url: String,
    /// Polling interval; `None` disables polling (on-demand only).
    pub refresh_interval: Option<Duration>,
    /// Per-request timeout for the feed fetch.
    pub request_timeout: Duration,
}

impl RefreshSettings {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            refresh_interval: None,
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        }
    }

    /// Validates the settings; errors are fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_url.trim().is_empty() {
            return Err(ConfigError::EmptyFeedUrl);
        }
        if self.refresh_interval == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        Ok(())
    }
}

/// Builds the canonical classified styling table.
///
/// Bucket labels are `tiny` (fallback), `small`, `medium`, `large`.
pub fn classified_magnitude_style() -> RadiusRule {
    RadiusRule::Classified {
        property: defaults::RADIUS_PROPERTY.to_string(),
        thresholds: vec![
            Threshold::new(4.5, "large", 10.0),
            Threshold::new(2.5, "medium", 5.0),
            Threshold::new(1.0, "small", 2.0),
        ],
        fallback: FallbackBucket::new("tiny", defaults::DEFAULT_RADIUS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(LayerConfig::with_defaults().validate(), Ok(()));
    }

    #[test]
    fn test_canonical_classified_config_is_valid() {
        let mut config = LayerConfig::with_defaults();
        config.style.radius = classified_magnitude_style();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_empty_thresholds_fatal() {
        let mut config = LayerConfig::with_defaults();
        config.style.radius = RadiusRule::Classified {
            property: "mag".to_string(),
            thresholds: vec![],
            fallback: FallbackBucket::new("tiny", 1.0),
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyThresholds));
    }

    #[test]
    fn test_unsorted_thresholds_fatal() {
        let mut config = LayerConfig::with_defaults();
        config.style.radius = RadiusRule::Classified {
            property: "mag".to_string(),
            thresholds: vec![Threshold::new(2.5, "medium", 5.0), Threshold::new(4.5, "large", 10.0)],
            fallback: FallbackBucket::new("tiny", 1.0),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsortedThresholds { .. })
        ));
    }

    #[test]
    fn test_non_positive_radius_fatal() {
        let mut config = LayerConfig::with_defaults();
        config.style.radius = RadiusRule::Continuous {
            property: "mag".to_string(),
            bounds: (1.0, 40.0),
            default: 0.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveRadius { .. })
        ));
    }

    #[test]
    fn test_invalid_bounds_fatal() {
        let mut config = LayerConfig::with_defaults();
        config.style.radius = RadiusRule::Continuous {
            property: "mag".to_string(),
            bounds: (40.0, 1.0),
            default: 1.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRadiusBounds { .. })
        ));
    }

    #[test]
    fn test_incompatible_render_map_fatal() {
        use crate::feature::GeometryKind;
        use crate::layer::{GeometryRenderMap, PrimitiveKind};

        let mut config = LayerConfig::with_defaults();
        config.render_map =
            GeometryRenderMap::default().with(GeometryKind::Polygon, PrimitiveKind::Marker);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleRenderMap { .. })
        ));
    }

    #[test]
    fn test_refresh_settings_validation() {
        assert_eq!(
            RefreshSettings::new("  ").validate(),
            Err(ConfigError::EmptyFeedUrl)
        );

        let mut settings = RefreshSettings::new("https://example.com/feed.geojson");
        assert_eq!(settings.validate(), Ok(()));

        settings.refresh_interval = Some(Duration::ZERO);
        assert_eq!(settings.validate(), Err(ConfigError::ZeroRefreshInterval));
    }
}
