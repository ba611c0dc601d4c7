//! Attribute-driven styling.
//!
//! [`resolve`] is a pure mapping from a feature's properties to visual
//! parameters. It never fails for a feature that passed parsing: every
//! missing or invalid property case degrades to a configured default.
//!
//! Two interchangeable radius strategies exist:
//! - continuous: radius scaled directly from a numeric property,
//!   clamped to configured bounds;
//! - classified: an ordered threshold table evaluated highest-first
//!   with strict `>`, so a value exactly at a bound falls to the next
//!   lower bucket.

use crate::feature::Feature;

/// Resolved visual parameters for one feature.
///
/// Colors are opaque strings (named, hex, or rgb) passed through to the
/// rendering primitives unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSpec {
    /// Symbol radius in pixels; always positive. Only meaningful for
    /// point-like geometries.
    pub radius: f64,
    pub stroke_color: String,
    pub fill_color: String,
    /// Discrete classification label, present only in classified mode.
    pub class_bucket: Option<String>,
}

/// One classification threshold: values strictly above `lower_bound`
/// (and not captured by a higher threshold) land in this bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    /// Exclusive lower bound for this bucket.
    pub lower_bound: f64,
    /// Bucket label, e.g. "large".
    pub label: String,
    /// Radius assigned to features in this bucket.
    pub radius: f64,
}

impl Threshold {
    pub fn new(lower_bound: f64, label: impl Into<String>, radius: f64) -> Self {
        Self {
            lower_bound,
            label: label.into(),
            radius,
        }
    }
}

/// The bucket for values at or below the lowest threshold bound, and
/// for features whose classified property is missing or non-numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackBucket {
    pub label: String,
    pub radius: f64,
}

impl FallbackBucket {
    pub fn new(label: impl Into<String>, radius: f64) -> Self {
        Self {
            label: label.into(),
            radius,
        }
    }
}

/// How the symbol radius is derived from feature properties.
#[derive(Debug, Clone, PartialEq)]
pub enum RadiusRule {
    /// Proportional symbol styling: radius equals the numeric property,
    /// clamped to `bounds`. Missing, non-numeric, or non-positive
    /// values fall back to `default`.
    Continuous {
        property: String,
        /// Inclusive (min, max) clamp applied to valid raw values.
        bounds: (f64, f64),
        /// Radius used when the raw value is unusable; must be positive.
        default: f64,
    },
    /// Classified styling: thresholds ordered by descending bound,
    /// evaluated with strict `>`.
    Classified {
        property: String,
        thresholds: Vec<Threshold>,
        fallback: FallbackBucket,
    },
}

/// How stroke/fill colors are assigned.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorRule {
    /// One constant color for every feature.
    Constant(String),
    /// Color read from a string property, with a fallback when the
    /// property is absent or not a string.
    Property { key: String, fallback: String },
}

impl ColorRule {
    fn resolve(&self, feature: &Feature) -> String {
        match self {
            ColorRule::Constant(color) => color.clone(),
            ColorRule::Property { key, fallback } => match feature.property(key) {
                Some(crate::feature::PropValue::Str(color)) => color.clone(),
                _ => fallback.clone(),
            },
        }
    }
}

/// Complete styling configuration for one layer pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleConfig {
    pub radius: RadiusRule,
    pub stroke: ColorRule,
    pub fill: ColorRule,
}

/// Classifies a value against an ordered threshold table.
///
/// Thresholds must be ordered by descending bound; the first threshold
/// the value strictly exceeds wins. A value exactly equal to a bound
/// falls through to the next lower bucket, and values at or below the
/// lowest bound land in the fallback bucket. This mirrors an ordered
/// if/else-if chain and is the single place those tie-break semantics
/// live.
pub fn classify<'a>(
    value: f64,
    thresholds: &'a [Threshold],
    fallback: &'a FallbackBucket,
) -> (&'a str, f64) {
    for threshold in thresholds {
        if value > threshold.lower_bound {
            return (&threshold.label, threshold.radius);
        }
    }
    (&fallback.label, fallback.radius)
}

/// Resolves a feature's visual parameters.
///
/// Pure and total: no I/O, no clock, and no failure path. Degraded
/// inputs (missing or non-numeric properties) produce the configured
/// defaults.
pub fn resolve(feature: &Feature, config: &StyleConfig) -> StyleSpec {
    let (radius, class_bucket) = match &config.radius {
        RadiusRule::Continuous {
            property,
            bounds,
            default,
        } => {
            let radius = match feature.numeric_property(property) {
                Some(value) if value > 0.0 => value.clamp(bounds.0, bounds.1),
                _ => *default,
            };
            (radius, None)
        }
        RadiusRule::Classified {
            property,
            thresholds,
            fallback,
        } => {
            let (label, radius) = match feature.numeric_property(property) {
                Some(value) => classify(value, thresholds, fallback),
                None => (fallback.label.as_str(), fallback.radius),
            };
            (radius, Some(label.to_string()))
        }
    };

    StyleSpec {
        radius,
        stroke_color: config.stroke.resolve(feature),
        fill_color: config.fill.resolve(feature),
        class_bucket,
    }
}
