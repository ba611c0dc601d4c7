//! Default configuration values.

/// Property used for radius scaling and classification.
pub const RADIUS_PROPERTY: &str = "mag";

/// Inclusive clamp applied to continuous radii, in pixels.
pub const RADIUS_BOUNDS: (f64, f64) = (1.0, 40.0);

/// Radius used when a feature's value is missing or unusable.
pub const DEFAULT_RADIUS: f64 = 1.0;

/// Default stroke color for primitives.
pub const STROKE_COLOR: &str = "#ff7800";

/// Default fill color for primitives.
pub const FILL_COLOR: &str = "#ff7800";

/// Default popup template.
pub const POPUP_TEMPLATE: &str = "<b>{place}</b><br>magnitude {mag}";

/// Default per-request timeout for feed fetches, in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
