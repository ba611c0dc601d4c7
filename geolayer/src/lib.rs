//! GeoLayer - GeoJSON feature rendering pipeline
//!
//! This library turns a live GeoJSON feature-collection feed into styled,
//! popup-bound visual layers and keeps the rendered set fresh against an
//! underlying map surface.
//!
//! # High-Level Flow
//!
//! ```text
//! feed bytes ──► feature::parse_slice ──► render::render_collection ──► MapSession::swap
//!                 (partial success)        (style + layer factory)       (atomic attach)
//! ```
//!
//! The [`refresh`] module orchestrates the whole pipeline: it fetches the
//! feed, rebuilds the layer group off-surface, and swaps it in atomically,
//! coalescing concurrent refresh requests so at most one fetch is in
//! flight per controller.

pub mod config;
pub mod feature;
pub mod feed;
pub mod layer;
pub mod logging;
pub mod refresh;
pub mod render;
pub mod style;
pub mod surface;

pub use config::{ConfigError, LayerConfig, RefreshSettings};
pub use feature::{Feature, FeatureCollection, Geometry, GeometryKind, LonLat};
pub use layer::{LayerGroup, PropertyTemplate, RenderedLayer};
pub use refresh::{RefreshController, RefreshOutcome};
pub use style::StyleSpec;
pub use surface::{MapSession, MapSurface};

/// Version of the GeoLayer library and CLI.
///
/// Synchronized across all workspace members via the workspace manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
