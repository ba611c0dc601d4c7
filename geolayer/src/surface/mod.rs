//! Map surface abstraction and session ownership.
//!
//! The basemap engine (tiles, pan/zoom, projection) is an external
//! collaborator consumed through the [`MapSurface`] trait. A
//! [`MapSession`] owns the currently attached layer group and enforces
//! the invariant that at most one group is attached at a time: swapping
//! detaches the old group before attaching the new one, under a single
//! lock, so no observer ever sees zero or duplicate groups.

use crate::feature::LonLat;
use crate::layer::LayerGroup;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// The visible map area, as reported by the basemap engine.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub center: LonLat,
    pub zoom: f64,
}

/// Capability provided by the underlying basemap engine.
///
/// Implementations draw and remove whole layer groups and project
/// geographic positions to screen pixels for the rendering primitives.
pub trait MapSurface: Send + Sync {
    /// Makes every layer in the group visible.
    fn attach(&self, group: &LayerGroup);

    /// Removes every layer in the group, including its popup bindings.
    fn detach(&self, group: &LayerGroup);

    /// Projects a geographic position to screen pixels at the current
    /// view state.
    fn project_to_screen(&self, position: LonLat) -> (f64, f64);

    /// Returns the current view state.
    fn current_viewport(&self) -> Viewport;
}

/// Owns the currently attached layer group on one map surface.
///
/// This is the single owner of attach/detach state; the refresh
/// controller and the renderer hold it by reference and never touch
/// the surface directly.
pub struct MapSession {
    surface: Arc<dyn MapSurface>,
    current: Mutex<Option<Arc<LayerGroup>>>,
}

impl MapSession {
    pub fn new(surface: Arc<dyn MapSurface>) -> Self {
        Self {
            surface,
            current: Mutex::new(None),
        }
    }

    /// Atomically replaces the attached group.
    ///
    /// The old group is detached first, then the new group attached,
    /// all under the session lock. Returns the detached group, whose
    /// layers are released when the last reference drops.
    pub async fn swap(&self, group: Arc<LayerGroup>) -> Option<Arc<LayerGroup>> {
        let mut current = self.current.lock().await;
        let previous = current.take();
        if let Some(old) = &previous {
            self.surface.detach(old);
        }
        self.surface.attach(&group);
        debug!(
            generation = group.generation,
            layers = group.len(),
            replaced = previous.as_ref().map(|g| g.generation),
            "attached layer group"
        );
        *current = Some(group);
        previous
    }

    /// Detaches the current group, if any, leaving the surface empty.
    pub async fn clear(&self) -> Option<Arc<LayerGroup>> {
        let mut current = self.current.lock().await;
        let previous = current.take();
        if let Some(old) = &previous {
            self.surface.detach(old);
        }
        previous
    }

    /// Returns the currently attached group, if any.
    pub async fn attached(&self) -> Option<Arc<LayerGroup>> {
        self.current.lock().await.clone()
    }

    /// Returns the underlying surface.
    pub fn surface(&self) -> &Arc<dyn MapSurface> {
        &self.surface
    }
}
