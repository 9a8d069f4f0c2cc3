//! Fill geometry kept for paths that are drawn more than once.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::coords::Vec2;
use crate::geom::{Triangulation, VectorPath, WeakPath};

new_key_type! {
    pub(crate) struct GeometryKey;
}

#[derive(Debug)]
pub(crate) enum CachedGeometry {
    /// Convex fill drawn as a single fan.
    Fan(Vec<Vec2>),
    /// Concave fill triangulated ahead of time.
    Triangles(Triangulation),
}

#[derive(Debug)]
struct Entry {
    path: WeakPath,
    geometry: CachedGeometry,
    /// Flattening scale the geometry was built at.
    inverse_scale: f32,
}

/// Geometry per path identity.
///
/// Entries die with their path: [`sweep`](Self::sweep) drops everything
/// whose path has been released.
#[derive(Debug, Default)]
pub(crate) struct GeometryCache {
    entries: SlotMap<GeometryKey, Entry>,
    by_path: HashMap<crate::geom::PathId, GeometryKey>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of usable geometry for `path` at `inverse_scale`.
    ///
    /// Curved geometry goes stale once the scale drifts by more than a
    /// factor of two from the one it was flattened at; stale entries are
    /// removed.
    pub fn lookup(&mut self, path: &VectorPath, inverse_scale: f32) -> Option<GeometryKey> {
        let key = *self.by_path.get(&path.id())?;
        let entry = self.entries.get(key)?;
        if path.has_curves() {
            let factor = entry.inverse_scale / inverse_scale;
            if !(0.5..=2.0).contains(&factor) {
                log::trace!("geometry for {:?} built at scale {}, rebuilding", path.id(), entry.inverse_scale);
                self.remove(path);
                return None;
            }
        }
        Some(key)
    }

    pub fn insert(&mut self, path: &VectorPath, geometry: CachedGeometry, inverse_scale: f32) -> GeometryKey {
        self.remove(path);
        let key = self.entries.insert(Entry { path: path.downgrade(), geometry, inverse_scale });
        self.by_path.insert(path.id(), key);
        key
    }

    pub fn get(&self, key: GeometryKey) -> Option<&CachedGeometry> {
        self.entries.get(key).map(|e| &e.geometry)
    }

    fn remove(&mut self, path: &VectorPath) {
        if let Some(key) = self.by_path.remove(&path.id()) {
            self.entries.remove(key);
        }
    }

    /// Drops entries whose path no longer exists. Returns how many went.
    pub fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.path.is_alive());
        let entries = &self.entries;
        self.by_path.retain(|_, key| entries.contains_key(*key));
        before - self.entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Rect;
    use crate::geom::PathBuilder;

    fn fan() -> CachedGeometry {
        CachedGeometry::Fan(vec![Vec2::zero(), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)])
    }

    #[test]
    fn straight_paths_survive_any_scale() {
        let mut cache = GeometryCache::new();
        let path = PathBuilder::new().add_rect(Rect::new(0.0, 0.0, 4.0, 4.0)).build();
        let key = cache.insert(&path, fan(), 1.0);
        assert_eq!(cache.lookup(&path, 0.01), Some(key));
        assert_eq!(cache.lookup(&path.clone(), 100.0), Some(key));
    }

    #[test]
    fn curved_paths_go_stale_past_twice_the_scale() {
        let mut cache = GeometryCache::new();
        let path = PathBuilder::new().add_ellipse(Rect::new(0.0, 0.0, 10.0, 10.0)).build();
        cache.insert(&path, fan(), 1.0);
        assert!(cache.lookup(&path, 0.6).is_some());
        assert!(cache.lookup(&path, 1.9).is_some());
        assert!(cache.lookup(&path, 0.4).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn sweep_drops_released_paths() {
        let mut cache = GeometryCache::new();
        let kept = PathBuilder::new().add_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).build();
        let dropped = PathBuilder::new().add_rect(Rect::new(0.0, 0.0, 2.0, 2.0)).build();
        cache.insert(&kept, fan(), 1.0);
        cache.insert(&dropped, fan(), 1.0);
        drop(dropped);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&kept, 1.0).is_some());
    }
}
