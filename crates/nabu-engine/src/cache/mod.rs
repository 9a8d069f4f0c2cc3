//! GPU resource caches.
//!
//! Gradient ramps, image textures and glyph atlases, plus the share-group
//! registry that owns them. Every cache hands GPU objects back to the
//! context synchronously when it evicts them.

mod glyph;
mod gradient;
mod share_group;
mod texture;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use glyph::{
    subpixel_bucket, CacheTransformKey, GlyphCache, GlyphCacheSettings, GlyphCacheSlots, GlyphCoord, GlyphKey,
    GlyphSlotKey, PopulateOutcome,
};
pub use gradient::GradientCache;
pub use share_group::{destroy_share_group, resources_for, ShareGroupResources};
pub use texture::{BindOptions, BoundTexture, TextureCache};

#[cfg(test)]
pub(crate) use glyph::tests::BoxFont;

/// Locks `mutex`, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
