//! Per-share-group resources.
//!
//! Contexts of one share group see the same textures and programs, so the
//! shader repository and the gradient and texture caches live here rather
//! than in a paint engine. Lookups go through a thread-local front map first
//! and fall back to a global back store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::config::EngineConfig;
use crate::gpu::{RenderContext, ShareGroupId};
use crate::shader::ShaderRepository;

use super::glyph::GlyphCacheSlots;
use super::gradient::GradientCache;
use super::lock;
use super::texture::TextureCache;

pub struct ShareGroupResources {
    id: ShareGroupId,
    pub shaders: Arc<Mutex<ShaderRepository>>,
    pub gradients: Mutex<GradientCache>,
    pub textures: Mutex<TextureCache>,
    glyph_slots: Mutex<Vec<Weak<Mutex<GlyphCacheSlots>>>>,
}

impl ShareGroupResources {
    fn new(id: ShareGroupId, config: &EngineConfig) -> Self {
        Self {
            id,
            shaders: Arc::new(Mutex::new(ShaderRepository::new(config.shader_cache_capacity))),
            gradients: Mutex::new(GradientCache::new(config.gradient_cache_capacity, config.gradient_ramp_size)),
            textures: Mutex::new(TextureCache::new(
                config.texture_cache_budget_bytes,
                config.max_texture_size_override,
            )),
            glyph_slots: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> ShareGroupId {
        self.id
    }

    /// Remembers a font engine's atlas slots so teardown can release the
    /// atlases of this group. Dead engines are pruned on the way.
    pub fn register_glyph_slots(&self, slots: &Arc<Mutex<GlyphCacheSlots>>) {
        let mut registered = lock(&self.glyph_slots);
        registered.retain(|w| w.strong_count() > 0);
        if !registered.iter().any(|w| w.as_ptr() == Arc::as_ptr(slots)) {
            registered.push(Arc::downgrade(slots));
        }
    }

    /// Releases every GPU object held for the group.
    fn release(&self, ctx: &mut dyn RenderContext) {
        lock(&self.shaders).clear(ctx);
        lock(&self.gradients).clear(ctx);
        lock(&self.textures).clear(ctx);
        for slots in lock(&self.glyph_slots).drain(..).filter_map(|w| w.upgrade()) {
            lock(&slots).release_group(ctx, self.id);
        }
    }
}

fn back_store() -> &'static Mutex<HashMap<ShareGroupId, Arc<ShareGroupResources>>> {
    static BACK: OnceLock<Mutex<HashMap<ShareGroupId, Arc<ShareGroupResources>>>> = OnceLock::new();
    BACK.get_or_init(|| Mutex::new(HashMap::new()))
}

thread_local! {
    static FRONT: RefCell<HashMap<ShareGroupId, Weak<ShareGroupResources>>> = RefCell::new(HashMap::new());
}

/// Resources of `group`, created with `config` on first use.
pub fn resources_for(group: ShareGroupId, config: &EngineConfig) -> Arc<ShareGroupResources> {
    if let Some(found) = FRONT.with(|front| front.borrow().get(&group).and_then(Weak::upgrade)) {
        return found;
    }

    let resources = lock(back_store())
        .entry(group)
        .or_insert_with(|| {
            log::debug!("creating resources for share group {group:?}");
            Arc::new(ShareGroupResources::new(group, config))
        })
        .clone();
    FRONT.with(|front| {
        let mut front = front.borrow_mut();
        front.retain(|_, w| w.strong_count() > 0);
        front.insert(group, Arc::downgrade(&resources));
    });
    resources
}

/// Tears down `group`: every program, gradient ramp, image texture and glyph
/// atlas created for it is released through `ctx` before this returns.
///
/// Engines still holding the group's resources keep working but start from
/// empty caches the next time they look the group up.
pub fn destroy_share_group(group: ShareGroupId, ctx: &mut dyn RenderContext) {
    let Some(resources) = lock(back_store()).remove(&group) else {
        return;
    };
    FRONT.with(|front| front.borrow_mut().remove(&group));
    resources.release(ctx);
    log::debug!("destroyed share group {group:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::glyph::{CacheTransformKey, GlyphCache, GlyphCacheSettings, GlyphKey, GlyphSlotKey};
    use crate::gpu::testing::RecordingContext;
    use crate::paint::{Color, Image};
    use crate::text::{FontEngine, GlyphFormat};

    #[test]
    fn same_group_shares_resources() {
        let config = EngineConfig::default();
        let group = ShareGroupId::next();
        let a = resources_for(group, &config);
        let b = resources_for(group, &config);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &resources_for(ShareGroupId::next(), &config)));
    }

    #[test]
    fn lookups_from_other_threads_reach_the_back_store() {
        let config = EngineConfig::default();
        let group = ShareGroupId::next();
        let here = resources_for(group, &config);
        let there = std::thread::spawn(move || resources_for(group, &EngineConfig::default())).join().unwrap();
        assert!(Arc::ptr_eq(&here, &there));
    }

    #[test]
    fn destroy_releases_everything() {
        let mut ctx = RecordingContext::new(4, 4);
        let config = EngineConfig::default();
        let group = ctx.share_group();
        let resources = resources_for(group, &config);

        let image = Image::filled(2, 2, Color::WHITE).unwrap();
        lock(&resources.textures).bind(&mut ctx, &image, Default::default()).unwrap();

        let font = crate::cache::BoxFont::new(3);
        resources.register_glyph_slots(font.glyph_caches());
        {
            let mut slots = lock(font.glyph_caches());
            let key = GlyphSlotKey { group, format: GlyphFormat::A8, transform: CacheTransformKey::IDENTITY };
            let settings = GlyphCacheSettings::from_config(&config);
            let cache = slots.get_or_insert_with(key, || GlyphCache::new(GlyphFormat::A8, 1.0, settings));
            cache.populate(&mut ctx, &font, &[GlyphKey::new(1, 0)]).unwrap();
        }
        assert_eq!(ctx.live_textures(), 2);

        destroy_share_group(group, &mut ctx);
        assert_eq!(ctx.live_textures(), 0);
        assert!(lock(font.glyph_caches()).is_empty());
        assert!(!Arc::ptr_eq(&resources, &resources_for(group, &config)));
    }
}
