//! Glyph atlases.
//!
//! One [`GlyphCache`] exists per font engine, share group, glyph format and
//! cache transform. Glyphs are packed on shelves into a single texture whose
//! width stays fixed; the height doubles on demand (GPU copy of the old
//! contents) up to a limit, after which the atlas is emptied and refilled
//! with just the glyphs of the current draw.

use std::collections::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::coords::IRect;
use crate::gpu::{FilterMode, GpuError, OwnedTexture, RenderContext, ShareGroupId, TextureId, WrapMode};
use crate::text::{FontEngine, GlyphFormat, GlyphId, RasterizedGlyph};

/// A glyph at one horizontal sub-pixel bucket.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct GlyphKey {
    pub glyph: GlyphId,
    pub subpixel: u8,
}

impl GlyphKey {
    #[inline]
    pub const fn new(glyph: GlyphId, subpixel: u8) -> Self {
        Self { glyph, subpixel }
    }
}

/// Where a glyph lives in the atlas and how its bitmap sits on the pen.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GlyphCoord {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl GlyphCoord {
    /// Blank glyphs (spaces) are cached too, so they are rasterized once.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Scale the glyphs of a cache were rasterized at. Translation never
/// changes a bitmap, so it is not part of the key.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CacheTransformKey(u32);

impl CacheTransformKey {
    pub const IDENTITY: CacheTransformKey = CacheTransformKey(0x3f80_0000); // 1.0f32

    #[inline]
    pub fn from_scale(scale: f32) -> Self {
        CacheTransformKey(scale.to_bits())
    }

    #[inline]
    pub fn scale(self) -> f32 {
        f32::from_bits(self.0)
    }
}

/// Sub-pixel bucket of the fractional part of `x` among `buckets`.
pub fn subpixel_bucket(x: f32, buckets: u8) -> u8 {
    if buckets <= 1 || !x.is_finite() {
        return 0;
    }
    let frac = x - x.floor();
    ((frac * buckets as f32) as u8).min(buckets - 1)
}

/// Atlas tunables taken from [`EngineConfig`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GlyphCacheSettings {
    pub subpixel_positions: u8,
    pub margin: u32,
    pub initial_size: u32,
    pub max_height: Option<u32>,
}

impl GlyphCacheSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            subpixel_positions: config.subpixel_positions,
            margin: config.glyph_margin,
            initial_size: config.glyph_atlas_initial_size,
            max_height: config.glyph_atlas_max_height,
        }
    }
}

/// Result of [`GlyphCache::populate`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PopulateOutcome {
    /// Glyphs rasterized and uploaded by this call.
    pub added: usize,
    /// The atlas ran out of room and was emptied first; coordinates fetched
    /// before this call are stale.
    pub cleared: bool,
}

#[derive(Debug, Copy, Clone)]
struct Shelf {
    x: u32,
    y: u32,
    row_height: u32,
}

enum Placement {
    At(u32, u32),
    /// Wider than the atlas; can never be stored.
    TooWide,
    Full,
}

pub struct GlyphCache {
    format: GlyphFormat,
    scale: f32,
    settings: GlyphCacheSettings,
    texture: Option<OwnedTexture>,
    coords: HashMap<GlyphKey, GlyphCoord>,
    shelf: Shelf,
    serial: u64,
    filter: Option<FilterMode>,
    rasterized: usize,
}

impl GlyphCache {
    pub fn new(format: GlyphFormat, scale: f32, settings: GlyphCacheSettings) -> Self {
        let m = settings.margin;
        Self {
            format,
            scale,
            settings,
            texture: None,
            coords: HashMap::new(),
            shelf: Shelf { x: m, y: m, row_height: 0 },
            serial: 0,
            filter: None,
            rasterized: 0,
        }
    }

    #[inline]
    pub fn format(&self) -> GlyphFormat {
        self.format
    }

    #[inline]
    pub fn texture(&self) -> Option<TextureId> {
        self.texture.as_ref().map(OwnedTexture::id)
    }

    /// Atlas size in texels; zero before the first glyph.
    pub fn size(&self) -> (u32, u32) {
        self.texture.as_ref().map_or((0, 0), |t| (t.width(), t.height()))
    }

    /// Bumped whenever previously returned coordinates become invalid.
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Glyph bitmaps produced over the cache's lifetime.
    #[inline]
    pub fn rasterized_count(&self) -> usize {
        self.rasterized
    }

    #[inline]
    pub fn subpixel_positions(&self) -> u8 {
        self.settings.subpixel_positions
    }

    pub fn coord(&self, key: GlyphKey) -> Option<GlyphCoord> {
        self.coords.get(&key).copied()
    }

    /// Makes sure every glyph in `keys` has atlas coordinates.
    pub fn populate(
        &mut self,
        ctx: &mut dyn RenderContext,
        engine: &dyn FontEngine,
        keys: &[GlyphKey],
    ) -> Result<PopulateOutcome, GpuError> {
        let mut seen = HashSet::new();
        let missing: Vec<GlyphKey> =
            keys.iter().copied().filter(|k| !self.coords.contains_key(k) && seen.insert(*k)).collect();
        if missing.is_empty() {
            return Ok(PopulateOutcome::default());
        }

        let glyphs = self.rasterize(engine, &missing);
        if self.insert_all(ctx, &glyphs)? {
            return Ok(PopulateOutcome { added: glyphs.len(), cleared: false });
        }

        log::debug!(
            "GlyphCache: atlas of font {} full at {:?}; clearing and repopulating",
            engine.font_key(),
            self.size()
        );
        self.clear();

        let mut seen = HashSet::new();
        let current: Vec<GlyphKey> = keys.iter().copied().filter(|k| seen.insert(*k)).collect();
        let glyphs = self.rasterize(engine, &current);
        if !self.insert_all(ctx, &glyphs)? {
            log::warn!("GlyphCache: a single draw needs more glyphs than the atlas can hold; some are skipped");
        }
        Ok(PopulateOutcome { added: glyphs.len(), cleared: true })
    }

    fn rasterize(&mut self, engine: &dyn FontEngine, keys: &[GlyphKey]) -> Vec<(GlyphKey, RasterizedGlyph)> {
        let buckets = self.settings.subpixel_positions.max(1) as f32;
        self.rasterized += keys.len();
        keys.iter()
            .map(|&key| {
                let shift = key.subpixel as f32 / buckets;
                (key, engine.rasterize(key.glyph, self.scale, shift, self.format))
            })
            .collect()
    }

    /// Uploads glyphs in order; false once one does not fit.
    fn insert_all(
        &mut self,
        ctx: &mut dyn RenderContext,
        glyphs: &[(GlyphKey, RasterizedGlyph)],
    ) -> Result<bool, GpuError> {
        let caps = ctx.capabilities();
        let width = self.settings.initial_size.clamp(1, caps.max_texture_size);
        let max_height = self.settings.max_height.unwrap_or(caps.max_texture_size).min(caps.max_texture_size);
        let bpp = self.format.bytes_per_pixel();

        for (key, glyph) in glyphs {
            let blank = GlyphCoord { x: 0, y: 0, width: 0, height: 0, left: glyph.left, top: glyph.top };
            if glyph.is_empty() {
                self.coords.insert(*key, blank);
                continue;
            }
            if glyph.data.len() != glyph.width as usize * glyph.height as usize * bpp || glyph.format != self.format {
                log::warn!("GlyphCache: glyph {} came back in the wrong layout; skipped", key.glyph);
                self.coords.insert(*key, blank);
                continue;
            }

            let (x, y) = match self.place(glyph.width, glyph.height, width, max_height) {
                Placement::At(x, y) => (x, y),
                Placement::TooWide => {
                    log::warn!("GlyphCache: glyph {} is wider than the {width} texel atlas; skipped", key.glyph);
                    self.coords.insert(*key, blank);
                    continue;
                }
                Placement::Full => return Ok(false),
            };

            let atlas = self.ensure_height(ctx, width, y + glyph.height + self.settings.margin, max_height)?;
            let region = IRect::new(x as i32, y as i32, glyph.width as i32, glyph.height as i32);
            ctx.upload_texture(atlas, region, &glyph.data)?;
            self.coords.insert(
                *key,
                GlyphCoord { x, y, width: glyph.width, height: glyph.height, left: glyph.left, top: glyph.top },
            );
        }
        Ok(true)
    }

    fn place(&mut self, w: u32, h: u32, atlas_width: u32, max_height: u32) -> Placement {
        let m = self.settings.margin;
        if w + 2 * m > atlas_width || h + 2 * m > max_height {
            return Placement::TooWide;
        }
        if self.shelf.x + w + m > atlas_width {
            self.shelf.x = m;
            self.shelf.y += self.shelf.row_height + m;
            self.shelf.row_height = 0;
        }
        if self.shelf.y + h + m > max_height {
            return Placement::Full;
        }
        let at = (self.shelf.x, self.shelf.y);
        self.shelf.x += w + m;
        self.shelf.row_height = self.shelf.row_height.max(h);
        Placement::At(at.0, at.1)
    }

    /// Creates or grows the atlas so it is at least `needed` texels tall.
    fn ensure_height(
        &mut self,
        ctx: &mut dyn RenderContext,
        width: u32,
        needed: u32,
        max_height: u32,
    ) -> Result<TextureId, GpuError> {
        let grown_height = |from: u32| needed.max(from).next_power_of_two().min(max_height);

        let Some(old) = self.texture.take() else {
            let height = grown_height(self.settings.initial_size.max(1));
            let texture = OwnedTexture::create(ctx, width, height, self.format.texture_format())?;
            let id = texture.id();
            self.texture = Some(texture);
            self.filter = None;
            return Ok(id);
        };
        if old.height() >= needed {
            let id = old.id();
            self.texture = Some(old);
            return Ok(id);
        }

        let height = grown_height(old.height());
        let texture = match OwnedTexture::create(ctx, old.width(), height, self.format.texture_format()) {
            Ok(t) => t,
            Err(err) => {
                self.texture = Some(old);
                return Err(err);
            }
        };
        let copied = ctx.copy_texture(
            old.id(),
            IRect::new(0, 0, old.width() as i32, old.height() as i32),
            texture.id(),
            (0, 0),
        );
        log::debug!("GlyphCache: grew atlas {}x{} -> {}x{height}", old.width(), old.height(), old.width());
        old.release(ctx);
        let id = texture.id();
        self.texture = Some(texture);
        self.filter = None;
        copied.map(|()| id)
    }

    /// Sets the atlas sampling filter, skipping redundant changes.
    pub fn set_filter(&mut self, ctx: &mut dyn RenderContext, filter: FilterMode) {
        let Some(texture) = &self.texture else { return };
        if self.filter != Some(filter) {
            ctx.set_texture_sampling(texture.id(), WrapMode::ClampToEdge, filter);
            self.filter = Some(filter);
        }
    }

    /// Forgets every glyph but keeps the texture for reuse.
    pub fn clear(&mut self) {
        self.coords.clear();
        let m = self.settings.margin;
        self.shelf = Shelf { x: m, y: m, row_height: 0 };
        self.serial += 1;
    }

    pub fn release(&mut self, ctx: &mut dyn RenderContext) {
        self.clear();
        if let Some(texture) = self.texture.take() {
            texture.release(ctx);
        }
        self.filter = None;
    }
}

/// Identity of one atlas within a font engine's slots.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct GlyphSlotKey {
    pub group: ShareGroupId,
    pub format: GlyphFormat,
    pub transform: CacheTransformKey,
}

/// The atlases a font engine owns across share groups.
#[derive(Default)]
pub struct GlyphCacheSlots {
    caches: HashMap<GlyphSlotKey, GlyphCache>,
}

impl GlyphCacheSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn get(&self, key: &GlyphSlotKey) -> Option<&GlyphCache> {
        self.caches.get(key)
    }

    pub fn get_or_insert_with(&mut self, key: GlyphSlotKey, make: impl FnOnce() -> GlyphCache) -> &mut GlyphCache {
        self.caches.entry(key).or_insert_with(make)
    }

    /// Releases and drops every atlas belonging to `group`.
    pub fn release_group(&mut self, ctx: &mut dyn RenderContext, group: ShareGroupId) {
        let keys: Vec<GlyphSlotKey> = self.caches.keys().filter(|k| k.group == group).copied().collect();
        for key in keys {
            if let Some(mut cache) = self.caches.remove(&key) {
                cache.release(ctx);
            }
        }
    }
}
