use std::sync::{Arc, Mutex};

use crate::cache::GlyphCacheSlots;
use crate::coords::{Transform, TransformKind};
use crate::gpu::TextureFormat;

/// Glyph index inside a font.
pub type GlyphId = u16;

/// Pixel layout of rasterized glyphs and of the atlas that stores them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum GlyphFormat {
    /// Single-channel coverage.
    #[default]
    A8,
    /// Per-channel (RGB sub-pixel) coverage, drawn in two passes.
    A32,
    /// Color glyphs with premultiplied alpha.
    Argb,
}

impl GlyphFormat {
    #[inline]
    pub fn texture_format(self) -> TextureFormat {
        match self {
            GlyphFormat::A8 => TextureFormat::Alpha8,
            GlyphFormat::A32 | GlyphFormat::Argb => TextureFormat::Rgba8,
        }
    }

    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        self.texture_format().bytes_per_texel()
    }
}

/// A glyph bitmap positioned relative to the pen on the baseline.
///
/// `left`/`top` locate the bitmap's top-left corner in pixels, +Y down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizedGlyph {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
    pub format: GlyphFormat,
    pub data: Vec<u8>,
}

impl RasterizedGlyph {
    pub fn empty(format: GlyphFormat) -> Self {
        Self { width: 0, height: 0, left: 0, top: 0, format, data: Vec::new() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Source of glyph bitmaps for text drawing.
///
/// Each engine owns the glyph atlases built from it, one per share group,
/// glyph format and cache transform. The slots outlive individual paint
/// engines; share-group teardown releases the textures inside.
pub trait FontEngine: Send + Sync {
    /// Stable identity used in logs.
    fn font_key(&self) -> u64;

    /// Format the engine rasterizes natively.
    fn glyph_format(&self) -> GlyphFormat;

    fn supports_subpixel_positions(&self) -> bool;

    /// True when glyphs can be rasterized directly under `transform`;
    /// otherwise the engine caches untransformed glyphs and the quads are
    /// transformed instead.
    fn supports_transformation(&self, transform: &Transform) -> bool;

    /// Rasterizes `glyph` at `scale` times the engine's pixel size, shifted
    /// right by `subpixel_x` (in `[0, 1)`).
    fn rasterize(&self, glyph: GlyphId, scale: f32, subpixel_x: f32, format: GlyphFormat) -> RasterizedGlyph;

    /// Transparent pixels to keep around each glyph in the atlas.
    fn glyph_margin(&self) -> u32 {
        0
    }

    fn glyph_caches(&self) -> &Arc<Mutex<GlyphCacheSlots>>;
}

/// Translation and uniform positive scale, the transforms a plain
/// rasterizer handles by changing the pixel size.
pub fn is_uniform_scale(transform: &Transform) -> bool {
    match transform.kind() {
        TransformKind::Identity | TransformKind::Translate => true,
        TransformKind::Scale => transform.m11 > 0.0 && (transform.m11 - transform.m22).abs() <= 1e-5,
        _ => false,
    }
}
