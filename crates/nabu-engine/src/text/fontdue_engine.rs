use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::GlyphCacheSlots;
use crate::coords::Transform;

use super::font_engine::{is_uniform_scale, FontEngine, GlyphFormat, GlyphId, RasterizedGlyph};

/// [`FontEngine`] over a `fontdue` font at a fixed pixel size.
pub struct FontdueEngine {
    font: Arc<fontdue::Font>,
    px: f32,
    key: u64,
    caches: Arc<Mutex<GlyphCacheSlots>>,
}

impl FontdueEngine {
    pub fn new(font: Arc<fontdue::Font>, px: f32) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            font,
            px: px.max(1.0),
            key: NEXT.fetch_add(1, Ordering::Relaxed),
            caches: Arc::new(Mutex::new(GlyphCacheSlots::new())),
        }
    }

    #[inline]
    pub fn font(&self) -> &fontdue::Font {
        &self.font
    }

    #[inline]
    pub fn pixel_size(&self) -> f32 {
        self.px
    }

    pub fn glyph_index(&self, ch: char) -> GlyphId {
        self.font.lookup_glyph_index(ch)
    }
}

impl FontEngine for FontdueEngine {
    fn font_key(&self) -> u64 {
        self.key
    }

    fn glyph_format(&self) -> GlyphFormat {
        GlyphFormat::A8
    }

    fn supports_subpixel_positions(&self) -> bool {
        true
    }

    fn supports_transformation(&self, transform: &Transform) -> bool {
        is_uniform_scale(transform)
    }

    fn rasterize(&self, glyph: GlyphId, scale: f32, subpixel_x: f32, format: GlyphFormat) -> RasterizedGlyph {
        let px = self.px * scale.max(0.01);
        let shift = subpixel_x.clamp(0.0, 0.999);

        let (metrics, coverage, channels) = match format {
            GlyphFormat::A32 => {
                let (m, rgb) = self.font.rasterize_indexed_subpixel(glyph, px);
                (m, rgb, 3)
            }
            GlyphFormat::A8 | GlyphFormat::Argb => {
                let (m, a) = self.font.rasterize_indexed(glyph, px);
                (m, a, 1)
            }
        };
        if metrics.width == 0 || metrics.height == 0 {
            return RasterizedGlyph::empty(format);
        }

        let (width, coverage) = shift_right(&coverage, metrics.width, metrics.height, channels, shift);
        let data = match format {
            GlyphFormat::A8 => coverage,
            GlyphFormat::A32 => coverage
                .chunks_exact(3)
                .flat_map(|c| [c[0], c[1], c[2], c[0].max(c[1]).max(c[2])])
                .collect(),
            GlyphFormat::Argb => coverage.iter().flat_map(|&a| [a, a, a, a]).collect(),
        };

        RasterizedGlyph {
            width: width as u32,
            height: metrics.height as u32,
            left: metrics.xmin,
            top: -(metrics.ymin + metrics.height as i32),
            format,
            data,
        }
    }

    fn glyph_margin(&self) -> u32 {
        1
    }

    fn glyph_caches(&self) -> &Arc<Mutex<GlyphCacheSlots>> {
        &self.caches
    }
}

/// Moves a bitmap right by a fraction of a pixel with a linear filter. The
/// result is one column wider when `shift` is non-zero.
fn shift_right(src: &[u8], width: usize, height: usize, channels: usize, shift: f32) -> (usize, Vec<u8>) {
    if shift <= 0.0 {
        return (width, src.to_vec());
    }
    let out_width = width + 1;
    let mut out = vec![0u8; out_width * height * channels];
    let keep = 1.0 - shift;
    for y in 0..height {
        for x in 0..out_width {
            for c in 0..channels {
                let at = |col: usize| src[(y * width + col) * channels + c] as f32;
                let here = if x < width { at(x) * keep } else { 0.0 };
                let left = if x > 0 { at(x - 1) * shift } else { 0.0 };
                out[(y * out_width + x) * channels + c] = (here + left + 0.5).min(255.0) as u8;
            }
        }
    }
    (out_width, out)
}
