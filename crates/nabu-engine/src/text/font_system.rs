use std::collections::HashMap;
use std::sync::Arc;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use thiserror::Error;

use crate::coords::Vec2;

use super::font_engine::GlyphId;
use super::fontdue_engine::FontdueEngine;

/// Error returned by [`FontSystem::load_font`].
#[derive(Debug, Clone, Error)]
#[error("font load error: {0}")]
pub struct FontLoadError(pub String);

/// Opaque handle to a font loaded into a [`FontSystem`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FontId(pub(crate) usize);

/// Positioned glyphs of one font engine, ready for
/// [`PaintEngine::draw_glyphs`](crate::PaintEngine::draw_glyphs).
///
/// Positions are pen positions on the baseline, in user space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphRun {
    pub glyphs: Vec<GlyphId>,
    pub positions: Vec<Vec2>,
}

impl GlyphRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, glyph: GlyphId, position: Vec2) {
        self.glyphs.push(glyph);
        self.positions.push(position);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.glyphs.len().min(self.positions.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (GlyphId, Vec2)> + '_ {
        self.glyphs.iter().copied().zip(self.positions.iter().copied())
    }
}

/// Owns a collection of loaded fonts and the font engines built from them.
///
/// Engines are kept per (font, pixel size) so their glyph atlases survive
/// across frames.
pub struct FontSystem {
    fonts: Vec<Arc<fontdue::Font>>,
    engines: HashMap<(FontId, u32), Arc<FontdueEngine>>,
}

impl FontSystem {
    pub fn new() -> Self {
        Self { fonts: Vec::new(), engines: HashMap::new() }
    }

    /// Parses and stores a TrueType or OpenType font from raw bytes.
    pub fn load_font(&mut self, bytes: &[u8]) -> Result<FontId, FontLoadError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| FontLoadError(e.to_string()))?;
        let id = FontId(self.fonts.len());
        self.fonts.push(Arc::new(font));
        Ok(id)
    }

    pub(crate) fn get(&self, id: FontId) -> Option<&fontdue::Font> {
        self.fonts.get(id.0).map(|f| f.as_ref())
    }

    /// Font engine for `id` at `size` pixels, created on first use.
    pub fn engine(&mut self, id: FontId, size: f32) -> Option<Arc<FontdueEngine>> {
        let font = self.fonts.get(id.0)?;
        let engine = self
            .engines
            .entry((id, size.to_bits()))
            .or_insert_with(|| Arc::new(FontdueEngine::new(font.clone(), size)));
        Some(engine.clone())
    }

    /// Lays out `text` with its first baseline starting at `origin`.
    pub fn layout(&self, text: &str, id: FontId, size: f32, origin: Vec2) -> GlyphRun {
        let mut run = GlyphRun::new();
        let Some(font) = self.get(id) else {
            return run;
        };

        let mut layout: Layout<()> = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings::default());
        layout.append(&[font], &TextStyle::new(text, size, 0));
        let ascent = font.horizontal_line_metrics(size).map_or(size, |m| m.ascent);

        for g in layout.glyphs() {
            if g.parent.is_control() {
                continue;
            }
            // Layout places bitmaps; convert back to the pen on the baseline.
            let m = font.metrics_indexed(g.key.glyph_index, size);
            let pen = Vec2::new(g.x - m.xmin as f32, g.y + (m.ymin + m.height as i32) as f32 - ascent);
            run.push(g.key.glyph_index, origin + pen);
        }
        run
    }

    /// Bounding size of `text` laid out at `size`, measured by pen advances.
    #[must_use]
    pub fn measure_text(&self, text: &str, id: FontId, size: f32, max_width: Option<f32>) -> Vec2 {
        let Some(font) = self.get(id) else {
            return Vec2::new(0.0, size * 1.2);
        };

        let mut layout: Layout<()> = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings { max_width, ..LayoutSettings::default() });
        layout.append(&[font], &TextStyle::new(text, size, 0));

        let glyphs = layout.glyphs();
        if glyphs.is_empty() {
            return Vec2::new(0.0, size * 1.2);
        }

        let w = glyphs
            .iter()
            .map(|g| {
                let m = font.metrics_indexed(g.key.glyph_index, size);
                (g.x - m.xmin as f32 + m.advance_width).max(0.0)
            })
            .fold(0.0f32, f32::max);
        let h = glyphs.iter().map(|g| g.y + g.height as f32).fold(size, f32::max);
        Vec2::new(w, h)
    }
}

impl Default for FontSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_font_lays_out_nothing() {
        let fonts = FontSystem::new();
        let run = fonts.layout("abc", FontId(3), 12.0, Vec2::zero());
        assert!(run.is_empty());
        assert_eq!(fonts.measure_text("abc", FontId(3), 10.0, None), Vec2::new(0.0, 12.0));
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        let mut fonts = FontSystem::new();
        assert!(fonts.load_font(&[0, 1, 2, 3]).is_err());
        assert!(fonts.engine(FontId(0), 12.0).is_none());
    }

    #[test]
    fn glyph_run_pairs_ids_with_positions() {
        let mut run = GlyphRun::new();
        run.push(7, Vec2::new(1.0, 2.0));
        run.push(9, Vec2::new(5.0, 2.0));
        let pairs: Vec<_> = run.iter().collect();
        assert_eq!(pairs, vec![(7, Vec2::new(1.0, 2.0)), (9, Vec2::new(5.0, 2.0))]);
    }
}
