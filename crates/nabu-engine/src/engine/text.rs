//! Text drawn from glyph atlases.
//!
//! Glyphs are rasterized once into a per-font atlas and drawn as textured
//! quads. Coverage glyphs (`A8`) multiply the pen's brush by the atlas
//! alpha. Sub-pixel glyphs (`A32`) need per-channel blending: a solid pen
//! gets away with one pass through the constant blend color, other brushes
//! take two passes. Color glyphs (`Argb`) are drawn like images.

use crate::cache::{lock, subpixel_bucket, CacheTransformKey, GlyphCache, GlyphCacheSettings, GlyphKey, GlyphSlotKey};
use crate::coords::{Rect, Transform, TransformKind, Vec2};
use crate::gpu::{
    BlendFactor, BlendFunc, DrawCall, FilterMode, Primitive, RenderContext, TextureId, TextureUnit, UniformValue,
};
use crate::paint::{Brush, BrushKind, Color, CompositionMode, RenderHints};
use crate::shader::{MaskType, SrcPixelType, Uniform};
use crate::text::{FontEngine, GlyphFormat, GlyphRun};

use super::{matrix, Dirty, DrawingMode, PaintEngine, RenderError};

/// Quads of one glyph run in glyph-cache space.
struct GlyphQuads {
    positions: Vec<Vec2>,
    tex_coords: Vec<Vec2>,
    atlas: TextureId,
    scale: f32,
}

fn push_quad(out: &mut Vec<Vec2>, rect: Rect) {
    let [tl, tr, br, bl] = rect.corners();
    out.extend_from_slice(&[tl, tr, br, tl, br, bl]);
}

/// Scale the glyphs are rasterized at. Engines that cannot render under
/// `transform` get untransformed glyphs and the quads are transformed.
fn glyph_cache_scale(transform: &Transform, font: &dyn FontEngine) -> f32 {
    if !font.supports_transformation(transform) {
        return 1.0;
    }
    let scale = if transform.kind() < TransformKind::Rotate {
        transform.m11.abs()
    } else {
        (transform.m11 * transform.m11 + transform.m12 * transform.m12).sqrt()
    };
    if scale.is_finite() && scale > 0.0 { scale } else { 1.0 }
}

impl<C: RenderContext> PaintEngine<C> {
    /// Draws `run` with the pen's brush. Positions are pen positions on the
    /// baseline in user space.
    pub fn draw_glyphs(&mut self, run: &GlyphRun, font: &dyn FontEngine) {
        if run.is_empty() || !self.state.pen.is_visible() {
            return;
        }
        self.run("draw_glyphs", |engine| engine.draw_cached_glyphs(run, font));
    }

    /// Sub-pixel text needs an opaque target, a translation-only transform
    /// and a composition mode the per-channel blend can express.
    fn glyph_format_for(&self, font: &dyn FontEngine) -> GlyphFormat {
        let format = match (font.glyph_format(), self.config.default_glyph_format) {
            (GlyphFormat::A8, GlyphFormat::A32) => GlyphFormat::A32,
            (native, _) => native,
        };
        if format != GlyphFormat::A32 {
            return format;
        }
        let subpixel = !self.ctx.capabilities().target_has_alpha
            && self.state.transform.kind() <= TransformKind::Translate
            && matches!(self.state.composition_mode, CompositionMode::Source | CompositionMode::SourceOver)
            && self.state.render_hints.contains(RenderHints::TEXT_ANTIALIASING);
        if subpixel { GlyphFormat::A32 } else { GlyphFormat::A8 }
    }

    fn draw_cached_glyphs(&mut self, run: &GlyphRun, font: &dyn FontEngine) -> Result<(), RenderError> {
        let format = self.glyph_format_for(font);
        let Some(quads) = self.build_glyph_quads(run, font, format)? else {
            return Ok(());
        };

        if format == GlyphFormat::Argb {
            self.transfer_mode(DrawingMode::ImageArrays);
        } else {
            self.transfer_mode(DrawingMode::Text);
        }
        self.set_snap_to_pixel_grid(true);
        let pen_brush = self.state.pen.brush.clone();

        match format {
            GlyphFormat::A8 => {
                self.set_current_brush(&pen_brush);
                self.shaders.set_mask_type(MaskType::PixelMask);
                self.prepare_for_glyphs(quads.scale)?;
                self.ctx.bind_texture(TextureUnit::Mask, Some(quads.atlas));
                self.draw_glyph_quads(&quads);
            }
            GlyphFormat::Argb => {
                self.shaders.set_src_pixel_type(SrcPixelType::Image);
                self.prepare_for_glyphs(quads.scale)?;
                self.ctx.bind_texture(TextureUnit::Brush, Some(quads.atlas));
                self.draw_glyph_quads(&quads);
            }
            GlyphFormat::A32 => self.draw_subpixel_glyphs(&quads, &pen_brush)?,
        }
        Ok(())
    }

    /// Makes sure every glyph of `run` is in the atlas and lays out their
    /// quads. `None` when nothing is visible.
    fn build_glyph_quads(
        &mut self,
        run: &GlyphRun,
        font: &dyn FontEngine,
        format: GlyphFormat,
    ) -> Result<Option<GlyphQuads>, RenderError> {
        let scale = glyph_cache_scale(&self.state.transform, font);
        let slot = GlyphSlotKey {
            group: self.ctx.share_group(),
            format,
            transform: CacheTransformKey::from_scale(scale),
        };
        self.resources.register_glyph_slots(font.glyph_caches());
        let settings = GlyphCacheSettings::from_config(&self.config);

        let mut slots = lock(font.glyph_caches());
        let cache = slots.get_or_insert_with(slot, || GlyphCache::new(format, scale, settings));

        let buckets = if font.supports_subpixel_positions() { cache.subpixel_positions() } else { 1 };
        let keys: Vec<GlyphKey> =
            run.iter().map(|(glyph, pos)| GlyphKey::new(glyph, subpixel_bucket(pos.x * scale, buckets))).collect();
        let outcome = cache.populate(&mut self.ctx, font, &keys)?;
        if outcome.cleared {
            log::debug!("glyph atlas of font {} was refilled (serial {})", font.font_key(), cache.serial());
        }

        let Some(atlas) = cache.texture() else {
            return Ok(None);
        };
        let (width, height) = cache.size();
        let (dx, dy) = (1.0 / width as f32, 1.0 / height as f32);
        let margin = font.glyph_margin() as f32;

        let mut positions = Vec::with_capacity(keys.len() * 6);
        let mut tex_coords = Vec::with_capacity(keys.len() * 6);
        for (key, (_, pos)) in keys.iter().zip(run.iter()) {
            let Some(c) = cache.coord(*key).filter(|c| !c.is_empty()) else {
                continue;
            };
            let x = (pos.x * scale).floor() + c.left as f32 - margin;
            let y = (pos.y * scale).round() + c.top as f32 - margin;
            push_quad(&mut positions, Rect::new(x, y, c.width as f32, c.height as f32));
            push_quad(
                &mut tex_coords,
                Rect::new(c.x as f32 * dx, c.y as f32 * dy, c.width as f32 * dx, c.height as f32 * dy),
            );
        }
        if positions.is_empty() {
            return Ok(None);
        }

        let filter = if self.state.transform.kind() > TransformKind::Translate {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        };
        cache.set_filter(&mut self.ctx, filter);
        Ok(Some(GlyphQuads { positions, tex_coords, atlas, scale }))
    }

    /// Like `prepare_for_draw`, with the matrix scaled back from glyph
    /// cache space. Brush uniforms still see the painter transform.
    fn prepare_for_glyphs(&mut self, scale: f32) -> Result<(), RenderError> {
        self.prepare_for_draw(false)?;
        if scale != 1.0 {
            let glyph_space = self.state.transform.pre_scale(1.0 / scale, 1.0 / scale);
            let columns = matrix::projection_columns(&glyph_space, self.viewport, self.snap_to_pixel_grid);
            self.ctx.set_transform_columns(columns);
            self.set_uniform(Uniform::Matrix, UniformValue::Mat3(columns));
            self.dirty |= Dirty::MATRIX;
        }
        Ok(())
    }

    /// Runs `f` as if the paint state were fully opaque.
    fn with_full_opacity<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let opacity = std::mem::replace(&mut self.state.opacity, 1.0);
        self.dirty |= Dirty::OPACITY_UNIFORM | Dirty::BRUSH_UNIFORMS;
        let out = f(self);
        self.state.opacity = opacity;
        self.dirty |= Dirty::OPACITY_UNIFORM | Dirty::BRUSH_UNIFORMS;
        out
    }

    fn draw_subpixel_glyphs(&mut self, quads: &GlyphQuads, pen_brush: &Brush) -> Result<(), RenderError> {
        let source_mode = self.state.composition_mode == CompositionMode::Source;
        self.shaders.set_mask_type(MaskType::SubPixelMaskPass1);

        if let BrushKind::Solid(color) = &pen_brush.kind {
            self.set_current_brush(pen_brush);
            // Pass 1 already weights the coverage by the source alpha, so
            // outside Source mode the constant is the straight color.
            let constant = if source_mode {
                let constant = color.scaled(self.state.opacity).to_array();
                self.with_full_opacity(|engine| engine.prepare_for_glyphs(quads.scale))?;
                constant
            } else {
                self.prepare_for_glyphs(quads.scale)?;
                let (r, g, b, a) = color.to_straight();
                [r, g, b, a]
            };
            self.ctx.bind_texture(TextureUnit::Mask, Some(quads.atlas));
            self.ctx.set_blend(Some(BlendFunc::new(BlendFactor::ConstantColor, BlendFactor::OneMinusSrcColor)));
            self.ctx.set_blend_constant(constant);
            self.draw_glyph_quads(quads);
            return Ok(());
        }

        // Pass 1 clears the destination by the per-channel coverage.
        if source_mode {
            self.set_current_brush(&Brush::solid(Color::WHITE));
            self.with_full_opacity(|engine| engine.prepare_for_glyphs(quads.scale))?;
        } else {
            self.set_current_brush(pen_brush);
            self.prepare_for_glyphs(quads.scale)?;
        }
        self.ctx.bind_texture(TextureUnit::Mask, Some(quads.atlas));
        self.ctx.set_blend(Some(BlendFunc::new(BlendFactor::Zero, BlendFactor::OneMinusSrcColor)));
        self.draw_glyph_quads(quads);

        // Pass 2 adds the brush weighted by the same coverage.
        self.shaders.set_mask_type(MaskType::SubPixelMaskPass2);
        self.set_current_brush(pen_brush);
        self.prepare_for_glyphs(quads.scale)?;
        self.ctx.bind_texture(TextureUnit::Mask, Some(quads.atlas));
        self.ctx.set_blend(Some(BlendFunc::new(BlendFactor::One, BlendFactor::One)));
        self.draw_glyph_quads(quads);
        Ok(())
    }

    fn draw_glyph_quads(&mut self, quads: &GlyphQuads) {
        self.ctx
            .draw(&DrawCall::new(Primitive::Triangles, &quads.positions).with_tex_coords(&quads.tex_coords));
        self.stats.draw_calls += 1;
    }
}
