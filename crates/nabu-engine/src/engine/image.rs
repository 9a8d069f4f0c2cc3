//! Images, foreign textures and batched image fragments.

use bitflags::bitflags;

use crate::cache::{lock, BindOptions, BoundTexture};
use crate::coords::{Rect, Transform, Vec2};
use crate::gpu::{DrawCall, Primitive, RenderContext, TextureId, TextureUnit, UniformValue, WrapMode};
use crate::paint::{BrushKind, Color, Image};
use crate::shader::{SrcPixelType, Uniform};

use super::{DrawingMode, PaintEngine, RenderError};

bitflags! {
    /// Promises the caller makes about a fragment batch.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct FragmentHints: u8 {
        /// Treat the image as opaque even if it has an alpha channel.
        const OPAQUE = 1 << 0;
    }
}

/// One copy of part of an image, centered on `position`.
///
/// The `source` rectangle (image pixels) is scaled by `scale_x`/`scale_y`,
/// rotated clockwise by `rotation` degrees and faded by `opacity`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ImageFragment {
    pub position: Vec2,
    pub source: Rect,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    pub opacity: f32,
}

impl ImageFragment {
    pub fn new(position: Vec2, source: Rect) -> Self {
        Self { position, source, scale_x: 1.0, scale_y: 1.0, rotation: 0.0, opacity: 1.0 }
    }

    pub fn with_scale(mut self, scale_x: f32, scale_y: f32) -> Self {
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Top-left, top-right, bottom-right and bottom-left corners in user
    /// space.
    fn corners(&self) -> [Vec2; 4] {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let half_w = 0.5 * self.scale_x * self.source.width();
        let half_h = 0.5 * self.scale_y * self.source.height();
        let right = Vec2::new(half_w * cos, half_w * sin);
        let down = Vec2::new(-half_h * sin, half_h * cos);
        let c = self.position;
        [c - right - down, c + right - down, c + right + down, c - right + down]
    }

    fn local_transform(&self) -> Transform {
        Transform::scale(self.scale_x, self.scale_y)
            .then(&Transform::rotation(self.rotation.to_radians()))
            .then(&Transform::translation(self.position.x, self.position.y))
    }
}

/// `src` in texture coordinates of a `width` x `height` texture.
fn normalized(src: Rect, width: f32, height: f32) -> Rect {
    Rect::new(src.origin.x / width, src.origin.y / height, src.size.x / width, src.size.y / height)
}

impl<C: RenderContext> PaintEngine<C> {
    /// Draws the `src` part of `image` (image pixels) into `dest`.
    ///
    /// Alpha-only images are tinted with the pen color.
    pub fn draw_image(&mut self, dest: Rect, image: &Image, src: Rect) {
        if dest.is_empty() || src.is_empty() {
            return;
        }
        self.run("draw_image", |engine| {
            engine.transfer_mode(DrawingMode::Image);
            let bound = engine.bind_image(image)?;
            let tex = normalized(src, image.width() as f32, image.height() as f32);
            let opaque = !image.has_alpha();
            engine.draw_textured_quad(dest, tex, opaque, bound.alpha_only)
        });
    }

    /// Draws the `src` part of a texture the caller owns. `size` is the
    /// texture size in texels.
    pub fn draw_texture(&mut self, dest: Rect, texture: TextureId, size: (u32, u32), src: Rect) {
        if dest.is_empty() || src.is_empty() || size.0 == 0 || size.1 == 0 {
            return;
        }
        self.run("draw_texture", |engine| {
            engine.transfer_mode(DrawingMode::Image);
            engine.shaders.set_src_pixel_type(SrcPixelType::Image);
            let filter = engine.brush_filter();
            engine.ctx.set_texture_sampling(texture, WrapMode::ClampToEdge, filter);
            engine.ctx.bind_texture(TextureUnit::Brush, Some(texture));
            let tex = normalized(src, size.0 as f32, size.1 as f32);
            engine.draw_textured_quad(dest, tex, false, false)
        });
    }

    /// Draws many transformed copies of parts of `image` in one draw call.
    ///
    /// Shader-composited modes and alpha-only images fall back to one draw
    /// per fragment.
    pub fn draw_image_fragments(&mut self, fragments: &[ImageFragment], image: &Image, hints: FragmentHints) {
        if fragments.is_empty() || !self.check_active("draw_image_fragments") {
            return;
        }
        if !self.state.composition_mode.is_native() || image.is_alpha_mask() {
            for fragment in fragments {
                self.draw_single_fragment(fragment, image);
            }
            return;
        }
        self.run("draw_image_fragments", |engine| engine.draw_fragment_batch(fragments, image, hints));
    }

    fn draw_single_fragment(&mut self, fragment: &ImageFragment, image: &Image) {
        let base = self.state.transform;
        let opacity = self.state.opacity;
        self.save();
        self.set_transform(fragment.local_transform().then(&base));
        self.set_opacity(opacity * fragment.opacity);
        let size = fragment.source.size;
        self.draw_image(Rect::new(-size.x / 2.0, -size.y / 2.0, size.x, size.y), image, fragment.source);
        self.restore();
    }

    fn draw_fragment_batch(
        &mut self,
        fragments: &[ImageFragment],
        image: &Image,
        hints: FragmentHints,
    ) -> Result<(), RenderError> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        let mut positions = Vec::with_capacity(fragments.len() * 6);
        let mut tex_coords = Vec::with_capacity(fragments.len() * 6);
        let mut opacities = Vec::with_capacity(fragments.len() * 6);
        let mut all_opaque = true;

        for fragment in fragments {
            let opacity = fragment.opacity.clamp(0.0, 1.0) * self.state.opacity;
            all_opaque &= opacity >= 0.99;
            let [tl, tr, br, bl] = fragment.corners();
            let [ttl, ttr, tbr, tbl] = normalized(fragment.source, w, h).corners();
            positions.extend_from_slice(&[tl, tr, br, tl, br, bl]);
            tex_coords.extend_from_slice(&[ttl, ttr, tbr, ttl, tbr, tbl]);
            opacities.extend(std::iter::repeat_n(opacity, 6));
        }

        self.transfer_mode(DrawingMode::ImageOpacityArrays);
        self.set_snap_to_pixel_grid(false);
        self.bind_image(image)?;
        let opaque = (!image.has_alpha() || hints.contains(FragmentHints::OPAQUE)) && all_opaque;
        self.prepare_for_draw(opaque)?;
        self.ctx.draw(
            &DrawCall::new(Primitive::Triangles, &positions)
                .with_tex_coords(&tex_coords)
                .with_opacities(&opacities),
        );
        self.stats.draw_calls += 1;
        Ok(())
    }

    /// Uploads (or finds) `image`, binds it to the brush unit and selects
    /// the matching source type.
    fn bind_image(&mut self, image: &Image) -> Result<BoundTexture, RenderError> {
        let bound = lock(&self.resources.textures).bind(&mut self.ctx, image, BindOptions::default())?;
        let src = if bound.alpha_only {
            SrcPixelType::AlphaImage
        } else if bound.premultiplied {
            SrcPixelType::Image
        } else {
            SrcPixelType::NonPremultipliedImage
        };
        self.shaders.set_src_pixel_type(src);
        let filter = self.brush_filter();
        self.ctx.set_texture_sampling(bound.id, WrapMode::ClampToEdge, filter);
        self.ctx.bind_texture(TextureUnit::Brush, Some(bound.id));
        Ok(bound)
    }

    fn draw_textured_quad(&mut self, dest: Rect, tex: Rect, opaque: bool, tinted: bool) -> Result<(), RenderError> {
        self.set_snap_to_pixel_grid(false);
        self.prepare_for_draw(opaque)?;
        if tinted {
            let color = match &self.state.pen.brush.kind {
                BrushKind::Solid(color) => *color,
                _ => Color::BLACK,
            };
            self.set_uniform(Uniform::PatternColor, UniformValue::Vec4(color.to_array()));
        }
        let positions = dest.corners();
        let tex_coords = tex.corners();
        self.ctx.draw(&DrawCall::new(Primitive::TriangleFan, &positions).with_tex_coords(&tex_coords));
        self.stats.draw_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{engine, red};
    use super::*;
    use crate::gpu::testing::RecordingContext;
    use crate::gpu::{BlendFunc, TextureFormat};
    use crate::paint::{CompositionMode, ImageFormat, Pen};

    fn white(w: u32, h: u32) -> Image {
        Image::filled(w, h, Color::WHITE).unwrap()
    }

    fn label(engine: &PaintEngine<RecordingContext>, draw: usize) -> String {
        let ctx = engine.context();
        let program = ctx.draws()[draw].program.unwrap();
        ctx.program_label(program).unwrap_or_default().to_owned()
    }

    // ── single images ─────────────────────────────────────────────────────

    #[test]
    fn image_covers_its_destination() {
        let mut engine = engine(16, 16);
        let image = white(4, 4);
        engine.draw_image(Rect::new(2.0, 2.0, 8.0, 8.0), &image, Rect::new(0.0, 0.0, 4.0, 4.0));

        let ctx = engine.context();
        let draw = ctx.draws()[0];
        assert!(draw.has_tex_coords);
        assert!(draw.textures[TextureUnit::Brush.index()].is_some());
        assert_eq!(draw.blend, None);
        assert_eq!(ctx.covered_pixels(), 64);
        assert!(label(&engine, 0).contains("ImageSrcFragment"));
    }

    #[test]
    fn image_is_uploaded_once() {
        let mut engine = engine(16, 16);
        let image = white(4, 4);
        engine.draw_image(Rect::new(0.0, 0.0, 4.0, 4.0), &image, Rect::new(0.0, 0.0, 4.0, 4.0));
        engine.draw_image(Rect::new(8.0, 8.0, 4.0, 4.0), &image, Rect::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(engine.context().textures_created(), 1);
    }

    #[test]
    fn brush_fill_after_an_image_uses_the_brush_again() {
        let mut engine = engine(16, 16);
        let brush = red();
        engine.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &brush);
        engine.draw_image(Rect::new(4.0, 4.0, 4.0, 4.0), &white(2, 2), Rect::new(0.0, 0.0, 2.0, 2.0));
        engine.fill_rect(Rect::new(8.0, 8.0, 4.0, 4.0), &brush);

        assert!(label(&engine, 2).contains("SolidBrush"));
        assert_eq!(engine.context().pixel(9, 9), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn alpha_image_is_tinted_with_the_pen_color() {
        let mut engine = engine(8, 8);
        engine.set_pen(Pen::solid(Color::from_rgba8(255, 0, 0, 255), 1.0));
        let mask = Image::new(2, 2, ImageFormat::Alpha8, vec![255; 4]).unwrap();
        engine.draw_image(Rect::new(0.0, 0.0, 4.0, 4.0), &mask, Rect::new(0.0, 0.0, 2.0, 2.0));

        let program = engine.context().draws()[0].program.unwrap();
        assert!(label(&engine, 0).contains("AlphaImage"));
        assert_eq!(
            engine.context().uniform(program, "pattern_color"),
            Some(UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn foreign_texture_is_sampled_without_upload() {
        let mut engine = engine(8, 8);
        let texture = engine.context_mut().create_texture(4, 4, TextureFormat::Rgba8).unwrap();
        let created = engine.context().textures_created();
        engine.draw_texture(Rect::new(0.0, 0.0, 8.0, 8.0), texture, (4, 4), Rect::new(0.0, 0.0, 4.0, 4.0));

        let ctx = engine.context();
        assert_eq!(ctx.textures_created(), created);
        assert_eq!(ctx.draws()[0].textures[TextureUnit::Brush.index()], Some(texture));
        assert_eq!(ctx.draws()[0].blend, Some(BlendFunc::SOURCE_OVER));
    }

    // ── fragments ─────────────────────────────────────────────────────────

    #[test]
    fn fragments_share_one_draw() {
        let mut engine = engine(32, 32);
        let image = white(8, 8);
        let fragments: Vec<_> = (0..3)
            .map(|i| ImageFragment::new(Vec2::new(6.0 + 10.0 * i as f32, 6.0), Rect::new(0.0, 0.0, 8.0, 8.0)))
            .collect();
        engine.draw_image_fragments(&fragments, &image, FragmentHints::empty());

        let ctx = engine.context();
        assert_eq!(ctx.draws().len(), 1);
        let draw = ctx.draws()[0];
        assert_eq!(draw.primitive, Primitive::Triangles);
        assert_eq!(draw.vertex_count, 18);
        assert!(draw.has_opacities && draw.has_tex_coords);
        assert!(ctx.is_covered(26, 6));
        assert!(!ctx.is_covered(26, 20));
    }

    #[test]
    fn rotated_fragment_swaps_its_extent() {
        let mut engine = engine(16, 16);
        let image = white(8, 4);
        let fragment = ImageFragment::new(Vec2::new(8.0, 8.0), Rect::new(0.0, 0.0, 8.0, 4.0)).with_rotation(90.0);
        engine.draw_image_fragments(&[fragment], &image, FragmentHints::empty());

        let ctx = engine.context();
        assert!(ctx.is_covered(8, 5));
        assert!(!ctx.is_covered(11, 8));
        assert!(!ctx.is_covered(4, 8));
        assert_eq!(ctx.covered_pixels(), 32);
    }

    #[test]
    fn fragment_opacity_enables_blending() {
        let mut engine = engine(16, 16);
        let image = white(4, 4);
        let source = Rect::new(0.0, 0.0, 4.0, 4.0);
        engine.draw_image_fragments(&[ImageFragment::new(Vec2::new(4.0, 4.0), source)], &image, FragmentHints::OPAQUE);
        let faded = ImageFragment::new(Vec2::new(4.0, 4.0), source).with_opacity(0.5);
        engine.draw_image_fragments(&[faded], &image, FragmentHints::OPAQUE);

        let draws = engine.context().draws();
        assert_eq!(draws[0].blend, None);
        assert_eq!(draws[1].blend, Some(BlendFunc::SOURCE_OVER));
    }

    #[test]
    fn shader_composition_draws_fragments_one_by_one() {
        let mut engine = engine(32, 32);
        engine.set_composition_mode(CompositionMode::Multiply);
        let image = white(4, 4);
        let source = Rect::new(0.0, 0.0, 4.0, 4.0);
        let fragments = [
            ImageFragment::new(Vec2::new(4.0, 4.0), source),
            ImageFragment::new(Vec2::new(20.0, 20.0), source).with_scale(2.0, 2.0),
        ];
        engine.draw_image_fragments(&fragments, &image, FragmentHints::empty());

        let ctx = engine.context();
        assert_eq!(ctx.draws().len(), 2);
        assert!(ctx.draws().iter().all(|d| !d.has_opacities));
        assert!(ctx.is_covered(16, 16));
        assert_eq!(engine.transform(), &Transform::identity());
    }
}
