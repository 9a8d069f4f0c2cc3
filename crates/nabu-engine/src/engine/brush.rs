//! Brush textures and brush uniforms.

use std::f32::consts::PI;

use crate::cache::{lock, BindOptions};
use crate::coords::{Transform, Vec2};
use crate::gpu::{FilterMode, RenderContext, TextureId, TextureUnit, UniformValue, WrapMode};
use crate::paint::{BrushKind, BrushPattern, Color, GradientKind, Image, ImageFormat, RenderHints, SpreadMode};
use crate::shader::Uniform;

use super::{Dirty, PaintEngine, RenderError};

impl<C: RenderContext> PaintEngine<C> {
    pub(super) fn brush_filter(&self) -> FilterMode {
        if self.state.render_hints.contains(RenderHints::SMOOTH_PIXMAP_TRANSFORM) {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        }
    }

    fn pattern_image(&mut self, pattern: BrushPattern) -> Result<Image, RenderError> {
        if let Some(image) = self.pattern_images.get(&pattern) {
            return Ok(image.clone());
        }
        let image = Image::new(8, 8, ImageFormat::Alpha8, pattern.coverage().to_vec())?;
        self.pattern_images.insert(pattern, image.clone());
        Ok(image)
    }

    fn bind_brush_image(&mut self, image: &Image) -> Result<(TextureId, u32, u32), RenderError> {
        let bound = lock(&self.resources.textures).bind(&mut self.ctx, image, BindOptions::default())?;
        Ok((bound.id, image.width(), image.height()))
    }

    /// Uploads (or finds) the texture the current brush samples from and
    /// binds it to the brush unit.
    pub(super) fn update_brush_texture(&mut self) -> Result<(), RenderError> {
        let filter = self.brush_filter();
        let brush = self.current_brush.clone();

        let bound = match &brush.kind {
            BrushKind::None | BrushKind::Solid(_) => None,
            BrushKind::Pattern { pattern, .. } => {
                let image = self.pattern_image(*pattern)?;
                let (id, _, _) = self.bind_brush_image(&image)?;
                Some((id, WrapMode::Repeat))
            }
            BrushKind::Gradient(gradient) => {
                let id = lock(&self.resources.gradients).get_or_create(&mut self.ctx, gradient, 1.0)?;
                let wrap = match (gradient.spread, gradient.kind) {
                    (_, GradientKind::Conical { .. }) | (SpreadMode::Repeat, _) => WrapMode::Repeat,
                    (SpreadMode::Reflect, _) => WrapMode::MirroredRepeat,
                    (SpreadMode::Pad, _) => WrapMode::ClampToEdge,
                };
                Some((id, wrap))
            }
            BrushKind::Texture { image, .. } => {
                let (id, _, _) = self.bind_brush_image(image)?;
                Some((id, WrapMode::Repeat))
            }
        };

        if let Some((id, wrap)) = bound {
            self.ctx.set_texture_sampling(id, wrap, filter);
            self.ctx.bind_texture(TextureUnit::Brush, Some(id));
        }
        self.dirty.remove(Dirty::BRUSH_TEXTURE);
        Ok(())
    }

    /// Uploads the uniforms of the current brush to the bound program.
    pub(super) fn update_brush_uniforms(&mut self) {
        self.dirty.remove(Dirty::BRUSH_UNIFORMS);
        let brush = self.current_brush.clone();
        let opacity = self.state.opacity;

        let anchor = match &brush.kind {
            BrushKind::None => return,
            BrushKind::Solid(color) => {
                self.set_uniform(Uniform::FragmentColor, color_value(color.scaled(opacity)));
                return;
            }
            BrushKind::Pattern { color, .. } => {
                self.set_uniform(Uniform::PatternColor, color_value(color.scaled(opacity)));
                Vec2::zero()
            }
            BrushKind::Gradient(gradient) => match gradient.kind {
                GradientKind::Linear { start, end } => {
                    let l = end - start;
                    let len2 = l.x * l.x + l.y * l.y;
                    let inv = if len2 > 0.0 { 1.0 / len2 } else { 0.0 };
                    self.set_uniform(Uniform::LinearData, UniformValue::Vec3([l.x, l.y, inv]));
                    start
                }
                GradientKind::Conical { center, angle } => {
                    self.set_uniform(Uniform::Angle, UniformValue::Float(-angle * 2.0 * PI / 360.0));
                    center
                }
                GradientKind::Radial { center, radius, focal, focal_radius } => {
                    let r = radius - focal_radius;
                    let fmp = center - focal;
                    let fmp2_m_radius2 = -(fmp.x * fmp.x + fmp.y * fmp.y) + r * r;
                    self.set_uniform(Uniform::Fmp, UniformValue::Vec2([fmp.x, fmp.y]));
                    self.set_uniform(Uniform::Fmp2MRadius2, UniformValue::Float(fmp2_m_radius2));
                    self.set_uniform(
                        Uniform::Inverse2Fmp2MRadius2,
                        UniformValue::Float(if fmp2_m_radius2 != 0.0 { 0.5 / fmp2_m_radius2 } else { 0.0 }),
                    );
                    self.set_uniform(Uniform::SqrFr, UniformValue::Float(focal_radius * focal_radius));
                    self.set_uniform(
                        Uniform::BRadius,
                        UniformValue::Vec3([2.0 * r * focal_radius, focal_radius, r]),
                    );
                    focal
                }
            },
            BrushKind::Texture { image, color } => {
                if image.is_alpha_mask() {
                    self.set_uniform(Uniform::PatternColor, color_value(color.scaled(opacity)));
                }
                let (w, h) = (image.width().max(1) as f32, image.height().max(1) as f32);
                self.set_uniform(Uniform::InvertedTextureSize, UniformValue::Vec2([1.0 / w, 1.0 / h]));
                Vec2::zero()
            }
        };

        let (w, h) = (self.viewport.width as f32, self.viewport.height as f32);
        self.set_uniform(Uniform::HalfViewportSize, UniformValue::Vec2([0.5 * w, 0.5 * h]));

        // Window coordinates grow upwards; brush space follows the painter.
        let window_to_device = Transform::affine(1.0, 0.0, 0.0, -1.0, 0.0, h);
        let origin = self.state.brush_origin;
        let brush_to_device = brush.transform.then(&self.state.transform.pre_translate(origin.x, origin.y));
        let Some(device_to_brush) = brush_to_device.inverted() else {
            log::debug!("brush transform is not invertible; keeping the previous brush mapping");
            return;
        };
        let matrix = window_to_device
            .then(&device_to_brush)
            .then(&Transform::translation(-anchor.x, -anchor.y));
        self.set_uniform(Uniform::BrushTransform, UniformValue::Mat3(super::matrix::transform_columns(&matrix)));
    }
}

fn color_value(color: Color) -> UniformValue {
    UniformValue::Vec4(color.to_array())
}
