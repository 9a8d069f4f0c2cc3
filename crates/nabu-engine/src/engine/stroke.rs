//! Stroking paths.
//!
//! Outlines are generated as one triangle strip by [`Stroker`]. Opaque pens
//! draw the strip straight away; translucent ones stencil it first so that
//! self-overlapping parts of the outline are blended once.

use crate::coords::Rect;
use crate::geom::{dash_path, device_outline, needs_device_outline, Stroker, VectorPath};
use crate::gpu::stencil::HIGH_BIT;
use crate::gpu::{CompareFunction, Primitive, RenderContext};
use crate::paint::{JoinStyle, Pen};

use super::fill::{draw_triangulation, StencilFill, KEEP_REPLACE};
use super::{matrix, DrawingMode, PaintEngine, RenderError};

impl<C: RenderContext> PaintEngine<C> {
    /// Outlines `path` with `pen` under the current transform and clip.
    pub fn stroke_path(&mut self, path: &VectorPath, pen: &Pen) {
        if !pen.is_visible() || path.is_empty() {
            return;
        }
        self.run("stroke_path", |engine| {
            engine.set_current_brush(&pen.brush);
            engine.stroke(path, pen)
        });
    }

    fn stroke(&mut self, path: &VectorPath, pen: &Pen) -> Result<(), RenderError> {
        self.transfer_mode(DrawingMode::Brush);
        self.set_snap_to_pixel_grid(false);
        // The stroker needs the inverse scale of the current transform.
        self.update_matrix();
        let opaque = pen.brush.is_opaque() && self.state.opacity > 0.99;

        if needs_device_outline(pen, &self.state.transform) {
            return self.stroke_device_outline(path, pen, opaque);
        }

        let inverse_scale = self.inverse_scale;
        let mut stroker = std::mem::take(&mut self.stroker);
        match pen.dash_pattern() {
            None => stroker.process(path, pen, inverse_scale),
            Some(pattern) => {
                let width = if pen.width > 0.0 { pen.width } else { 1.0 };
                let unit = if pen.is_cosmetic() { width * inverse_scale } else { width };
                let dashed = dash_path(path, &pattern, pen.dash_offset, unit, inverse_scale);
                stroker.process(&dashed, pen, inverse_scale);
            }
        }
        let result = self.draw_stroke(path, pen, &stroker, opaque);
        self.stroker = stroker;
        result
    }

    fn draw_stroke(&mut self, path: &VectorPath, pen: &Pen, stroker: &Stroker, opaque: bool) -> Result<(), RenderError> {
        let strip = stroker.vertices();
        if strip.is_empty() {
            return Ok(());
        }

        if opaque {
            self.prepare_for_draw(true)?;
            self.draw_arrays(Primitive::TriangleStrip, strip);
            return Ok(());
        }

        let half = if pen.width > 0.0 { pen.width / 2.0 } else { 0.5 };
        let mut extra = match pen.join {
            JoinStyle::Miter => (pen.miter_limit * half).max(half),
            _ => half,
        };
        if pen.is_cosmetic() {
            extra *= self.inverse_scale;
        }
        let bounds = path.control_point_rect().inflated(extra);

        self.fill_stencil(StencilFill::TriStrip(strip), bounds)?;
        self.cover_high_bit(bounds)
    }

    /// Paints every pixel in `bounds` with the high stencil bit set and
    /// clears the bit again.
    fn cover_high_bit(&mut self, bounds: Rect) -> Result<(), RenderError> {
        self.stencil_ops(KEEP_REPLACE, KEEP_REPLACE);
        self.stencil_func(CompareFunction::NotEqual, 0, HIGH_BIT);
        self.prepare_for_draw(false)?;
        self.composite(bounds);
        self.stencil_mask(0);
        self.update_clip_scissor_test();
        Ok(())
    }

    /// Cosmetic pens under transforms that do not scale uniformly are
    /// stroked in device space.
    fn stroke_device_outline(&mut self, path: &VectorPath, pen: &Pen, opaque: bool) -> Result<(), RenderError> {
        let wide = self.ctx.capabilities().supports_u32_indices;
        let outline = device_outline(path, &self.state.transform, pen, wide)?;
        let Some(bounds) = Rect::bounding(outline.vertices.iter().copied()) else {
            return Ok(());
        };

        let device = matrix::device_columns(self.viewport);
        let result = if opaque {
            self.prepare_for_draw(true).map(|_| {
                self.ctx.set_transform_columns(device);
                draw_triangulation(&mut self.ctx, &outline);
                self.stats.draw_calls += 1;
            })
        } else {
            self.ctx.set_transform_columns(device);
            self.fill_stencil(StencilFill::Triangles(&outline), bounds)
                .and_then(|()| self.cover_high_bit(bounds))
        };
        self.ctx.set_transform_columns(self.pmv);
        result
    }
}
