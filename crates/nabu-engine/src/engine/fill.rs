//! Filling paths.
//!
//! Rectangles and convex paths are drawn directly. Concave paths are
//! triangulated once they are known to be drawn repeatedly; otherwise they
//! go through the stencil buffer: the interior is accumulated into the
//! stencil (winding counts or a parity bit) and a bounding quad then covers
//! every pixel with a non-zero stencil value, zeroing it as it goes.

use crate::coords::{region_intersect, region_subtract, Rect, Vec2};
use crate::geom::{
    triangulate_fill, within_triangulation_limits, FillRule, IndexBuffer, PathBuilder, Triangulation, VectorPath,
    VertexArray,
};
use crate::gpu::{CompareFunction, DrawCall, Indices, Primitive, RenderContext, StencilFaceOps, StencilOp};
use crate::gpu::stencil::{HIGH_BIT, PAYLOAD_MASK};
use crate::paint::Brush;

use super::geometry_cache::CachedGeometry;
use super::{DrawingMode, PaintEngine, RenderError, Warnings};

/// Geometry to accumulate into the stencil buffer, and how.
#[derive(Debug, Copy, Clone)]
pub(super) enum StencilFill<'a> {
    /// Fans add their winding number to the low bits.
    Winding(&'a VertexArray),
    /// Fans flip the high bit.
    OddEven(&'a VertexArray),
    /// A triangle strip sets the high bit; overlaps count once.
    TriStrip(&'a [Vec2]),
    /// Like `TriStrip`, for indexed triangles.
    Triangles(&'a Triangulation),
}

impl<'a> StencilFill<'a> {
    pub(super) fn fans(rule: FillRule, vertices: &'a VertexArray) -> Self {
        match rule {
            FillRule::Winding => StencilFill::Winding(vertices),
            FillRule::OddEven => StencilFill::OddEven(vertices),
        }
    }
}

pub(super) const KEEP_REPLACE: StencilFaceOps = StencilFaceOps::new(StencilOp::Keep, StencilOp::Replace);

impl<C: RenderContext> PaintEngine<C> {
    /// Fills `path` with `brush` under the current transform and clip.
    pub fn fill_path(&mut self, path: &VectorPath, brush: &Brush) {
        if brush.is_none() || path.is_empty() {
            return;
        }
        self.run("fill_path", |engine| {
            engine.set_current_brush(brush);
            engine.fill(path)
        });
    }

    pub fn fill_rect(&mut self, rect: Rect, brush: &Brush) {
        let path = PathBuilder::new().add_rect(rect).build();
        self.fill_path(&path, brush);
    }

    /// Fills `path` with the current brush, then outlines it with the
    /// current pen.
    pub fn draw_path(&mut self, path: &VectorPath) {
        let brush = self.state.brush.clone();
        self.fill_path(path, &brush);
        let pen = self.state.pen.clone();
        self.stroke_path(path, &pen);
    }

    fn fill(&mut self, path: &VectorPath) -> Result<(), RenderError> {
        self.transfer_mode(DrawingMode::Brush);
        self.set_snap_to_pixel_grid(false);
        // The flattening scale below depends on an up-to-date matrix.
        if self.dirty.contains(super::Dirty::MATRIX) {
            self.update_matrix();
        }
        let opaque = self.current_brush.is_opaque();

        if path.is_rect() {
            self.prepare_for_draw(opaque)?;
            self.composite(path.control_point_rect());
        } else if path.is_convex() {
            self.fill_convex(path, opaque)?;
        } else {
            self.fill_concave(path, opaque)?;
        }
        Ok(())
    }

    fn fill_convex(&mut self, path: &VectorPath, opaque: bool) -> Result<(), RenderError> {
        if !path.is_cacheable() {
            path.make_cacheable();
            let mut vertices = std::mem::take(&mut self.vertices);
            vertices.clear();
            vertices.add_path(path, self.inverse_scale, false);
            let result = self.prepare_for_draw(opaque);
            if result.is_ok() {
                self.draw_fans(&vertices);
            }
            self.vertices = vertices;
            return result.map(drop);
        }

        let key = match self.geometry.lookup(path, self.inverse_scale) {
            Some(key) => {
                self.stats.geometry_cache_hits += 1;
                key
            }
            None => {
                let mut vertices = VertexArray::new();
                vertices.add_path(path, self.inverse_scale, false);
                let fan = vertices.points().to_vec();
                self.geometry.insert(path, CachedGeometry::Fan(fan), self.inverse_scale)
            }
        };

        self.prepare_for_draw(opaque)?;
        if let Some(CachedGeometry::Fan(fan)) = self.geometry.get(key)
            && fan.len() >= 3
        {
            self.ctx.draw(&DrawCall::new(Primitive::TriangleFan, fan));
            self.stats.draw_calls += 1;
        }
        Ok(())
    }

    fn fill_concave(&mut self, path: &VectorPath, opaque: bool) -> Result<(), RenderError> {
        let wide = self.ctx.capabilities().supports_u32_indices;
        let in_range = within_triangulation_limits(path.control_point_rect(), self.inverse_scale);

        if path.is_cacheable() && in_range {
            let key = match self.geometry.lookup(path, self.inverse_scale) {
                Some(key) => {
                    self.stats.geometry_cache_hits += 1;
                    key
                }
                None => {
                    let triangles = triangulate_fill(path, self.inverse_scale, wide)?;
                    self.geometry.insert(path, CachedGeometry::Triangles(triangles), self.inverse_scale)
                }
            };
            self.prepare_for_draw(opaque)?;
            if let Some(CachedGeometry::Triangles(triangles)) = self.geometry.get(key) {
                draw_triangulation(&mut self.ctx, triangles);
                self.stats.draw_calls += 1;
            }
            return Ok(());
        }

        path.make_cacheable();

        if !self.ctx.capabilities().has_stencil() {
            if !in_range {
                if !self.warned.contains(Warnings::PATH_OUT_OF_RANGE) {
                    log::warn!("Painter path exceeds +/-32767 pixels.");
                    self.warned.insert(Warnings::PATH_OUT_OF_RANGE);
                }
                return Err(RenderError::GeometryTooLarge);
            }
            let triangles = triangulate_fill(path, self.inverse_scale, wide)?;
            self.prepare_for_draw(opaque)?;
            draw_triangulation(&mut self.ctx, &triangles);
            self.stats.draw_calls += 1;
            return Ok(());
        }

        let mut vertices = std::mem::take(&mut self.vertices);
        vertices.clear();
        vertices.add_path(path, self.inverse_scale, false);
        let result = self.stencil_and_cover(&vertices, path.fill_rule(), opaque);
        self.vertices = vertices;
        result
    }

    fn stencil_and_cover(&mut self, vertices: &VertexArray, rule: FillRule, opaque: bool) -> Result<(), RenderError> {
        let bounds = vertices.bounds();
        self.fill_stencil(StencilFill::fans(rule, vertices), bounds)?;

        self.stencil_mask(0xff);
        self.stencil_ops(KEEP_REPLACE, KEEP_REPLACE);
        if self.state.clip_test_enabled {
            self.stencil_func(CompareFunction::NotEqual, self.state.current_clip, HIGH_BIT);
        } else if rule == FillRule::Winding {
            self.stencil_func(CompareFunction::NotEqual, 0, 0xff);
        } else {
            self.stencil_func(CompareFunction::NotEqual, 0, HIGH_BIT);
        }
        self.prepare_for_draw(opaque)?;
        self.composite(bounds);
        self.stencil_mask(0);
        self.update_clip_scissor_test();
        Ok(())
    }

    /// Accumulates `geometry` into the stencil buffer with color writes
    /// off. `bounds` must contain the geometry.
    ///
    /// On return the stencil test is enabled, color writes are back on and
    /// the write mask is left as the chosen fill mode needs it.
    pub(super) fn fill_stencil(&mut self, fill: StencilFill<'_>, bounds: Rect) -> Result<(), RenderError> {
        self.stencil_mask(0xff);
        let scissor = self.current_scissor;
        let garbage = region_intersect(&self.dirty_stencil, scissor);
        if !garbage.is_empty() {
            for rect in garbage {
                self.ctx.clear_stencil(Some(rect), 0);
            }
            self.dirty_stencil = region_subtract(&self.dirty_stencil, scissor);
            self.update_clip_scissor_test();
        }

        self.ctx.set_color_write(false);
        self.use_simple_shader()?;
        self.enable_stencil(true);

        match fill {
            StencilFill::Winding(vertices) => {
                let clip_test = self.state.clip_test_enabled;
                if clip_test {
                    // Payloads above the current clip collapse onto it with the
                    // high bit marking "inside the clip".
                    self.stencil_func(CompareFunction::LessEqual, HIGH_BIT | self.state.current_clip, PAYLOAD_MASK);
                    self.stencil_ops(KEEP_REPLACE, KEEP_REPLACE);
                    self.composite(bounds);
                    self.stencil_func(CompareFunction::Equal, HIGH_BIT, HIGH_BIT);
                } else if !self.stencil_clean {
                    self.stencil_func(CompareFunction::Always, 0, 0xff);
                    let zero = StencilFaceOps::always(StencilOp::Zero);
                    self.stencil_ops(zero, zero);
                    self.composite(bounds);
                }

                self.stencil_ops(
                    StencilFaceOps::new(StencilOp::Keep, StencilOp::IncrementWrap),
                    StencilFaceOps::new(StencilOp::Keep, StencilOp::DecrementWrap),
                );
                self.stencil_mask(PAYLOAD_MASK);
                self.draw_fans(vertices);

                if clip_test {
                    // Drop the high bit wherever the winding number is zero.
                    self.stencil_func(CompareFunction::Equal, self.state.current_clip, PAYLOAD_MASK);
                    self.stencil_ops(KEEP_REPLACE, KEEP_REPLACE);
                    self.stencil_mask(HIGH_BIT);
                    self.composite(bounds);
                }
            }
            StencilFill::OddEven(vertices) => {
                self.stencil_mask(HIGH_BIT);
                let invert = StencilFaceOps::new(StencilOp::Keep, StencilOp::Invert);
                self.stencil_ops(invert, invert);
                self.draw_fans(vertices);
            }
            StencilFill::TriStrip(_) | StencilFill::Triangles(_) => {
                self.stencil_mask(HIGH_BIT);
                self.stencil_ops(KEEP_REPLACE, KEEP_REPLACE);
                if self.state.clip_test_enabled {
                    self.stencil_func(
                        CompareFunction::LessEqual,
                        self.state.current_clip | HIGH_BIT,
                        PAYLOAD_MASK,
                    );
                } else {
                    self.stencil_func(CompareFunction::Always, HIGH_BIT, 0xff);
                }
                match fill {
                    StencilFill::TriStrip(strip) => self.draw_arrays(Primitive::TriangleStrip, strip),
                    StencilFill::Triangles(triangles) => {
                        draw_triangulation(&mut self.ctx, triangles);
                        self.stats.draw_calls += 1;
                    }
                    _ => {}
                }
            }
        }

        self.ctx.set_color_write(true);
        self.stencil_clean = false;
        self.stats.stencil_fills += 1;
        Ok(())
    }
}

pub(super) fn draw_triangulation(ctx: &mut dyn RenderContext, triangles: &Triangulation) {
    let indices = match &triangles.indices {
        IndexBuffer::U16(i) => Indices::U16(i),
        IndexBuffer::U32(i) => Indices::U32(i),
    };
    if indices.is_empty() {
        return;
    }
    ctx.draw(&DrawCall::new(Primitive::Triangles, &triangles.vertices).with_indices(indices));
}

#[cfg(test)]
mod tests {
    use super::super::tests::{engine, red};
    use super::*;
    use crate::coords::Transform;
    use crate::gpu::testing::RecordingContext;
    use crate::gpu::Capabilities;
    use crate::config::EngineConfig;

    fn polygon(points: &[(f32, f32)]) -> Vec<Vec2> {
        points.iter().map(|&(x, y)| Vec2::new(x, y)).collect()
    }

    fn donut(rule: FillRule, hole_reversed: bool) -> VectorPath {
        let outer = polygon(&[(0.0, 0.0), (16.0, 0.0), (16.0, 16.0), (0.0, 16.0)]);
        let mut inner = polygon(&[(4.0, 4.0), (12.0, 4.0), (12.0, 12.0), (4.0, 12.0)]);
        if hole_reversed {
            inner.reverse();
        }
        let mut builder = PathBuilder::new().fill_rule(rule);
        builder.add_polygon(&outer).add_polygon(&inner);
        builder.build()
    }

    fn stencil_is_clean(ctx: &RecordingContext, w: u32, h: u32) -> bool {
        (0..h).all(|y| (0..w).all(|x| ctx.stencil_at(x, y) == 0))
    }

    // ── direct fills ──────────────────────────────────────────────────────

    #[test]
    fn rectangle_is_a_single_draw_without_stencil() {
        let mut engine = engine(16, 16);
        engine.fill_rect(Rect::new(2.0, 2.0, 4.0, 4.0), &red());
        let ctx = engine.context();
        assert_eq!(ctx.draws().len(), 1);
        assert_eq!(ctx.stencil_draws(), 0);
        assert_eq!(ctx.stencil_clears(), 0);
        assert_eq!(ctx.covered_pixels(), 16);
    }

    #[test]
    fn convex_ellipse_is_one_fan() {
        let mut engine = engine(32, 32);
        let ellipse = PathBuilder::new().add_ellipse(Rect::new(4.0, 4.0, 24.0, 24.0)).build();
        engine.fill_path(&ellipse, &red());
        let draws = engine.context().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].primitive, Primitive::TriangleFan);
        assert!(engine.context().is_covered(16, 16));
        assert!(!engine.context().is_covered(4, 4));
    }

    #[test]
    fn repeated_convex_fill_reuses_its_fan() {
        let mut engine = engine(32, 32);
        let ellipse = PathBuilder::new().add_ellipse(Rect::new(4.0, 4.0, 24.0, 24.0)).build();
        for _ in 0..3 {
            engine.fill_path(&ellipse, &red());
        }
        assert_eq!(engine.stats().geometry_cache_hits, 1);
    }

    fn ellipse() -> VectorPath {
        PathBuilder::new().add_ellipse(Rect::new(1.0, 1.0, 14.0, 14.0)).build()
    }

    /// Fills `path` on a cleared target; returns the vertices drawn and
    /// the covered pixels.
    fn fill_measured(engine: &mut PaintEngine<RecordingContext>, path: &VectorPath) -> (usize, Vec<bool>) {
        engine.context_mut().clear_calls();
        engine.context_mut().clear_color();
        engine.fill_path(path, &red());
        let ctx = engine.context();
        let vertices = ctx.draws().iter().map(|d| d.vertex_count).sum();
        let coverage = (0..128).flat_map(|y| (0..128).map(move |x| (x, y))).map(|(x, y)| ctx.is_covered(x, y)).collect();
        (vertices, coverage)
    }

    fn fresh_fill(scale: f32) -> (usize, Vec<bool>) {
        let mut engine = engine(128, 128);
        engine.set_transform(Transform::scale(scale, scale));
        fill_measured(&mut engine, &ellipse())
    }

    #[test]
    fn cached_fans_match_fresh_tessellation() {
        for scale in [0.5, 1.0, 3.0, 8.0] {
            let (vertices, coverage) = fresh_fill(scale);

            let mut engine = engine(128, 128);
            engine.set_transform(Transform::scale(scale, scale));
            let path = ellipse();
            fill_measured(&mut engine, &path);
            fill_measured(&mut engine, &path);
            let hits = engine.stats().geometry_cache_hits;
            let (cached_vertices, cached_coverage) = fill_measured(&mut engine, &path);

            assert_eq!(engine.stats().geometry_cache_hits, hits + 1, "scale {scale}");
            assert_eq!(cached_vertices, vertices, "scale {scale}");
            assert!(cached_coverage == coverage, "coverage differs at scale {scale}");
        }
    }

    #[test]
    fn stale_fans_are_rebuilt_like_fresh_ones() {
        let mut engine = engine(128, 128);
        let path = ellipse();
        fill_measured(&mut engine, &path);
        fill_measured(&mut engine, &path);

        // Every step leaves the 2x window of the previous one.
        for scale in [3.0, 8.0, 0.5] {
            engine.set_transform(Transform::scale(scale, scale));
            let hits = engine.stats().geometry_cache_hits;
            let (vertices, coverage) = fill_measured(&mut engine, &path);
            assert_eq!(engine.stats().geometry_cache_hits, hits, "scale {scale}");

            let (fresh_vertices, fresh_coverage) = fresh_fill(scale);
            assert_eq!(vertices, fresh_vertices, "scale {scale}");
            assert!(coverage == fresh_coverage, "coverage differs at scale {scale}");
        }
    }

    #[test]
    fn none_brush_draws_nothing() {
        let mut engine = engine(8, 8);
        engine.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0), &Brush::none());
        assert!(engine.context().draws().is_empty());
    }

    // ── stencil fills ─────────────────────────────────────────────────────

    #[test]
    fn winding_donut_leaves_the_hole_empty() {
        let mut engine = engine(16, 16);
        engine.fill_path(&donut(FillRule::Winding, true), &red());
        let ctx = engine.context();
        assert!(ctx.stencil_draws() > 0);
        assert!(ctx.is_covered(1, 1));
        assert!(ctx.is_covered(14, 8));
        assert!(!ctx.is_covered(8, 8));
        assert!(stencil_is_clean(ctx, 16, 16));
        assert_eq!(engine.stats().stencil_fills, 1);
    }

    #[test]
    fn winding_with_equal_orientation_fills_the_hole() {
        let mut engine = engine(16, 16);
        engine.fill_path(&donut(FillRule::Winding, false), &red());
        assert!(engine.context().is_covered(8, 8));
        assert_eq!(engine.context().covered_pixels(), 256);
    }

    #[test]
    fn odd_even_donut_ignores_orientation() {
        let mut engine = engine(16, 16);
        engine.fill_path(&donut(FillRule::OddEven, false), &red());
        let ctx = engine.context();
        assert!(!ctx.is_covered(8, 8));
        assert!(ctx.is_covered(1, 1));
        assert!(stencil_is_clean(ctx, 16, 16));
    }

    #[test]
    fn odd_even_disjoint_shapes_are_both_filled() {
        let mut engine = engine(16, 16);
        let mut builder = PathBuilder::new().fill_rule(FillRule::OddEven);
        builder
            .add_polygon(&polygon(&[(0.0, 0.0), (6.0, 0.0), (0.0, 6.0)]))
            .add_polygon(&polygon(&[(10.0, 10.0), (16.0, 10.0), (16.0, 16.0), (10.0, 16.0)]));
        engine.fill_path(&builder.build(), &red());
        assert!(engine.context().is_covered(1, 1));
        assert!(engine.context().is_covered(13, 13));
        assert!(!engine.context().is_covered(8, 8));
    }

    #[test]
    fn garbage_stencil_is_cleared_once() {
        let mut engine = engine(16, 16);
        engine.fill_path(&donut(FillRule::Winding, true), &red());
        engine.fill_path(&donut(FillRule::OddEven, true), &red());
        assert_eq!(engine.context().stencil_clears(), 1);
    }

    // ── triangulated fills ────────────────────────────────────────────────

    #[test]
    fn cached_concave_fill_skips_the_stencil() {
        let mut engine = engine(16, 16);
        let path = donut(FillRule::Winding, true);
        engine.fill_path(&path, &red());
        assert!(engine.context().stencil_draws() > 0);

        engine.context_mut().clear_calls();
        engine.context_mut().clear_color();
        engine.fill_path(&path, &red());
        engine.fill_path(&path, &red());

        let ctx = engine.context();
        assert_eq!(ctx.stencil_draws(), 0);
        assert!(ctx.draws().iter().all(|d| d.indexed));
        assert!(!ctx.is_covered(8, 8));
        assert!(ctx.is_covered(1, 1));
        assert_eq!(engine.stats().geometry_cache_hits, 1);
    }

    #[test]
    fn without_stencil_concave_paths_are_triangulated() {
        let caps = Capabilities { stencil_bits: 0, max_texture_size: 4096, supports_u32_indices: false, target_has_alpha: true };
        let mut engine = PaintEngine::new(RecordingContext::with_capabilities(16, 16, caps), EngineConfig::default());
        engine.begin();
        engine.fill_path(&donut(FillRule::OddEven, false), &red());
        let ctx = engine.context();
        assert_eq!(ctx.draws().len(), 1);
        assert!(ctx.draws()[0].indexed);
        assert!(!ctx.is_covered(8, 8));
        assert!(ctx.is_covered(1, 8));
    }

    #[test]
    fn out_of_range_path_without_stencil_is_dropped() {
        let caps = Capabilities { stencil_bits: 0, max_texture_size: 4096, supports_u32_indices: true, target_has_alpha: true };
        let mut engine = PaintEngine::new(RecordingContext::with_capabilities(16, 16, caps), EngineConfig::default());
        engine.begin();
        let mut builder = PathBuilder::new();
        builder.add_polygon(&polygon(&[(0.0, 0.0), (40000.0, 0.0), (8.0, 8.0), (0.0, 40000.0)]));
        let path = builder.build();
        engine.fill_path(&path, &red());
        assert!(engine.context().draws().is_empty());
        assert_eq!(engine.stats().skipped_draws, 1);
        // Warned once, but every dropped fill is counted.
        engine.fill_path(&path, &red());
        assert!(engine.context().draws().is_empty());
        assert_eq!(engine.stats().skipped_draws, 2);
    }

    #[test]
    fn empty_rect_path_is_ignored() {
        let mut engine = engine(8, 8);
        engine.fill_path(&PathBuilder::new().build(), &red());
        assert!(engine.context().draws().is_empty());
    }
}
