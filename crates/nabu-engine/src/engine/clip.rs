//! Clipping.
//!
//! The clip is a scissor rectangle plus, for anything that is not an
//! axis-aligned rectangle, a level in the stencil buffer. Each nested
//! path clip gets the next level: pixels inside every clip so far hold
//! a payload `>= current_clip`, so draws test with
//! `LEQUAL current_clip` against the low seven bits. When the levels run
//! out the stencil is compacted back to a single level.
//!
//! ```text
//!   stencil byte:  [H|p p p p p p p]
//!                   │ └─ clip level payload (1..=127)
//!                   └─── scratch bit for fills and clip writes
//! ```

use crate::coords::{region_subtract, Rect, TransformKind};
use crate::geom::{FillRule, PathBuilder, VectorPath, VertexArray};
use crate::gpu::stencil::{HIGH_BIT, PAYLOAD_MASK};
use crate::gpu::{CompareFunction, RenderContext, StencilFaceOps, StencilOp};

use super::fill::{StencilFill, KEEP_REPLACE};
use super::state::ClipRecord;
use super::{matrix, ClipOperation, ClipShape, Dirty, DrawingMode, PaintEngine, RenderError};

/// How `write_clip` marks the new level.
#[derive(Debug, Copy, Clone)]
struct ClipPasses {
    rule: FillRule,
    /// Flip bits straight from `reference` to `value` with one parity draw.
    single_pass: bool,
    clip_test: bool,
    value: u8,
    reference: u8,
}

impl ClipShape {
    fn to_path(&self) -> VectorPath {
        match self {
            ClipShape::Path(path) => path.clone(),
            ClipShape::Rect(rect) => PathBuilder::new().add_rect(*rect).build(),
        }
    }
}

impl<C: RenderContext> PaintEngine<C> {
    pub fn clip_path(&mut self, path: &VectorPath, op: ClipOperation) {
        self.clip(ClipShape::Path(path.clone()), op);
    }

    pub fn clip_rect(&mut self, rect: Rect, op: ClipOperation) {
        self.clip(ClipShape::Rect(rect), op);
    }

    /// Turns the recorded clip on or off without forgetting it.
    pub fn set_clip_enabled(&mut self, enabled: bool) {
        self.state.clip_enabled = enabled;
        self.state.clip_changed = true;
        if !self.active || self.needs_sync {
            return;
        }
        if self.state.has_clipping() {
            self.regenerate_clip();
        } else {
            self.system_state_changed();
        }
    }

    /// A user clip is in effect.
    pub fn has_clipping(&self) -> bool {
        self.state.has_clipping()
    }

    fn clip(&mut self, shape: ClipShape, op: ClipOperation) {
        if !self.check_active("clip") {
            return;
        }
        let op = if !self.state.has_clipping() && op == ClipOperation::IntersectClip {
            ClipOperation::ReplaceClip
        } else {
            op
        };
        self.state.clip_enabled = true;

        let path = shape.to_path();
        self.run("clip", |engine| engine.apply_clip(&path, op));

        if matches!(op, ClipOperation::ReplaceClip | ClipOperation::NoClip) {
            self.state.clip_history.clear();
        }
        self.state.clip_history.push(ClipRecord { transform: self.state.transform, shape, op });
    }

    fn apply_clip(&mut self, path: &VectorPath, op: ClipOperation) -> Result<(), RenderError> {
        self.state.clip_changed = true;

        let op = match op {
            ClipOperation::ReplaceClip => {
                if !self.state.clip_history.is_empty() {
                    self.system_state_changed();
                    self.state.can_restore_clip = false;
                }
                ClipOperation::IntersectClip
            }
            other => other,
        };

        let t = self.state.transform;
        if op == ClipOperation::IntersectClip && !path.is_empty() && path.is_rect() {
            let axis_aligned = t.kind() <= TransformKind::Scale
                || (t.kind() == TransformKind::Rotate && t.m11.abs() < 1e-6 && t.m22.abs() < 1e-6);
            if axis_aligned {
                let device = t.map_rect(path.control_point_rect()).to_irect_rounded();
                self.state.rectangle_clip = self.state.rectangle_clip.intersect(device).unwrap_or_default();
                self.update_clip_scissor_test();
                return Ok(());
            }
        }

        match op {
            ClipOperation::NoClip => {
                self.state.clip_test_enabled = false;
                self.state.rectangle_clip = self.viewport.irect();
                self.state.can_restore_clip = false;
                self.update_clip_scissor_test();
            }
            _ => {
                let device = t.map_rect(path.control_point_rect()).to_irect_outer();
                self.state.rectangle_clip = self.state.rectangle_clip.intersect(device).unwrap_or_default();
                self.update_clip_scissor_test();
                self.reset_clip_if_needed()?;
                self.max_clip += 1;
                let level = self.max_clip;
                self.write_clip(path, level)?;
                self.state.current_clip = level;
                self.state.clip_test_enabled = true;
            }
        }
        Ok(())
    }

    /// Marks pixels inside `path` (and inside the current clip) with
    /// `value`.
    fn write_clip(&mut self, path: &VectorPath, value: u8) -> Result<(), RenderError> {
        self.transfer_mode(DrawingMode::Brush);
        self.set_snap_to_pixel_grid(false);
        if self.dirty.contains(Dirty::MATRIX) {
            self.update_matrix();
        }
        self.stencil_clean = false;

        let winding = path.fill_rule() == FillRule::Winding;
        let clip_test = self.state.clip_test_enabled;
        let needs_clear = self.state.needs_clip_buffer_clear;
        // Parity fills can flip straight from the reference level to `value`
        // when no stale level lies between them.
        let single_pass =
            !winding && ((clip_test && self.state.current_clip == self.max_clip - 1) || needs_clear);
        let reference = if needs_clear { 1 } else { self.state.current_clip };

        if needs_clear {
            self.clear_clip(1);
        }

        if path.is_empty() {
            self.enable_stencil(true);
            self.stencil_func(CompareFunction::LessEqual, value, PAYLOAD_MASK);
            return Ok(());
        }

        if clip_test {
            self.stencil_func(CompareFunction::LessEqual, self.state.current_clip, PAYLOAD_MASK);
        } else {
            self.stencil_func(CompareFunction::Always, 0, 0xff);
        }

        let mut vertices = std::mem::take(&mut self.vertices);
        vertices.clear();
        vertices.add_path(path, self.inverse_scale, false);
        let passes = ClipPasses { rule: path.fill_rule(), single_pass, clip_test, value, reference };
        let result = self.write_clip_passes(&vertices, passes);
        self.vertices = vertices;
        result?;

        self.stencil_func(CompareFunction::LessEqual, value, PAYLOAD_MASK);
        self.stencil_mask(0);
        self.ctx.set_color_write(true);
        Ok(())
    }

    fn write_clip_passes(&mut self, vertices: &VertexArray, passes: ClipPasses) -> Result<(), RenderError> {
        let bounds = vertices.bounds();
        if !passes.single_pass {
            self.fill_stencil(StencilFill::fans(passes.rule, vertices), bounds)?;
        }

        self.ctx.set_color_write(false);
        self.use_simple_shader()?;
        self.enable_stencil(true);

        if passes.single_pass {
            self.stencil_func(CompareFunction::LessEqual, passes.reference, PAYLOAD_MASK);
            let invert = StencilFaceOps::new(StencilOp::Keep, StencilOp::Invert);
            self.stencil_ops(invert, invert);
            self.stencil_mask(passes.value ^ passes.reference);
            self.draw_fans(vertices);
        } else {
            self.stencil_ops(KEEP_REPLACE, KEEP_REPLACE);
            self.stencil_mask(0xff);
            if !passes.clip_test && passes.rule == FillRule::Winding {
                // Any winding count becomes the high bit.
                self.stencil_func(CompareFunction::NotEqual, HIGH_BIT, PAYLOAD_MASK);
                self.composite(bounds);
            }
            self.stencil_func(CompareFunction::NotEqual, passes.value, HIGH_BIT);
            self.composite(bounds);
        }
        Ok(())
    }

    /// Folds every level at or above the current clip into level 1 once
    /// the last level is in use.
    fn reset_clip_if_needed(&mut self) -> Result<(), RenderError> {
        if self.max_clip != PAYLOAD_MASK {
            return Ok(());
        }
        log::debug!("clip levels exhausted, compacting the stencil buffer");

        self.use_simple_shader()?;
        self.enable_stencil(true);
        self.ctx.set_color_write(false);
        self.ctx.set_transform_columns(matrix::device_columns(self.viewport));
        let screen = self.viewport.rect();

        // Tag the current clip region with the high bit.
        self.stencil_func(CompareFunction::LessEqual, self.state.current_clip, 0xff);
        let invert = StencilFaceOps::new(StencilOp::Keep, StencilOp::Invert);
        self.stencil_ops(invert, invert);
        self.stencil_mask(HIGH_BIT);
        self.composite(screen);

        // Tagged pixels become 1, everything else 0.
        self.stencil_func(CompareFunction::NotEqual, 1, HIGH_BIT);
        let collapse = StencilFaceOps::new(StencilOp::Zero, StencilOp::Replace);
        self.stencil_ops(collapse, collapse);
        self.stencil_mask(0xff);
        self.composite(screen);

        self.state.current_clip = 1;
        self.state.can_restore_clip = false;
        self.max_clip = 1;
        self.stencil_mask(0);
        self.ctx.set_color_write(true);
        self.ctx.set_transform_columns(self.pmv);
        self.stats.clip_compactions += 1;
        Ok(())
    }

    /// Programs the stencil test and scissor box for the current clip.
    pub(super) fn update_clip_scissor_test(&mut self) {
        if self.state.clip_test_enabled {
            self.stencil_enabled = true;
            self.stencil_func(CompareFunction::LessEqual, self.state.current_clip, PAYLOAD_MASK);
        } else {
            self.stencil_enabled = false;
            self.stencil_func(CompareFunction::Always, 0, 0xff);
        }

        let viewport = self.viewport.irect();
        let mut bounds = self.state.rectangle_clip;
        if self.use_system_clip
            && let Some(system) = self.system_clip
        {
            bounds = bounds.intersect(system).unwrap_or_default();
        }
        let bounds = bounds.intersect(viewport).unwrap_or_default();
        self.current_scissor = bounds;
        self.ctx.set_scissor(if bounds == viewport { None } else { Some(bounds) });
    }

    /// Drops every user clip, leaving only the system clip.
    pub(super) fn system_state_changed(&mut self) {
        self.state.clip_changed = true;
        let viewport = self.viewport.irect();
        self.use_system_clip = self.system_clip.is_some_and(|clip| clip != viewport);
        self.state.clip_test_enabled = false;
        self.state.needs_clip_buffer_clear = true;
        self.state.current_clip = 1;
        self.max_clip = 1;
        self.state.rectangle_clip = match self.system_clip {
            Some(clip) if self.use_system_clip => clip,
            _ => viewport,
        };
        self.update_clip_scissor_test();
    }

    fn clear_clip(&mut self, value: u8) {
        self.dirty_stencil = region_subtract(&self.dirty_stencil, self.current_scissor);
        self.ctx.clear_stencil(Some(self.current_scissor), value);
        self.state.needs_clip_buffer_clear = false;
    }

    /// Rebuilds the clip from scratch by replaying the recorded clip calls.
    pub(super) fn regenerate_clip(&mut self) {
        self.system_state_changed();
        if !self.state.has_clipping() {
            return;
        }

        let transform = self.state.transform;
        let history = self.state.clip_history.clone();
        for record in &history {
            if record.transform != self.state.transform {
                self.state.transform = record.transform;
                self.dirty |= Dirty::MATRIX;
            }
            let path = record.shape.to_path();
            if let Err(err) = self.apply_clip(&path, record.op) {
                log::warn!("failed to rebuild clip: {err}");
                self.stats.skipped_draws += 1;
            }
        }
        if transform != self.state.transform {
            self.state.transform = transform;
            self.dirty |= Dirty::MATRIX;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{engine, red};
    use super::*;
    use crate::coords::{IRect, Transform, Vec2};
    use crate::gpu::testing::RecordingContext;

    fn triangle(rule: FillRule) -> VectorPath {
        let mut builder = PathBuilder::new().fill_rule(rule);
        builder.add_polygon(&[Vec2::new(0.0, 0.0), Vec2::new(16.0, 0.0), Vec2::new(0.0, 16.0)]);
        builder.build()
    }

    fn diamond() -> VectorPath {
        let mut builder = PathBuilder::new().fill_rule(FillRule::OddEven);
        builder.add_polygon(&[
            Vec2::new(8.0, 1.0),
            Vec2::new(15.0, 8.0),
            Vec2::new(8.0, 15.0),
            Vec2::new(1.0, 8.0),
        ]);
        builder.build()
    }

    fn coverage(ctx: &RecordingContext, w: u32, h: u32) -> Vec<bool> {
        (0..h).flat_map(|y| (0..w).map(move |x| (x, y))).map(|(x, y)| ctx.is_covered(x, y)).collect()
    }

    fn fill_all(engine: &mut PaintEngine<RecordingContext>) {
        engine.fill_rect(Rect::new(0.0, 0.0, 16.0, 16.0), &red());
    }

    /// Pixels `path` covers when filled directly.
    fn reference_coverage(path: &VectorPath) -> Vec<bool> {
        let mut engine = engine(16, 16);
        engine.fill_path(path, &red());
        coverage(engine.context(), 16, 16)
    }

    // ── rectangles ────────────────────────────────────────────────────────

    #[test]
    fn rect_clip_is_scissor_only() {
        let mut engine = engine(16, 16);
        engine.clip_rect(Rect::new(4.0, 4.0, 8.0, 8.0), ClipOperation::IntersectClip);
        fill_all(&mut engine);
        let ctx = engine.context();
        assert_eq!(ctx.stencil_draws(), 0);
        assert_eq!(ctx.draws()[0].scissor, Some(IRect::new(4, 4, 8, 8)));
        assert_eq!(ctx.covered_pixels(), 64);
    }

    #[test]
    fn quarter_turn_keeps_the_rect_fast_path() {
        let mut engine = engine(16, 16);
        let quarter_turn = Transform::translation(-8.0, -8.0)
            .then(&Transform::rotation(std::f32::consts::FRAC_PI_2))
            .then(&Transform::translation(8.0, 8.0));
        engine.set_transform(quarter_turn);
        engine.clip_rect(Rect::new(6.0, 0.0, 4.0, 16.0), ClipOperation::IntersectClip);
        engine.set_transform(Transform::identity());
        fill_all(&mut engine);
        assert_eq!(engine.context().stencil_draws(), 0);
        assert_eq!(engine.context().covered_pixels(), 64);
    }

    #[test]
    fn rotated_rect_goes_through_the_stencil() {
        let mut engine = engine(16, 16);
        engine.set_transform(Transform::rotation(0.3));
        engine.clip_rect(Rect::new(2.0, 0.0, 8.0, 8.0), ClipOperation::IntersectClip);
        assert!(engine.context().stencil_draws() > 0 || engine.context().stencil_clears() > 0);
        assert!(engine.has_clipping());
    }

    // ── paths ─────────────────────────────────────────────────────────────

    #[test]
    fn path_clip_matches_a_direct_fill() {
        for rule in [FillRule::OddEven, FillRule::Winding] {
            let mut engine = engine(16, 16);
            engine.clip_path(&triangle(rule), ClipOperation::ReplaceClip);
            fill_all(&mut engine);
            assert_eq!(coverage(engine.context(), 16, 16), reference_coverage(&triangle(rule)), "{rule:?}");
        }
    }

    #[test]
    fn intersected_clips_cover_the_overlap() {
        let mut engine = engine(16, 16);
        engine.clip_path(&triangle(FillRule::OddEven), ClipOperation::ReplaceClip);
        engine.clip_path(&diamond(), ClipOperation::IntersectClip);
        fill_all(&mut engine);
        let ctx = engine.context();
        assert!(ctx.is_covered(4, 6));
        assert!(!ctx.is_covered(12, 12));
        assert!(!ctx.is_covered(1, 1));
    }

    #[test]
    fn no_clip_restores_full_coverage() {
        let mut engine = engine(16, 16);
        engine.clip_path(&diamond(), ClipOperation::ReplaceClip);
        engine.clip_path(&diamond(), ClipOperation::NoClip);
        assert!(!engine.has_clipping());
        fill_all(&mut engine);
        assert_eq!(engine.context().covered_pixels(), 256);
    }

    #[test]
    fn exhausted_levels_compact_once_without_changing_the_region() {
        let mut engine = engine(16, 16);
        for _ in 0..127 {
            engine.clip_path(&diamond(), ClipOperation::IntersectClip);
        }
        assert_eq!(engine.stats().clip_compactions, 1);
        fill_all(&mut engine);
        assert_eq!(coverage(engine.context(), 16, 16), reference_coverage(&diamond()));
    }

    // ── state ─────────────────────────────────────────────────────────────

    #[test]
    fn restore_returns_to_the_saved_clip() {
        let mut engine = engine(16, 16);
        engine.clip_path(&triangle(FillRule::OddEven), ClipOperation::ReplaceClip);
        engine.save();
        engine.clip_path(&diamond(), ClipOperation::IntersectClip);
        engine.clip_rect(Rect::new(0.0, 0.0, 4.0, 4.0), ClipOperation::IntersectClip);
        engine.restore();
        fill_all(&mut engine);
        assert_eq!(coverage(engine.context(), 16, 16), reference_coverage(&triangle(FillRule::OddEven)));
    }

    #[test]
    fn restore_after_replace_replays_the_parent_clip() {
        let mut engine = engine(16, 16);
        engine.clip_path(&triangle(FillRule::OddEven), ClipOperation::ReplaceClip);
        engine.save();
        engine.clip_path(&diamond(), ClipOperation::ReplaceClip);
        engine.restore();
        fill_all(&mut engine);
        assert_eq!(coverage(engine.context(), 16, 16), reference_coverage(&triangle(FillRule::OddEven)));
    }

    #[test]
    fn disabling_the_clip_keeps_it_for_later() {
        let mut engine = engine(16, 16);
        engine.clip_path(&diamond(), ClipOperation::ReplaceClip);
        engine.set_clip_enabled(false);
        fill_all(&mut engine);
        assert_eq!(engine.context().covered_pixels(), 256);

        engine.context_mut().clear_color();
        engine.set_clip_enabled(true);
        fill_all(&mut engine);
        assert_eq!(coverage(engine.context(), 16, 16), reference_coverage(&diamond()));
    }

    #[test]
    fn system_clip_survives_no_clip() {
        let mut engine = engine(16, 16);
        engine.set_system_clip(Some(IRect::new(0, 0, 8, 16)));
        engine.clip_rect(Rect::new(0.0, 0.0, 16.0, 4.0), ClipOperation::ReplaceClip);
        engine.clip_rect(Rect::default(), ClipOperation::NoClip);
        fill_all(&mut engine);
        assert_eq!(engine.context().covered_pixels(), 128);
        assert_eq!(engine.clip_bounds(), IRect::new(0, 0, 8, 16));
    }
}
