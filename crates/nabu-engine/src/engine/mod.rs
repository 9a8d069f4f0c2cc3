//! The paint engine.
//!
//! [`PaintEngine`] turns immediate-mode paint calls into stencil passes,
//! shader variant selections and draw calls on a [`RenderContext`]. It keeps
//! a shadow of the GPU state it has programmed and only re-uploads what a
//! draw actually changed: every piece of derived state carries a dirty flag
//! that [`prepare_for_draw`](PaintEngine::prepare_for_draw) consults.
//!
//! Lifecycle:
//!
//! ```text
//!   new ──► begin ──► (draw | save | restore | clip)* ──► end
//!                        ▲                 │
//!                        └── ensure_active ┘   (resync after foreign GPU use)
//! ```

mod brush;
mod clip;
mod error;
mod fill;
mod geometry_cache;
mod image;
pub(crate) mod matrix;
mod state;
mod stroke;
mod text;

pub use error::RenderError;
pub use image::{FragmentHints, ImageFragment};
pub use state::{ClipOperation, ClipShape};

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::cache::{resources_for, ShareGroupResources};
use crate::config::EngineConfig;
use crate::coords::{IRect, Rect, Transform, Vec2, Viewport};
use crate::geom::{Stroker, VertexArray};
use crate::gpu::stencil::{HIGH_BIT, PAYLOAD_MASK};
use crate::gpu::{
    BlendFactor, BlendFunc, CompareFunction, DrawCall, Primitive, RenderContext, StencilFaceOps,
    StencilState, UniformValue,
};
use crate::paint::{Brush, BrushKind, BrushPattern, CompositionMode, Image, Pen, RenderHints};
use crate::shader::{CustomStage, MaskType, OpacityMode, ShaderManager, SrcPixelType, Uniform};

use geometry_cache::GeometryCache;
use matrix::Columns;
use state::PaintState;

bitflags! {
    /// Derived GPU state that no longer matches the paint state.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct Dirty: u8 {
        const MATRIX = 1 << 0;
        const BRUSH_TEXTURE = 1 << 1;
        const BRUSH_UNIFORMS = 1 << 2;
        const COMPOSITION = 1 << 3;
        const OPACITY_UNIFORM = 1 << 4;
        const MATRIX_UNIFORM = 1 << 5;
    }
}

bitflags! {
    /// Warnings already logged once.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    struct Warnings: u8 {
        const PATH_OUT_OF_RANGE = 1 << 0;
        const INACTIVE = 1 << 1;
        const UNBALANCED_RESTORE = 1 << 2;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DrawingMode {
    Brush,
    Image,
    /// Batched textured quads with uniform opacity (color glyphs).
    ImageArrays,
    /// Batched textured quads with per-vertex opacity (image fragments).
    ImageOpacityArrays,
    Text,
}

impl DrawingMode {
    /// Modes whose source pixels come from the current brush.
    #[inline]
    fn uses_brush(self) -> bool {
        matches!(self, DrawingMode::Brush | DrawingMode::Text)
    }
}

/// Counters since the engine was created.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub draw_calls: u64,
    /// Fills and strokes that went through the stencil buffer.
    pub stencil_fills: u64,
    /// Times the clip levels ran out and the stencil was compacted.
    pub clip_compactions: u64,
    /// Draws dropped because of an error.
    pub skipped_draws: u64,
    pub geometry_cache_hits: u64,
}

/// Immediate-mode 2D painter over a [`RenderContext`].
pub struct PaintEngine<C: RenderContext> {
    ctx: C,
    config: EngineConfig,
    resources: Arc<ShareGroupResources>,
    shaders: ShaderManager,

    state: PaintState,
    saved: Vec<PaintState>,
    viewport: Viewport,

    active: bool,
    native_painting: bool,
    needs_sync: bool,
    mode: DrawingMode,
    dirty: Dirty,

    current_brush: Brush,
    composition_blend: BlendFunc,
    snap_to_pixel_grid: bool,
    pmv: Columns,
    inverse_scale: f32,

    stencil: StencilState,
    stencil_enabled: bool,
    max_clip: u8,
    current_scissor: IRect,
    /// Stencil pixels that may hold garbage and must be cleared before a
    /// fill accumulates into them.
    dirty_stencil: Vec<IRect>,
    stencil_clean: bool,
    use_system_clip: bool,
    system_clip: Option<IRect>,

    vertices: VertexArray,
    stroker: Stroker,
    geometry: GeometryCache,
    pattern_images: HashMap<BrushPattern, Image>,

    stats: EngineStats,
    warned: Warnings,
}

const PASS_ALWAYS: StencilState = StencilState::test(CompareFunction::Always, 0, 0xff);

impl<C: RenderContext> PaintEngine<C> {
    pub fn new(ctx: C, config: EngineConfig) -> Self {
        let resources = resources_for(ctx.share_group(), &config);
        let shaders = ShaderManager::new(resources.shaders.clone());
        let viewport = ctx.size();
        log::debug!(
            "paint engine for {}x{} target, share group {:?}",
            viewport.width,
            viewport.height,
            resources.id()
        );

        Self {
            ctx,
            config,
            resources,
            shaders,
            state: PaintState::new(viewport.irect()),
            saved: Vec::new(),
            viewport,
            active: false,
            native_painting: false,
            needs_sync: true,
            mode: DrawingMode::Brush,
            dirty: Dirty::all(),
            current_brush: Brush::none(),
            composition_blend: BlendFunc::SOURCE_OVER,
            snap_to_pixel_grid: false,
            pmv: matrix::device_columns(viewport),
            inverse_scale: 1.0,
            stencil: PASS_ALWAYS,
            stencil_enabled: false,
            max_clip: 1,
            current_scissor: viewport.irect(),
            dirty_stencil: vec![viewport.irect()],
            stencil_clean: true,
            use_system_clip: false,
            system_clip: None,
            vertices: VertexArray::new(),
            stroker: Stroker::new(),
            geometry: GeometryCache::new(),
            pattern_images: HashMap::new(),
            stats: EngineStats::default(),
            warned: Warnings::empty(),
        }
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Starts a frame with a fresh paint state.
    ///
    /// The stencil buffer is treated as garbage until the engine has
    /// cleared it.
    pub fn begin(&mut self) {
        if self.active {
            log::warn!("PaintEngine::begin: already active");
            return;
        }
        self.viewport = self.ctx.size();
        if !self.viewport.is_valid() {
            log::warn!("PaintEngine::begin: target has zero size");
        }
        self.system_clip = self.system_clip.and_then(|r| r.intersect(self.viewport.irect()));

        self.state = PaintState::new(self.viewport.irect());
        self.saved.clear();
        self.active = true;
        self.native_painting = false;
        self.mode = DrawingMode::Brush;
        self.shaders.set_has_complex_geometry(false);
        self.shaders.set_mask_type(MaskType::NoMask);
        self.current_brush = Brush::none();
        self.snap_to_pixel_grid = false;
        self.max_clip = 1;
        self.dirty_stencil = vec![self.viewport.irect()];
        self.stencil_clean = true;
        self.needs_sync = true;
        self.warned = Warnings::empty();

        self.ensure_active();
    }

    /// Finishes the frame and submits everything recorded since `begin`.
    pub fn end(&mut self) -> Result<(), RenderError> {
        if !self.active {
            return Ok(());
        }
        self.transfer_mode(DrawingMode::Brush);
        self.active = false;
        self.native_painting = false;
        self.ctx.reset_state();

        let swept = self.geometry.sweep();
        if swept > 0 {
            log::trace!("dropped geometry of {swept} released paths");
        }
        self.ctx.flush()?;
        Ok(())
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Re-establishes every piece of GPU state the engine relies on if
    /// something else may have used the context since the last draw.
    pub fn ensure_active(&mut self) {
        if !self.active || !self.needs_sync {
            return;
        }
        if self.native_painting {
            log::debug!("painting while native painting is active; resuming engine state");
            self.native_painting = false;
        }
        self.needs_sync = false;

        self.transfer_mode(DrawingMode::Brush);
        self.ctx.reset_state();
        self.ctx.set_color_write(true);
        self.shaders.invalidate();
        self.stencil = PASS_ALWAYS;
        self.stencil_enabled = false;
        self.dirty = Dirty::all();

        self.regenerate_clip();
    }

    /// Hands the context to foreign GPU code until
    /// [`end_native_painting`](Self::end_native_painting).
    pub fn begin_native_painting(&mut self) {
        if !self.check_active("begin_native_painting") {
            return;
        }
        self.ensure_active();
        self.transfer_mode(DrawingMode::Brush);
        self.ctx.reset_state();
        self.shaders.invalidate();
        self.native_painting = true;
        self.needs_sync = true;
    }

    pub fn end_native_painting(&mut self) {
        self.native_painting = false;
        self.invalidate_state();
    }

    #[inline]
    pub fn is_native_painting(&self) -> bool {
        self.native_painting
    }

    /// Declares that GPU state was changed behind the engine's back. The
    /// next draw resynchronizes, clearing the stencil where needed.
    pub fn invalidate_state(&mut self) {
        self.needs_sync = true;
        self.dirty_stencil = vec![self.viewport.irect()];
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn context(&self) -> &C {
        &self.ctx
    }

    /// Direct access to the context. Call
    /// [`invalidate_state`](Self::invalidate_state) afterwards if you
    /// changed its state while the engine is active.
    #[inline]
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn into_context(self) -> C {
        self.ctx
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.state.transform
    }

    #[inline]
    pub fn brush(&self) -> &Brush {
        &self.state.brush
    }

    #[inline]
    pub fn pen(&self) -> &Pen {
        &self.state.pen
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.state.opacity
    }

    #[inline]
    pub fn composition_mode(&self) -> CompositionMode {
        self.state.composition_mode
    }

    #[inline]
    pub fn render_hints(&self) -> RenderHints {
        self.state.render_hints
    }

    /// Device rectangle every draw is confined to by the clip.
    pub fn clip_bounds(&self) -> IRect {
        self.current_scissor
    }

    // ── state ─────────────────────────────────────────────────────────────

    pub fn save(&mut self) {
        let child = self.state.saved();
        self.saved.push(std::mem::replace(&mut self.state, child));
    }

    /// Pops the state pushed by the matching [`save`](Self::save) and
    /// re-applies whatever the popped state changed.
    pub fn restore(&mut self) {
        let Some(parent) = self.saved.pop() else {
            if !self.warned.contains(Warnings::UNBALANCED_RESTORE) {
                log::warn!("PaintEngine::restore without matching save");
                self.warned.insert(Warnings::UNBALANCED_RESTORE);
            }
            return;
        };
        let popped = std::mem::replace(&mut self.state, parent);

        if popped.render_hints_changed {
            self.dirty |= Dirty::BRUSH_TEXTURE;
        }
        if popped.matrix_changed {
            self.dirty |= Dirty::MATRIX;
        }
        if popped.composition_changed {
            self.dirty |= Dirty::COMPOSITION;
        }
        if popped.opacity_changed {
            self.dirty |= Dirty::OPACITY_UNIFORM | Dirty::BRUSH_UNIFORMS;
        }
        if popped.clip_changed && self.active && !self.needs_sync {
            if popped.can_restore_clip {
                self.update_clip_scissor_test();
            } else {
                self.regenerate_clip();
            }
        }
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.state.transform = transform;
        self.state.matrix_changed = true;
        self.dirty |= Dirty::MATRIX;
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.state.brush = brush;
    }

    pub fn set_pen(&mut self, pen: Pen) {
        self.state.pen = pen;
    }

    pub fn set_brush_origin(&mut self, origin: Vec2) {
        self.state.brush_origin = origin;
        self.dirty |= Dirty::BRUSH_UNIFORMS;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        let opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 1.0 };
        self.state.opacity = opacity;
        self.state.opacity_changed = true;
        self.dirty |= Dirty::OPACITY_UNIFORM | Dirty::BRUSH_UNIFORMS;
    }

    pub fn set_composition_mode(&mut self, mode: CompositionMode) {
        if self.state.composition_mode == mode {
            return;
        }
        self.state.composition_mode = mode;
        self.state.composition_changed = true;
        self.dirty |= Dirty::COMPOSITION;
    }

    pub fn set_render_hints(&mut self, hints: RenderHints) {
        self.state.render_hints = hints;
        self.state.render_hints_changed = true;
        self.dirty |= Dirty::BRUSH_TEXTURE;
    }

    /// Restricts all painting to `clip` (device pixels) on top of any user
    /// clip. `None` removes the restriction.
    pub fn set_system_clip(&mut self, clip: Option<IRect>) {
        self.system_clip = clip.map(|r| r.intersect(self.viewport.irect()).unwrap_or_default());
        if self.active && !self.needs_sync {
            self.regenerate_clip();
        }
    }

    /// Custom fragment stage used for [`SrcPixelType::Custom`] draws.
    pub fn set_custom_shader_stage(&mut self, stage: Option<Arc<CustomStage>>) {
        self.shaders.set_custom_stage(stage);
    }

    // ── draw plumbing ─────────────────────────────────────────────────────

    fn check_active(&mut self, op: &str) -> bool {
        if self.active {
            return true;
        }
        if !self.warned.contains(Warnings::INACTIVE) {
            log::warn!("PaintEngine::{op} called outside begin/end");
            self.warned.insert(Warnings::INACTIVE);
        }
        false
    }

    /// Runs one public draw operation, converting its failure into a log
    /// line and a skipped-draw count.
    fn run(&mut self, op: &'static str, draw: impl FnOnce(&mut Self) -> Result<(), RenderError>) {
        if !self.check_active(op) {
            return;
        }
        self.ensure_active();
        if let Err(err) = draw(self) {
            self.stats.skipped_draws += 1;
            if err.is_contract_violation() {
                log::error!("PaintEngine::{op}: {err}");
            } else if matches!(err, RenderError::GeometryTooLarge) {
                // Already warned once per engine.
                log::debug!("PaintEngine::{op}: {err}");
            } else {
                log::warn!("PaintEngine::{op}: {err}");
            }
            self.recover();
        }
    }

    /// Puts the fixed-function state back after a sequence bailed out
    /// halfway.
    fn recover(&mut self) {
        self.ctx.set_color_write(true);
        self.stencil.write_mask = 0;
        self.update_clip_scissor_test();
        self.shaders.invalidate();
        self.dirty |= Dirty::BRUSH_UNIFORMS | Dirty::OPACITY_UNIFORM | Dirty::MATRIX_UNIFORM;
    }

    fn transfer_mode(&mut self, mode: DrawingMode) {
        if self.mode == mode {
            return;
        }
        self.shaders.set_has_complex_geometry(mode == DrawingMode::Text);
        if mode != DrawingMode::Text {
            self.shaders.set_mask_type(MaskType::NoMask);
        }
        if !mode.uses_brush() {
            // Image modes take over the source type and the brush unit.
            self.current_brush = Brush::none();
        }
        self.mode = mode;
    }

    fn set_current_brush(&mut self, brush: &Brush) {
        if self.current_brush.fast_eq(brush) {
            return;
        }
        self.current_brush = brush.clone();
        self.dirty |= Dirty::BRUSH_UNIFORMS;
        if brush.needs_texture() {
            self.dirty |= Dirty::BRUSH_TEXTURE;
        }
        if let Some(src) = SrcPixelType::from_brush(&brush.kind) {
            self.shaders.set_src_pixel_type(src);
        }
    }

    fn set_snap_to_pixel_grid(&mut self, snap: bool) {
        if self.snap_to_pixel_grid != snap {
            self.snap_to_pixel_grid = snap;
            self.dirty |= Dirty::MATRIX;
        }
    }

    fn update_matrix(&mut self) {
        self.pmv = matrix::projection_columns(&self.state.transform, self.viewport, self.snap_to_pixel_grid);
        self.inverse_scale = matrix::inverse_scale(&self.state.transform);
        self.ctx.set_transform_columns(self.pmv);
        self.dirty.remove(Dirty::MATRIX);
        self.dirty |= Dirty::MATRIX_UNIFORM | Dirty::BRUSH_UNIFORMS;
    }

    fn update_composition_mode(&mut self) {
        let mode = self.state.composition_mode;
        self.shaders.set_composition_mode(mode);
        self.composition_blend = composition_blend(mode);
        self.dirty.remove(Dirty::COMPOSITION);
    }

    /// Brings program, uniforms, textures and blend state in line with the
    /// paint state. Returns whether the program changed.
    fn prepare_for_draw(&mut self, src_pixels_opaque: bool) -> Result<bool, RenderError> {
        if self.dirty.contains(Dirty::BRUSH_TEXTURE) && self.mode.uses_brush() {
            self.update_brush_texture()?;
        }
        if self.dirty.contains(Dirty::COMPOSITION) {
            self.update_composition_mode();
        }
        if self.dirty.contains(Dirty::MATRIX) {
            self.update_matrix();
        }

        let composition = self.state.composition_mode;
        let has_opacity = self.state.opacity < 0.99;
        let blend_off = composition == CompositionMode::Source
            || (composition == CompositionMode::SourceOver && src_pixels_opaque && !has_opacity);
        self.ctx.set_blend(if blend_off { None } else { Some(self.composition_blend) });

        let opacity_mode = if self.mode == DrawingMode::ImageOpacityArrays {
            OpacityMode::AttributeOpacity
        } else if !has_opacity {
            OpacityMode::NoOpacity
        } else if self.mode.uses_brush()
            && matches!(self.current_brush.kind, BrushKind::Solid(_) | BrushKind::Pattern { .. })
        {
            // Folded into the brush color.
            OpacityMode::NoOpacity
        } else {
            OpacityMode::UniformOpacity
        };
        self.shaders.set_opacity_mode(opacity_mode);
        self.shaders.set_affine_brush_transform(
            self.current_brush.transform.is_affine() && self.state.transform.is_affine(),
        );

        let changed = self.shaders.use_correct_program(&mut self.ctx)?;
        if changed {
            self.dirty |= Dirty::BRUSH_UNIFORMS | Dirty::OPACITY_UNIFORM | Dirty::MATRIX_UNIFORM;
        }

        if self.dirty.contains(Dirty::BRUSH_UNIFORMS) && self.mode.uses_brush() {
            self.update_brush_uniforms();
        }
        if opacity_mode == OpacityMode::UniformOpacity && self.dirty.contains(Dirty::OPACITY_UNIFORM) {
            self.set_uniform(Uniform::GlobalOpacity, UniformValue::Float(self.state.opacity));
            self.dirty.remove(Dirty::OPACITY_UNIFORM);
        }
        if self.dirty.contains(Dirty::MATRIX_UNIFORM) && self.shaders.has_complex_geometry() {
            self.set_uniform(Uniform::Matrix, UniformValue::Mat3(self.pmv));
            self.dirty.remove(Dirty::MATRIX_UNIFORM);
        }

        if !composition.is_native() {
            self.ctx.snapshot_background();
        }
        Ok(changed)
    }

    /// Binds the stencil-only program, updating the matrix first if needed.
    fn use_simple_shader(&mut self) -> Result<(), RenderError> {
        if self.shaders.use_simple_program(&mut self.ctx)? {
            self.dirty |= Dirty::BRUSH_UNIFORMS | Dirty::OPACITY_UNIFORM | Dirty::MATRIX_UNIFORM;
        }
        if self.dirty.contains(Dirty::MATRIX) {
            self.update_matrix();
        }
        Ok(())
    }

    fn set_uniform(&mut self, uniform: Uniform, value: UniformValue) {
        let Some(program) = self.shaders.current_program() else {
            return;
        };
        if let Some(location) = program.location(&self.ctx, uniform) {
            self.ctx.set_uniform(location, value);
        }
    }

    fn draw_arrays(&mut self, primitive: Primitive, positions: &[Vec2]) {
        if positions.is_empty() {
            return;
        }
        self.ctx.draw(&DrawCall::new(primitive, positions));
        self.stats.draw_calls += 1;
    }

    fn draw_fans(&mut self, vertices: &VertexArray) {
        for fan in vertices.fans() {
            if fan.len() >= 3 {
                self.ctx.draw(&DrawCall::new(Primitive::TriangleFan, fan));
                self.stats.draw_calls += 1;
            }
        }
    }

    /// Draws `rect` as a quad in the current coordinate system.
    fn composite(&mut self, rect: Rect) {
        let [a, b, c, d] = rect.corners();
        self.draw_arrays(Primitive::TriangleFan, &[a, b, c, d]);
    }

    // ── stencil shadow ────────────────────────────────────────────────────

    fn flush_stencil(&mut self) {
        self.ctx.set_stencil(self.stencil_enabled.then_some(self.stencil));
    }

    fn enable_stencil(&mut self, enabled: bool) {
        self.stencil_enabled = enabled;
        self.flush_stencil();
    }

    fn stencil_func(&mut self, compare: CompareFunction, reference: u8, read_mask: u8) {
        self.stencil.compare = compare;
        self.stencil.reference = reference;
        self.stencil.read_mask = read_mask;
        self.flush_stencil();
    }

    fn stencil_ops(&mut self, front: StencilFaceOps, back: StencilFaceOps) {
        self.stencil.front = front;
        self.stencil.back = back;
        self.flush_stencil();
    }

    fn stencil_mask(&mut self, mask: u8) {
        self.stencil.write_mask = mask;
        self.flush_stencil();
    }
}

/// Blend state for `mode`. Shader-side modes blend source-over after the
/// fragment stage has mixed in the background.
fn composition_blend(mode: CompositionMode) -> BlendFunc {
    use BlendFactor as F;
    use CompositionMode as M;
    let (src, dst) = match mode {
        M::SourceOver => (F::One, F::OneMinusSrcAlpha),
        M::DestinationOver => (F::OneMinusDstAlpha, F::One),
        M::Clear => (F::Zero, F::Zero),
        M::Source => (F::One, F::Zero),
        M::Destination => (F::Zero, F::One),
        M::SourceIn => (F::DstAlpha, F::Zero),
        M::DestinationIn => (F::Zero, F::SrcAlpha),
        M::SourceOut => (F::OneMinusDstAlpha, F::Zero),
        M::DestinationOut => (F::Zero, F::OneMinusSrcAlpha),
        M::SourceAtop => (F::DstAlpha, F::OneMinusSrcAlpha),
        M::DestinationAtop => (F::OneMinusDstAlpha, F::SrcAlpha),
        M::Xor => (F::OneMinusDstAlpha, F::OneMinusSrcAlpha),
        M::Plus => (F::One, F::One),
        _ => return BlendFunc::SOURCE_OVER,
    };
    BlendFunc::new(src, dst)
}

const _: () = assert!(HIGH_BIT & PAYLOAD_MASK == 0);
