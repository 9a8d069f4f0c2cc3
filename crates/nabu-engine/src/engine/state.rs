use crate::coords::{IRect, Rect, Transform, Vec2};
use crate::geom::VectorPath;
use crate::paint::{Brush, CompositionMode, Pen, RenderHints};

/// How a new clip combines with the current one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ClipOperation {
    /// Drop every clip but the system clip.
    NoClip,
    /// Start over from the system clip, then intersect.
    ReplaceClip,
    IntersectClip,
}

#[derive(Debug, Clone)]
pub enum ClipShape {
    Path(VectorPath),
    Rect(Rect),
}

/// One recorded clip call, replayed when the stencil has to be rebuilt.
#[derive(Debug, Clone)]
pub(crate) struct ClipRecord {
    pub transform: Transform,
    pub shape: ClipShape,
    pub op: ClipOperation,
}

/// Everything `save` pushes and `restore` pops.
#[derive(Debug, Clone)]
pub(crate) struct PaintState {
    pub transform: Transform,
    pub brush_origin: Vec2,
    pub pen: Pen,
    pub brush: Brush,
    pub opacity: f32,
    pub composition_mode: CompositionMode,
    pub render_hints: RenderHints,

    /// Clipping requested through the public API.
    pub clip_enabled: bool,
    /// Draws must test the stencil against `current_clip`.
    pub clip_test_enabled: bool,
    pub current_clip: u8,
    /// Scissor part of the clip, in device pixels.
    pub rectangle_clip: IRect,
    /// The stencil still holds this state's clip after a nested state is
    /// popped, so restoring only needs a scissor update.
    pub can_restore_clip: bool,
    pub needs_clip_buffer_clear: bool,
    pub clip_history: Vec<ClipRecord>,

    // Set on a state pushed by `save` when the matching setting changes, so
    // `restore` knows what to re-apply.
    pub render_hints_changed: bool,
    pub matrix_changed: bool,
    pub composition_changed: bool,
    pub opacity_changed: bool,
    pub clip_changed: bool,
}

impl PaintState {
    pub fn new(viewport: IRect) -> Self {
        Self {
            transform: Transform::identity(),
            brush_origin: Vec2::zero(),
            pen: Pen::default(),
            brush: Brush::none(),
            opacity: 1.0,
            composition_mode: CompositionMode::SourceOver,
            render_hints: RenderHints::default(),
            clip_enabled: false,
            clip_test_enabled: false,
            current_clip: 1,
            rectangle_clip: viewport,
            can_restore_clip: true,
            needs_clip_buffer_clear: true,
            clip_history: Vec::new(),
            render_hints_changed: false,
            matrix_changed: false,
            composition_changed: false,
            opacity_changed: false,
            clip_changed: false,
        }
    }

    /// Copy for `save`; nothing has changed relative to the parent yet.
    pub fn saved(&self) -> Self {
        Self {
            render_hints_changed: false,
            matrix_changed: false,
            composition_changed: false,
            opacity_changed: false,
            clip_changed: false,
            ..self.clone()
        }
    }

    /// A user clip is in effect.
    pub fn has_clipping(&self) -> bool {
        self.clip_enabled && self.clip_history.last().is_some_and(|r| r.op != ClipOperation::NoClip)
    }
}
