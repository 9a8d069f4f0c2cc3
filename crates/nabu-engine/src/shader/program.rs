use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::gpu::{OwnedProgram, ProgramId, RenderContext, UniformLocation};

use super::key::ShaderVariantKey;

/// Logical uniforms of the shared uniform block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Uniform {
    FragmentColor,
    PatternColor,
    LinearData,
    GlobalOpacity,
    BRadius,
    Angle,
    Fmp,
    Fmp2MRadius2,
    Inverse2Fmp2MRadius2,
    HalfViewportSize,
    InvertedTextureSize,
    SqrFr,
    BrushTransform,
    Matrix,
}

impl Uniform {
    pub fn name(self) -> &'static str {
        match self {
            Uniform::FragmentColor => "fragment_color",
            Uniform::PatternColor => "pattern_color",
            Uniform::LinearData => "linear_data",
            Uniform::GlobalOpacity => "global_opacity",
            Uniform::BRadius => "b_radius",
            Uniform::Angle => "angle",
            Uniform::Fmp => "fmp",
            Uniform::Fmp2MRadius2 => "fmp2_m_radius2",
            Uniform::Inverse2Fmp2MRadius2 => "inverse_2_fmp2_m_radius2",
            Uniform::HalfViewportSize => "half_viewport_size",
            Uniform::InvertedTextureSize => "inverted_texture_size",
            Uniform::SqrFr => "sqr_fr",
            Uniform::BrushTransform => "brush_transform",
            Uniform::Matrix => "pmv_matrix",
        }
    }
}

/// A linked program plus its lazily resolved uniform locations.
///
/// Shared between every engine of a share group. The GPU object belongs to
/// the repository that built it; once the repository evicts it,
/// [`is_live`](Self::is_live) turns false and holders must fetch a fresh one.
#[derive(Debug)]
pub struct CompiledProgram {
    key: ShaderVariantKey,
    id: ProgramId,
    handle: Mutex<Option<OwnedProgram>>,
    locations: Mutex<HashMap<Uniform, Option<UniformLocation>>>,
}

impl CompiledProgram {
    pub(crate) fn new(key: ShaderVariantKey, program: OwnedProgram) -> Self {
        Self {
            key,
            id: program.id(),
            handle: Mutex::new(Some(program)),
            locations: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    #[inline]
    pub fn key(&self) -> &ShaderVariantKey {
        &self.key
    }

    pub fn is_live(&self) -> bool {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Location of `uniform`, queried from the context on first use.
    pub fn location(&self, ctx: &dyn RenderContext, uniform: Uniform) -> Option<UniformLocation> {
        let mut locations = self.locations.lock().unwrap_or_else(PoisonError::into_inner);
        *locations
            .entry(uniform)
            .or_insert_with(|| ctx.uniform_location(self.id, uniform.name()))
    }

    pub(crate) fn release(&self, ctx: &mut dyn RenderContext) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(program) = handle {
            program.release(ctx);
        }
    }
}
