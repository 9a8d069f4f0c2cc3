use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::gpu::RenderContext;
use crate::paint::{BrushKind, CompositionMode};

use super::key::{CustomStage, ShaderVariantKey};
use super::program::CompiledProgram;
use super::repository::ShaderRepository;
use super::snippets::SnippetName;

/// Where fragment colors come from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SrcPixelType {
    Solid,
    Pattern,
    LinearGradient,
    RadialGradient,
    ConicalGradient,
    TextureBrush,
    /// Alpha-only texture brush tinted with the pattern color.
    AlphaTextureBrush,
    Image,
    NonPremultipliedImage,
    /// Alpha-only image tinted with the pattern color.
    AlphaImage,
    Custom,
}

impl SrcPixelType {
    const COUNT: usize = 11;

    /// `None` for [`BrushKind::None`], which has nothing to draw.
    pub fn from_brush(kind: &BrushKind) -> Option<Self> {
        use crate::paint::GradientKind;
        Some(match kind {
            BrushKind::None => return None,
            BrushKind::Solid(_) => SrcPixelType::Solid,
            BrushKind::Pattern { .. } => SrcPixelType::Pattern,
            BrushKind::Gradient(g) => match g.kind {
                GradientKind::Linear { .. } => SrcPixelType::LinearGradient,
                GradientKind::Radial { .. } => SrcPixelType::RadialGradient,
                GradientKind::Conical { .. } => SrcPixelType::ConicalGradient,
            },
            BrushKind::Texture { image, .. } if image.is_alpha_mask() => SrcPixelType::AlphaTextureBrush,
            BrushKind::Texture { .. } => SrcPixelType::TextureBrush,
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum OpacityMode {
    #[default]
    NoOpacity,
    UniformOpacity,
    /// Per-vertex opacity (image fragment batches).
    AttributeOpacity,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum MaskType {
    #[default]
    NoMask,
    PixelMask,
    SubPixelMaskPass1,
    SubPixelMaskPass2,
}

#[derive(Debug, Clone, Error)]
pub enum SelectError {
    #[error("no source pixel type selected")]
    NoSource,
    #[error("custom source selected without a custom stage")]
    MissingCustomStage,
    #[error("shader program `{0}` is unavailable")]
    Unavailable(String),
}

// ── selection tables ──────────────────────────────────────────────────────

use SnippetName as S;

/// Indexed by `SrcPixelType as usize`.
const SRC_PIXEL: [SnippetName; SrcPixelType::COUNT] = [
    S::SolidBrushSrcFragment,
    S::PatternBrushSrcFragment,
    S::LinearGradientBrushSrcFragment,
    S::RadialGradientBrushSrcFragment,
    S::ConicalGradientBrushSrcFragment,
    S::TextureBrushSrcFragment,
    S::AlphaTextureBrushSrcFragment,
    S::ImageSrcFragment,
    S::NonPremultipliedImageSrcFragment,
    S::AlphaImageSrcFragment,
    S::CustomImageSrcFragment,
];

/// `[projective, affine]` per `SrcPixelType`.
const POSITION_VERTEX: [[SnippetName; 2]; SrcPixelType::COUNT] = [
    [S::PositionOnlyVertex, S::PositionOnlyVertex],
    [S::PositionWithPatternBrushVertex, S::AffinePositionWithPatternBrushVertex],
    [S::PositionWithLinearGradientBrushVertex, S::AffinePositionWithLinearGradientBrushVertex],
    [S::PositionWithRadialGradientBrushVertex, S::AffinePositionWithRadialGradientBrushVertex],
    [S::PositionWithConicalGradientBrushVertex, S::AffinePositionWithConicalGradientBrushVertex],
    [S::PositionWithTextureBrushVertex, S::AffinePositionWithTextureBrushVertex],
    [S::PositionWithTextureBrushVertex, S::AffinePositionWithTextureBrushVertex],
    [S::PositionOnlyVertex, S::PositionOnlyVertex],
    [S::PositionOnlyVertex, S::PositionOnlyVertex],
    [S::PositionOnlyVertex, S::PositionOnlyVertex],
    [S::PositionOnlyVertex, S::PositionOnlyVertex],
];

/// Source types that read per-vertex texture coordinates.
const NEEDS_TEX_COORDS: [bool; SrcPixelType::COUNT] =
    [false, false, false, false, false, false, false, true, true, true, true];

/// Indexed by `composition << 2 | mask << 1 | opacity`.
const MAIN_FRAGMENT: [SnippetName; 8] = [
    S::MainFragment,
    S::MainFragmentO,
    S::MainFragmentM,
    S::MainFragmentMO,
    S::MainFragmentC,
    S::MainFragmentCO,
    S::MainFragmentCM,
    S::MainFragmentCMO,
];

/// Indexed by `MaskType as usize`.
const MASK: [Option<SnippetName>; 4] =
    [None, Some(S::MaskFragment), Some(S::RgbMaskFragmentPass1), Some(S::RgbMaskFragmentPass2)];

/// Shader-composited modes, from [`CompositionMode::Multiply`] on.
const COMPOSITION: [SnippetName; 11] = [
    S::MultiplyCompositionFragment,
    S::ScreenCompositionFragment,
    S::OverlayCompositionFragment,
    S::DarkenCompositionFragment,
    S::LightenCompositionFragment,
    S::ColorDodgeCompositionFragment,
    S::ColorBurnCompositionFragment,
    S::HardLightCompositionFragment,
    S::SoftLightCompositionFragment,
    S::DifferenceCompositionFragment,
    S::ExclusionCompositionFragment,
];

fn composition_snippet(mode: CompositionMode) -> Option<SnippetName> {
    if mode.is_native() {
        return None;
    }
    COMPOSITION.get(mode as usize - CompositionMode::Multiply as usize).copied()
}

// ── manager ───────────────────────────────────────────────────────────────

/// Tracks the state axes that pick a shader variant and keeps the matching
/// program current.
///
/// Setters only mark the selection dirty when the variant can actually
/// change; switching between two blend-unit composition modes, for example,
/// never touches the program.
pub struct ShaderManager {
    repository: Arc<Mutex<ShaderRepository>>,

    src_pixel: Option<SrcPixelType>,
    opacity_mode: OpacityMode,
    mask_type: MaskType,
    composition_mode: CompositionMode,
    affine_brush: bool,
    complex_geometry: bool,
    custom_stage: Option<Arc<CustomStage>>,

    dirty: bool,
    current: Option<Arc<CompiledProgram>>,
}

impl ShaderManager {
    pub fn new(repository: Arc<Mutex<ShaderRepository>>) -> Self {
        Self {
            repository,
            src_pixel: None,
            opacity_mode: OpacityMode::NoOpacity,
            mask_type: MaskType::NoMask,
            composition_mode: CompositionMode::SourceOver,
            affine_brush: true,
            complex_geometry: false,
            custom_stage: None,
            dirty: true,
            current: None,
        }
    }

    pub fn set_src_pixel_type(&mut self, src: SrcPixelType) {
        if self.src_pixel != Some(src) {
            self.src_pixel = Some(src);
            self.dirty = true;
        }
    }

    pub fn set_opacity_mode(&mut self, mode: OpacityMode) {
        if self.opacity_mode != mode {
            self.opacity_mode = mode;
            self.dirty = true;
        }
    }

    pub fn set_mask_type(&mut self, mask: MaskType) {
        if self.mask_type != mask {
            self.mask_type = mask;
            self.dirty = true;
        }
    }

    pub fn set_composition_mode(&mut self, mode: CompositionMode) {
        if self.composition_mode == mode {
            return;
        }
        let was_shader = !self.composition_mode.is_native();
        self.composition_mode = mode;
        self.dirty |= was_shader || !mode.is_native();
    }

    pub fn set_affine_brush_transform(&mut self, affine: bool) {
        if self.affine_brush != affine {
            self.affine_brush = affine;
            self.dirty = true;
        }
    }

    pub fn set_has_complex_geometry(&mut self, complex: bool) {
        if self.complex_geometry != complex {
            self.complex_geometry = complex;
            self.dirty = true;
        }
    }

    pub fn set_custom_stage(&mut self, stage: Option<Arc<CustomStage>>) {
        if self.custom_stage != stage {
            self.custom_stage = stage;
            self.dirty = true;
        }
    }

    #[inline]
    pub fn opacity_mode(&self) -> OpacityMode {
        self.opacity_mode
    }

    #[inline]
    pub fn mask_type(&self) -> MaskType {
        self.mask_type
    }

    #[inline]
    pub fn has_complex_geometry(&self) -> bool {
        self.complex_geometry
    }

    #[inline]
    pub fn custom_stage(&self) -> Option<&Arc<CustomStage>> {
        self.custom_stage.as_ref()
    }

    #[inline]
    pub fn current_program(&self) -> Option<&Arc<CompiledProgram>> {
        self.current.as_ref()
    }

    /// Forces the next [`use_correct_program`](Self::use_correct_program)
    /// to re-select and rebind.
    pub fn invalidate(&mut self) {
        self.dirty = true;
        self.current = None;
    }

    /// Variant for the current axes.
    pub fn required_key(&self) -> Result<ShaderVariantKey, SelectError> {
        let src = self.src_pixel.ok_or(SelectError::NoSource)?;
        let idx = src as usize;

        let custom_stage = match src {
            SrcPixelType::Custom => Some(self.custom_stage.clone().ok_or(SelectError::MissingCustomStage)?),
            _ => None,
        };

        let mut position_vertex = POSITION_VERTEX[idx][self.affine_brush as usize];
        if self.complex_geometry && position_vertex == S::PositionOnlyVertex {
            position_vertex = S::ComplexGeometryPositionOnlyVertex;
        }

        let attribute_opacity = self.opacity_mode == OpacityMode::AttributeOpacity;
        let (mask, composition) = if attribute_opacity {
            debug_assert!(self.mask_type == MaskType::NoMask, "masked image fragments");
            (None, None)
        } else {
            (MASK[self.mask_type as usize], composition_snippet(self.composition_mode))
        };

        let main_fragment = if attribute_opacity {
            S::MainFragmentImageArrays
        } else {
            let uniform_opacity = self.opacity_mode == OpacityMode::UniformOpacity;
            let index = (composition.is_some() as usize) << 2
                | (mask.is_some() as usize) << 1
                | uniform_opacity as usize;
            MAIN_FRAGMENT[index]
        };

        let main_vertex = if attribute_opacity {
            S::MainWithTexCoordsAndOpacityVertex
        } else if NEEDS_TEX_COORDS[idx] || mask.is_some() {
            S::MainWithTexCoordsVertex
        } else {
            S::MainVertex
        };

        Ok(ShaderVariantKey {
            main_vertex,
            position_vertex,
            main_fragment,
            src_pixel: SRC_PIXEL[idx],
            mask,
            composition,
            custom_stage,
        })
    }

    /// Makes the program for the current axes current.
    ///
    /// Returns whether the bound program changed, in which case every
    /// uniform must be uploaded again.
    pub fn use_correct_program(&mut self, ctx: &mut dyn RenderContext) -> Result<bool, SelectError> {
        let live = self.current.as_ref().is_some_and(|p| p.is_live());
        if !self.dirty && live {
            return Ok(false);
        }
        let key = self.required_key()?;
        self.bind(ctx, &key)
    }

    /// Program for stencil writes. The next `use_correct_program` re-selects.
    pub fn use_simple_program(&mut self, ctx: &mut dyn RenderContext) -> Result<bool, SelectError> {
        let changed = self.bind(ctx, &ShaderVariantKey::simple())?;
        self.dirty = true;
        Ok(changed)
    }

    fn bind(&mut self, ctx: &mut dyn RenderContext, key: &ShaderVariantKey) -> Result<bool, SelectError> {
        let program = self
            .repository
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_program(ctx, key)
            .ok_or_else(|| SelectError::Unavailable(key.label()))?;

        self.dirty = false;
        let changed = self.current.as_ref().is_none_or(|c| c.id() != program.id());
        if changed {
            ctx.use_program(program.id());
        }
        self.current = Some(program);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::RecordingContext;
    use crate::paint::{Color, Gradient, Image, ImageFormat};
    use crate::coords::Vec2;

    fn manager() -> ShaderManager {
        ShaderManager::new(Arc::new(Mutex::new(ShaderRepository::new(30))))
    }

    // ── key selection ─────────────────────────────────────────────────────

    #[test]
    fn brushes_map_to_source_types() {
        assert_eq!(SrcPixelType::from_brush(&BrushKind::None), None);
        assert_eq!(SrcPixelType::from_brush(&BrushKind::Solid(Color::BLACK)), Some(SrcPixelType::Solid));
        let g = Gradient::radial(Vec2::zero(), 4.0, Vec::new());
        assert_eq!(
            SrcPixelType::from_brush(&BrushKind::Gradient(g)),
            Some(SrcPixelType::RadialGradient)
        );
        let mask = Image::new(1, 1, ImageFormat::Alpha8, vec![255]).unwrap();
        assert_eq!(
            SrcPixelType::from_brush(&BrushKind::Texture { image: mask, color: Color::BLACK }),
            Some(SrcPixelType::AlphaTextureBrush)
        );
    }

    #[test]
    fn gradient_picks_projective_or_affine_position() {
        let mut m = manager();
        m.set_src_pixel_type(SrcPixelType::LinearGradient);
        let key = m.required_key().unwrap();
        assert_eq!(key.position_vertex, S::AffinePositionWithLinearGradientBrushVertex);
        assert_eq!(key.main_vertex, S::MainVertex);
        assert_eq!(key.main_fragment, S::MainFragment);

        m.set_affine_brush_transform(false);
        let key = m.required_key().unwrap();
        assert_eq!(key.position_vertex, S::PositionWithLinearGradientBrushVertex);
    }

    #[test]
    fn main_fragment_follows_axes() {
        let mut m = manager();
        m.set_src_pixel_type(SrcPixelType::Solid);
        m.set_opacity_mode(OpacityMode::UniformOpacity);
        m.set_mask_type(MaskType::PixelMask);
        m.set_composition_mode(CompositionMode::Multiply);
        let key = m.required_key().unwrap();
        assert_eq!(key.main_fragment, S::MainFragmentCMO);
        assert_eq!(key.composition, Some(S::MultiplyCompositionFragment));
        assert_eq!(key.mask, Some(S::MaskFragment));
        assert_eq!(key.main_vertex, S::MainWithTexCoordsVertex);

        m.set_composition_mode(CompositionMode::SourceOver);
        assert_eq!(m.required_key().unwrap().main_fragment, S::MainFragmentMO);
    }

    #[test]
    fn attribute_opacity_uses_image_arrays() {
        let mut m = manager();
        m.set_src_pixel_type(SrcPixelType::Image);
        m.set_opacity_mode(OpacityMode::AttributeOpacity);
        let key = m.required_key().unwrap();
        assert_eq!(key.main_fragment, S::MainFragmentImageArrays);
        assert_eq!(key.main_vertex, S::MainWithTexCoordsAndOpacityVertex);
    }

    #[test]
    fn complex_geometry_only_replaces_plain_positions() {
        let mut m = manager();
        m.set_has_complex_geometry(true);
        m.set_src_pixel_type(SrcPixelType::Solid);
        assert_eq!(m.required_key().unwrap().position_vertex, S::ComplexGeometryPositionOnlyVertex);
        m.set_src_pixel_type(SrcPixelType::Pattern);
        assert_eq!(m.required_key().unwrap().position_vertex, S::AffinePositionWithPatternBrushVertex);
    }

    #[test]
    fn custom_source_needs_a_stage() {
        let mut m = manager();
        m.set_src_pixel_type(SrcPixelType::Custom);
        assert!(matches!(m.required_key(), Err(SelectError::MissingCustomStage)));
        m.set_custom_stage(Some(Arc::new(CustomStage::new("c", "fn custom_src_pixel(t: vec2<f32>) -> vec4<f32> { return vec4<f32>(1.0); }"))));
        assert!(m.required_key().unwrap().custom_stage.is_some());
    }

    // ── program binding ───────────────────────────────────────────────────

    #[test]
    fn native_composition_changes_keep_the_program() {
        let mut ctx = RecordingContext::new(1, 1);
        let mut m = manager();
        m.set_src_pixel_type(SrcPixelType::Solid);
        assert!(m.use_correct_program(&mut ctx).unwrap());

        m.set_composition_mode(CompositionMode::Source);
        m.set_composition_mode(CompositionMode::DestinationOut);
        assert!(!m.use_correct_program(&mut ctx).unwrap());
        assert_eq!(ctx.programs_created(), 1);

        m.set_composition_mode(CompositionMode::Screen);
        assert!(m.use_correct_program(&mut ctx).unwrap());
        assert_eq!(ctx.programs_created(), 2);
    }

    #[test]
    fn simple_program_forces_reselection() {
        let mut ctx = RecordingContext::new(1, 1);
        let mut m = manager();
        m.set_src_pixel_type(SrcPixelType::Solid);
        m.use_correct_program(&mut ctx).unwrap();
        assert!(m.use_simple_program(&mut ctx).unwrap());
        assert!(m.use_correct_program(&mut ctx).unwrap());
        assert_eq!(ctx.programs_created(), 2);
    }

    #[test]
    fn unavailable_program_is_an_error() {
        let mut ctx = RecordingContext::new(1, 1);
        ctx.fail_programs_containing("u.fragment_color");
        let mut m = manager();
        m.set_src_pixel_type(SrcPixelType::Solid);
        assert!(matches!(m.use_correct_program(&mut ctx), Err(SelectError::Unavailable(_))));
        assert!(m.current_program().is_none());
    }
}
