use thiserror::Error;

use crate::coords::{IRect, Viewport};

use super::stencil::StencilState;
use super::types::{
    BlendFunc, Capabilities, DrawCall, FilterMode, ProgramId, ProgramSource, ShareGroupId,
    TextureFormat, TextureId, TextureUnit, UniformLocation, UniformValue, WrapMode,
};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("texture of {width}x{height} exceeds the {max} texel limit")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
    #[error("texture has zero size")]
    EmptyTexture,
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("region {region:?} lies outside texture {texture:?}")]
    RegionOutOfBounds { texture: TextureId, region: IRect },
    #[error("texel data holds {got} bytes, {expected} expected")]
    DataSize { expected: usize, got: usize },
    #[error("readback failed: {0}")]
    Readback(String),
}

/// Failed program build; `log` carries the compiler diagnostics.
#[derive(Debug, Clone, Error)]
#[error("program `{label}` failed to build:\n{log}")]
pub struct ProgramError {
    pub label: String,
    pub log: String,
}

/// The current, configured rendering context the engine paints through.
///
/// State set here is sticky until changed, like a GL context: blend, color
/// mask, stencil, scissor, bound textures, the current program and its
/// uniforms all persist across draws. Programs keep their own uniform values.
///
/// Fixed vertex slots: position = 0, texture coordinate = 1, opacity = 2,
/// transform columns = 3, 4, 5.
pub trait RenderContext {
    fn capabilities(&self) -> Capabilities;

    /// Target size in device pixels.
    fn size(&self) -> Viewport;

    fn share_group(&self) -> ShareGroupId;

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat) -> Result<TextureId, GpuError>;

    /// Writes tightly packed texels into `region`.
    fn upload_texture(&mut self, texture: TextureId, region: IRect, data: &[u8]) -> Result<(), GpuError>;

    /// GPU-side copy of `src_rect` from `src` to `dst` at `dst_origin`.
    fn copy_texture(
        &mut self,
        src: TextureId,
        src_rect: IRect,
        dst: TextureId,
        dst_origin: (u32, u32),
    ) -> Result<(), GpuError>;

    fn delete_texture(&mut self, texture: TextureId);

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)>;

    fn set_texture_sampling(&mut self, texture: TextureId, wrap: WrapMode, filter: FilterMode);

    fn bind_texture(&mut self, unit: TextureUnit, texture: Option<TextureId>);

    /// Copies the current target into the texture sampled through
    /// [`TextureUnit::Background`].
    fn snapshot_background(&mut self);

    // ── programs ──────────────────────────────────────────────────────────

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramId, ProgramError>;

    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: ProgramId);

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Sets a uniform of the program in use.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    // ── fixed function ────────────────────────────────────────────────────

    /// `None` disables blending.
    fn set_blend(&mut self, blend: Option<BlendFunc>);

    fn set_blend_constant(&mut self, color: [f32; 4]);

    fn set_color_write(&mut self, enabled: bool);

    /// `None` disables the stencil test and stencil writes.
    fn set_stencil(&mut self, state: Option<StencilState>);

    fn set_scissor(&mut self, rect: Option<IRect>);

    /// Sets the stencil of `rect` (the whole target for `None`) to `value`,
    /// ignoring scissor and stencil state.
    fn clear_stencil(&mut self, rect: Option<IRect>, value: u8);

    /// Per-draw constant for the transform slots.
    fn set_transform_columns(&mut self, columns: [[f32; 3]; 3]);

    // ── submission ────────────────────────────────────────────────────────

    fn draw(&mut self, call: &DrawCall<'_>);

    /// Submits everything recorded so far.
    fn flush(&mut self) -> Result<(), GpuError>;

    /// Forgets cached state so the next draw sets everything again; used
    /// after foreign code touched the context.
    fn reset_state(&mut self);
}
