//! Rendering context abstraction.
//!
//! The engine issues every GPU command through [`RenderContext`]. The wgpu
//! implementation lives in [`wgpu_backend`]; tests use the software
//! rasterizer in `testing`.

mod context;
mod owned;
pub mod stencil;
mod types;
pub mod wgpu_backend;

#[cfg(test)]
pub mod testing;

pub use context::{GpuError, ProgramError, RenderContext};
pub use owned::{OwnedProgram, OwnedTexture};
pub use stencil::{ClipLevel, CompareFunction, StencilFaceOps, StencilOp, StencilState};
pub use types::{
    BlendFactor, BlendFunc, Capabilities, DrawCall, FilterMode, Indices, Primitive, ProgramId,
    ProgramSource, ShareGroupId, TextureFormat, TextureId, TextureUnit, UniformLocation,
    UniformValue, WrapMode,
};
pub use wgpu_backend::WgpuContext;
