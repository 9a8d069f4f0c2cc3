//! Single-owner guards for GPU objects.
//!
//! A guard must be handed back with `release(ctx)`; dropping it while it
//! still holds a handle leaks the object and logs a warning.

use super::context::{GpuError, ProgramError, RenderContext};
use super::types::{ProgramId, ProgramSource, TextureFormat, TextureId};

#[derive(Debug)]
pub struct OwnedTexture {
    id: Option<TextureId>,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl OwnedTexture {
    pub fn create(
        ctx: &mut dyn RenderContext,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Self, GpuError> {
        let id = ctx.create_texture(width, height, format)?;
        Ok(Self { id: Some(id), width, height, format })
    }

    /// Handle of a live texture. Released guards are consumed, so this is
    /// always valid while the guard exists.
    #[inline]
    pub fn id(&self) -> TextureId {
        self.id.unwrap_or(TextureId(u32::MAX))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel()
    }

    pub fn release(mut self, ctx: &mut dyn RenderContext) {
        if let Some(id) = self.id.take() {
            ctx.delete_texture(id);
        }
    }

    /// Gives up ownership without deleting, for objects whose context is
    /// already gone.
    pub fn forget(mut self) {
        self.id = None;
    }
}

impl Drop for OwnedTexture {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            log::warn!("texture {id:?} dropped without release; it leaks until its context dies");
        }
    }
}

#[derive(Debug)]
pub struct OwnedProgram {
    id: Option<ProgramId>,
}

impl OwnedProgram {
    pub fn create(ctx: &mut dyn RenderContext, source: &ProgramSource) -> Result<Self, ProgramError> {
        let id = ctx.create_program(source)?;
        Ok(Self { id: Some(id) })
    }

    #[inline]
    pub fn id(&self) -> ProgramId {
        self.id.unwrap_or(ProgramId(u32::MAX))
    }

    pub fn release(mut self, ctx: &mut dyn RenderContext) {
        if let Some(id) = self.id.take() {
            ctx.delete_program(id);
        }
    }

    pub fn forget(mut self) {
        self.id = None;
    }
}

impl Drop for OwnedProgram {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            log::warn!("program {id:?} dropped without release; it leaks until its context dies");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::RecordingContext;

    #[test]
    fn release_deletes_once() {
        let mut ctx = RecordingContext::new(4, 4);
        let tex = OwnedTexture::create(&mut ctx, 2, 2, TextureFormat::Rgba8).unwrap();
        let id = tex.id();
        assert_eq!(tex.byte_size(), 16);
        assert!(ctx.texture_size(id).is_some());
        tex.release(&mut ctx);
        assert!(ctx.texture_size(id).is_none());
        assert_eq!(ctx.live_textures(), 0);
    }

    #[test]
    fn forget_keeps_object() {
        let mut ctx = RecordingContext::new(4, 4);
        let tex = OwnedTexture::create(&mut ctx, 1, 1, TextureFormat::Alpha8).unwrap();
        tex.forget();
        assert_eq!(ctx.live_textures(), 1);
    }
}
