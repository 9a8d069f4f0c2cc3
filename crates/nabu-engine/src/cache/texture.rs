use bitflags::bitflags;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use lru::LruCache;

use crate::coords::IRect;
use crate::gpu::{FilterMode, GpuError, OwnedTexture, RenderContext, TextureFormat, TextureId, WrapMode};
use crate::paint::{Image, ImageFormat, ImageKey};

bitflags! {
    /// How an image is turned into a texture. Part of the cache key.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct BindOptions: u8 {
        /// Convert straight alpha to premultiplied on upload.
        const PREMULTIPLIED_ALPHA = 1 << 0;
        /// Sample with bilinear filtering by default.
        const LINEAR_FILTERING = 1 << 1;
        /// Shrink images beyond the texture size limit instead of failing.
        const DOWNSCALE = 1 << 2;
    }
}

impl Default for BindOptions {
    fn default() -> Self {
        BindOptions::PREMULTIPLIED_ALPHA | BindOptions::DOWNSCALE
    }
}

/// A texture ready for sampling plus what the shader needs to know about it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoundTexture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    /// Texels carry premultiplied alpha.
    pub premultiplied: bool,
    /// Coverage image; every channel holds the alpha value.
    pub alpha_only: bool,
}

struct Entry {
    texture: OwnedTexture,
    bound: BoundTexture,
}

/// Uploaded images, bounded by the bytes they occupy on the GPU.
///
/// The least recently bound textures go first once the budget is exceeded;
/// the texture just bound is never evicted by its own insertion.
pub struct TextureCache {
    entries: LruCache<(ImageKey, BindOptions), Entry>,
    budget: usize,
    used: usize,
    max_size_override: Option<u32>,
}

impl TextureCache {
    pub fn new(budget_bytes: usize, max_size_override: Option<u32>) -> Self {
        Self { entries: LruCache::unbounded(), budget: budget_bytes, used: 0, max_size_override }
    }

    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn max_texture_size(&self, ctx: &dyn RenderContext) -> u32 {
        let max = ctx.capabilities().max_texture_size;
        self.max_size_override.map_or(max, |o| o.min(max)).max(1)
    }

    /// Texture holding `image`, uploading it on a miss.
    pub fn bind(
        &mut self,
        ctx: &mut dyn RenderContext,
        image: &Image,
        options: BindOptions,
    ) -> Result<BoundTexture, GpuError> {
        let key = (image.key(), options);
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.bound);
        }

        let alpha_only = image.is_alpha_mask();
        let premultiplied = alpha_only
            || image.format() == ImageFormat::Rgba8Premultiplied
            || options.contains(BindOptions::PREMULTIPLIED_ALPHA);
        let mut pixels = if premultiplied { image.to_premultiplied_rgba() } else { image.pixels().to_vec() };
        let (mut width, mut height) = (image.width(), image.height());

        let max = self.max_texture_size(ctx);
        if width > max || height > max {
            if !options.contains(BindOptions::DOWNSCALE) {
                return Err(GpuError::TextureTooLarge { width, height, max });
            }
            (pixels, width, height) = downscale(pixels, width, height, max)?;
            log::debug!(
                "TextureCache: downscaled {}x{} image to {width}x{height}",
                image.width(),
                image.height()
            );
        }

        let texture = OwnedTexture::create(ctx, width, height, TextureFormat::Rgba8)?;
        if let Err(err) = ctx.upload_texture(texture.id(), IRect::new(0, 0, width as i32, height as i32), &pixels) {
            texture.release(ctx);
            return Err(err);
        }
        let filter = if options.contains(BindOptions::LINEAR_FILTERING) {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        };
        ctx.set_texture_sampling(texture.id(), WrapMode::ClampToEdge, filter);

        let bound = BoundTexture { id: texture.id(), width, height, premultiplied, alpha_only };
        self.used += texture.byte_size();
        self.entries.push(key, Entry { texture, bound });
        self.trim(ctx);
        Ok(bound)
    }

    fn trim(&mut self, ctx: &mut dyn RenderContext) {
        while self.used > self.budget && self.entries.len() > 1 {
            let Some((_, entry)) = self.entries.pop_lru() else { break };
            self.used -= entry.texture.byte_size();
            entry.texture.release(ctx);
        }
    }

    /// Drops every texture made from the image with `key`.
    pub fn invalidate(&mut self, ctx: &mut dyn RenderContext, key: ImageKey) {
        let stale: Vec<_> = self.entries.iter().map(|(k, _)| *k).filter(|k| k.0 == key).collect();
        for k in stale {
            if let Some(entry) = self.entries.pop(&k) {
                self.used -= entry.texture.byte_size();
                entry.texture.release(ctx);
            }
        }
    }

    pub fn clear(&mut self, ctx: &mut dyn RenderContext) {
        while let Some((_, entry)) = self.entries.pop_lru() {
            entry.texture.release(ctx);
        }
        self.used = 0;
    }
}

/// Shrinks RGBA pixels so neither side exceeds `max`, keeping the aspect.
fn downscale(pixels: Vec<u8>, width: u32, height: u32, max: u32) -> Result<(Vec<u8>, u32, u32), GpuError> {
    let expected = width as usize * height as usize * 4;
    let got = pixels.len();
    let source = RgbaImage::from_raw(width, height, pixels).ok_or(GpuError::DataSize { expected, got })?;
    let factor = max as f32 / width.max(height) as f32;
    let w = ((width as f32 * factor).floor() as u32).clamp(1, max);
    let h = ((height as f32 * factor).floor() as u32).clamp(1, max);
    let scaled = imageops::resize(&source, w, h, FilterType::Triangle);
    Ok((scaled.into_raw(), w, h))
}
