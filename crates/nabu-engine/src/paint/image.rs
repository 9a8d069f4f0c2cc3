use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use super::Color;

/// Stable content identity of an [`Image`].
///
/// Clones of an image share the key; every newly constructed image gets a
/// fresh one. Texture caches are keyed by it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ImageKey(u64);

impl ImageKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ImageKey(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Pixel layout of an [`Image`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ImageFormat {
    /// RGBA8 with premultiplied alpha.
    Rgba8Premultiplied,
    /// RGBA8 with straight alpha; converted on upload.
    Rgba8,
    /// 8-bit coverage. Drawn tinted with the brush or pattern color.
    Alpha8,
}

impl ImageFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Rgba8Premultiplied | ImageFormat::Rgba8 => 4,
            ImageFormat::Alpha8 => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("pixel buffer holds {got} bytes, {width}x{height} {format:?} needs {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        format: ImageFormat,
        expected: usize,
        got: usize,
    },
    #[error("image has zero size")]
    Empty,
    #[error("failed to decode image: {0}")]
    Decode(#[from] ::image::ImageError),
}

struct ImageData {
    key: ImageKey,
    width: u32,
    height: u32,
    format: ImageFormat,
    has_alpha: bool,
    pixels: Vec<u8>,
}

/// Immutable CPU-side image, cheap to clone.
#[derive(Clone)]
pub struct Image {
    inner: Arc<ImageData>,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("key", &self.inner.key)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("format", &self.inner.format)
            .finish()
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Image {
    pub fn new(width: u32, height: u32, format: ImageFormat, pixels: Vec<u8>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(ImageError::SizeMismatch { width, height, format, expected, got: pixels.len() });
        }

        let has_alpha = match format {
            ImageFormat::Alpha8 => true,
            _ => pixels.chunks_exact(4).any(|px| px[3] != 255),
        };

        Ok(Self {
            inner: Arc::new(ImageData {
                key: ImageKey::next(),
                width,
                height,
                format,
                has_alpha,
                pixels,
            }),
        })
    }

    /// Decodes PNG bytes into a straight-alpha RGBA image.
    pub fn from_png(bytes: &[u8]) -> Result<Self, ImageError> {
        let decoded = ::image::load_from_memory_with_format(bytes, ::image::ImageFormat::Png)?;
        let rgba = decoded.into_rgba8();
        let (w, h) = rgba.dimensions();
        Self::new(w, h, ImageFormat::Rgba8, rgba.into_raw())
    }

    /// Image filled with a single color.
    pub fn filled(width: u32, height: u32, color: Color) -> Result<Self, ImageError> {
        let px = color.to_rgba8_premul();
        let pixels = px.repeat(width as usize * height as usize);
        Self::new(width, height, ImageFormat::Rgba8Premultiplied, pixels)
    }

    #[inline]
    pub fn key(&self) -> ImageKey {
        self.inner.key
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.inner.format
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.inner.pixels
    }

    /// True when some pixel is not fully opaque.
    #[inline]
    pub fn has_alpha(&self) -> bool {
        self.inner.has_alpha
    }

    /// Coverage-only image, tinted at draw time.
    #[inline]
    pub fn is_alpha_mask(&self) -> bool {
        self.inner.format == ImageFormat::Alpha8
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.inner.pixels.len()
    }

    /// Pixels as premultiplied RGBA8 (four bytes per pixel).
    pub fn to_premultiplied_rgba(&self) -> Vec<u8> {
        match self.inner.format {
            ImageFormat::Rgba8Premultiplied => self.inner.pixels.clone(),
            ImageFormat::Rgba8 => self
                .inner
                .pixels
                .chunks_exact(4)
                .flat_map(|px| {
                    let a = px[3] as u32;
                    let m = |c: u8| ((c as u32 * a + 127) / 255) as u8;
                    [m(px[0]), m(px[1]), m(px[2]), px[3]]
                })
                .collect(),
            ImageFormat::Alpha8 => self.inner.pixels.iter().flat_map(|&a| [a, a, a, a]).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_checked() {
        let err = Image::new(2, 2, ImageFormat::Rgba8, vec![0; 15]).unwrap_err();
        assert!(matches!(err, ImageError::SizeMismatch { expected: 16, got: 15, .. }));
        assert!(matches!(Image::new(0, 2, ImageFormat::Alpha8, vec![]), Err(ImageError::Empty)));
    }

    #[test]
    fn keys_follow_identity() {
        let a = Image::filled(1, 1, Color::WHITE).unwrap();
        let b = Image::filled(1, 1, Color::WHITE).unwrap();
        assert_eq!(a.clone().key(), a.key());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn alpha_detection() {
        assert!(!Image::filled(2, 1, Color::BLACK).unwrap().has_alpha());
        assert!(Image::filled(2, 1, Color::BLACK.scaled(0.5)).unwrap().has_alpha());
    }

    #[test]
    fn straight_pixels_are_premultiplied() {
        let img = Image::new(1, 1, ImageFormat::Rgba8, vec![255, 128, 0, 128]).unwrap();
        assert_eq!(img.to_premultiplied_rgba(), vec![128, 64, 0, 128]);
    }
}
