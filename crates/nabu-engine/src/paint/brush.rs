use crate::coords::Transform;

use super::{Color, Gradient, Image};

/// Built-in 8×8 stipple patterns.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BrushPattern {
    Dense1,
    Dense2,
    Dense3,
    Dense4,
    Dense5,
    Dense6,
    Dense7,
    Horizontal,
    Vertical,
    Cross,
    BDiagonal,
    FDiagonal,
    DiagCross,
}

impl BrushPattern {
    /// One byte per row, least significant bit is the leftmost pixel.
    fn rows(self) -> [u8; 8] {
        match self {
            BrushPattern::Dense1 => [0xff, 0xbb, 0xff, 0xff, 0xff, 0xbb, 0xff, 0xff],
            BrushPattern::Dense2 => [0x77, 0xff, 0xdd, 0xff, 0x77, 0xff, 0xdd, 0xff],
            BrushPattern::Dense3 => [0x55, 0xbb, 0x55, 0xee, 0x55, 0xbb, 0x55, 0xee],
            BrushPattern::Dense4 => [0x55, 0xaa, 0x55, 0xaa, 0x55, 0xaa, 0x55, 0xaa],
            BrushPattern::Dense5 => [0xaa, 0x44, 0xaa, 0x11, 0xaa, 0x44, 0xaa, 0x11],
            BrushPattern::Dense6 => [0x88, 0x00, 0x22, 0x00, 0x88, 0x00, 0x22, 0x00],
            BrushPattern::Dense7 => [0x00, 0x44, 0x00, 0x00, 0x00, 0x44, 0x00, 0x00],
            BrushPattern::Horizontal => [0x00, 0x00, 0x00, 0xff, 0x00, 0x00, 0x00, 0x00],
            BrushPattern::Vertical => [0x10; 8],
            BrushPattern::Cross => [0x10, 0x10, 0x10, 0xff, 0x10, 0x10, 0x10, 0x10],
            BrushPattern::BDiagonal => [0x80, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02, 0x01],
            BrushPattern::FDiagonal => [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80],
            BrushPattern::DiagCross => [0x81, 0x42, 0x24, 0x18, 0x18, 0x24, 0x42, 0x81],
        }
    }

    /// 8×8 coverage mask, 255 where the pattern paints.
    pub fn coverage(self) -> [u8; 64] {
        let mut out = [0u8; 64];
        for (y, row) in self.rows().into_iter().enumerate() {
            for x in 0..8 {
                if (row >> x) & 1 == 1 {
                    out[y * 8 + x] = 255;
                }
            }
        }
        out
    }
}

/// What a brush paints with.
#[derive(Debug, Clone, PartialEq)]
pub enum BrushKind {
    None,
    Solid(Color),
    Pattern { pattern: BrushPattern, color: Color },
    Gradient(Gradient),
    /// Image brush. `color` tints alpha-mask images and is ignored otherwise.
    Texture { image: Image, color: Color },
}

/// Fill description: a paint source plus its own transform relative to the
/// painter's.
#[derive(Debug, Clone, PartialEq)]
pub struct Brush {
    pub kind: BrushKind,
    pub transform: Transform,
}

impl Default for Brush {
    fn default() -> Self {
        Self::none()
    }
}

impl Brush {
    #[inline]
    pub fn none() -> Self {
        Self { kind: BrushKind::None, transform: Transform::identity() }
    }

    #[inline]
    pub fn solid(color: Color) -> Self {
        Self { kind: BrushKind::Solid(color), transform: Transform::identity() }
    }

    #[inline]
    pub fn pattern(pattern: BrushPattern, color: Color) -> Self {
        Self { kind: BrushKind::Pattern { pattern, color }, transform: Transform::identity() }
    }

    #[inline]
    pub fn gradient(gradient: Gradient) -> Self {
        Self { kind: BrushKind::Gradient(gradient), transform: Transform::identity() }
    }

    #[inline]
    pub fn texture(image: Image) -> Self {
        Self {
            kind: BrushKind::Texture { image, color: Color::BLACK },
            transform: Transform::identity(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self.kind, BrushKind::None)
    }

    /// Every painted pixel is fully opaque.
    pub fn is_opaque(&self) -> bool {
        match &self.kind {
            BrushKind::None | BrushKind::Pattern { .. } => false,
            BrushKind::Solid(c) => c.is_opaque(),
            BrushKind::Gradient(g) => g.is_opaque(),
            BrushKind::Texture { image, .. } => !image.has_alpha(),
        }
    }

    /// Anything beyond a flat color needs a texture bound for drawing.
    #[inline]
    pub fn needs_texture(&self) -> bool {
        matches!(
            self.kind,
            BrushKind::Pattern { .. } | BrushKind::Gradient(_) | BrushKind::Texture { .. }
        )
    }

    /// Equality used to skip redundant brush updates. Solid colors are
    /// compared without touching the transform classification.
    pub fn fast_eq(&self, other: &Brush) -> bool {
        match (&self.kind, &other.kind) {
            (BrushKind::Solid(a), BrushKind::Solid(b)) => a == b && self.transform == other.transform,
            (BrushKind::None, BrushKind::None) => true,
            _ => self == other,
        }
    }
}
