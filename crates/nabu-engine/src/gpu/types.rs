use std::sync::atomic::{AtomicU64, Ordering};

use crate::coords::Vec2;

// ── handles ───────────────────────────────────────────────────────────────

/// Texture handle issued by a [`RenderContext`](super::RenderContext).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Program handle issued by a [`RenderContext`](super::RenderContext).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

/// Location of a uniform inside a program's uniform block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation(pub(crate) u32);

/// Identity of a set of contexts sharing texture and program names.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ShareGroupId(u64);

impl ShareGroupId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ShareGroupId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

// ── capabilities ──────────────────────────────────────────────────────────

/// Fixed facts about the current context and its target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Bits in the target's stencil buffer; zero when there is none.
    pub stencil_bits: u8,
    pub max_texture_size: u32,
    /// 32-bit index buffers are accepted by `draw`.
    pub supports_u32_indices: bool,
    /// The color target stores alpha.
    pub target_has_alpha: bool,
}

impl Capabilities {
    #[inline]
    pub fn has_stencil(&self) -> bool {
        self.stencil_bits >= 8
    }
}

// ── textures ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    /// Premultiplied RGBA, four bytes per texel.
    Rgba8,
    /// One coverage byte per texel, sampled from the red channel.
    Alpha8,
}

impl TextureFormat {
    #[inline]
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Alpha8 => 1,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Texture units the engine binds into.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureUnit {
    /// Brush, image and pattern textures.
    Brush = 0,
    /// Glyph coverage.
    Mask = 1,
    /// Copy of the target for shader-side composition.
    Background = 2,
}

impl TextureUnit {
    pub const COUNT: usize = 3;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

// ── uniforms ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column major.
    Mat3([[f32; 3]; 3]),
}

// ── blending ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
}

/// Additive blend `src * src_factor + dst * dst_factor`, same for color and
/// alpha.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlendFunc {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendFunc {
    #[inline]
    pub const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self { src, dst }
    }

    pub const SOURCE_OVER: BlendFunc = BlendFunc::new(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);
}

// ── programs ──────────────────────────────────────────────────────────────

/// One WGSL module holding a `vs_main` and an `fs_main` entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub label: String,
    pub wgsl: String,
}

// ── draws ─────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Primitive {
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Indices<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl Indices<'_> {
    pub fn len(&self) -> usize {
        match self {
            Indices::U16(i) => i.len(),
            Indices::U32(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> u32 {
        match self {
            Indices::U16(v) => v[i] as u32,
            Indices::U32(v) => v[i],
        }
    }
}

/// Vertex data for one draw.
///
/// Positions go through the transform columns set with
/// `set_transform_columns`. Attribute arrays that are present have one
/// entry per position.
#[derive(Debug, Copy, Clone)]
pub struct DrawCall<'a> {
    pub primitive: Primitive,
    pub positions: &'a [Vec2],
    pub tex_coords: Option<&'a [Vec2]>,
    pub opacities: Option<&'a [f32]>,
    pub indices: Option<Indices<'a>>,
}

impl<'a> DrawCall<'a> {
    pub fn new(primitive: Primitive, positions: &'a [Vec2]) -> Self {
        Self { primitive, positions, tex_coords: None, opacities: None, indices: None }
    }

    pub fn with_tex_coords(mut self, tex_coords: &'a [Vec2]) -> Self {
        self.tex_coords = Some(tex_coords);
        self
    }

    pub fn with_opacities(mut self, opacities: &'a [f32]) -> Self {
        self.opacities = Some(opacities);
        self
    }

    pub fn with_indices(mut self, indices: Indices<'a>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Number of vertices the primitive assembly walks.
    pub fn element_count(&self) -> usize {
        self.indices.map_or(self.positions.len(), |i| i.len())
    }

    /// Triangle list with the winding each triangle has under GL assembly
    /// rules (strip triangles alternate, fans pivot on the first vertex).
    pub fn triangle_indices(&self) -> Vec<u32> {
        let n = self.element_count();
        let at = |i: usize| self.indices.map_or(i as u32, |idx| idx.get(i));
        let mut out = Vec::with_capacity(n.saturating_sub(2) * 3);
        match self.primitive {
            Primitive::Triangles => {
                for i in 0..n / 3 * 3 {
                    out.push(at(i));
                }
            }
            Primitive::TriangleStrip => {
                for i in 2..n {
                    if i % 2 == 0 {
                        out.extend([at(i - 2), at(i - 1), at(i)]);
                    } else {
                        out.extend([at(i - 1), at(i - 2), at(i)]);
                    }
                }
            }
            Primitive::TriangleFan => {
                for i in 2..n {
                    out.extend([at(0), at(i - 1), at(i)]);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(n: usize) -> Vec<Vec2> {
        (0..n).map(|i| Vec2::new(i as f32, 0.0)).collect()
    }

    #[test]
    fn fan_pivots_on_first_vertex() {
        let p = pts(5);
        let call = DrawCall::new(Primitive::TriangleFan, &p);
        assert_eq!(call.triangle_indices(), vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
    }

    #[test]
    fn strip_keeps_orientation() {
        let p = pts(5);
        let call = DrawCall::new(Primitive::TriangleStrip, &p);
        assert_eq!(call.triangle_indices(), vec![0, 1, 2, 2, 1, 3, 2, 3, 4]);
    }

    #[test]
    fn indexed_triangles_drop_partial() {
        let p = pts(4);
        let idx = [0u16, 1, 2, 2, 3];
        let call = DrawCall::new(Primitive::Triangles, &p).with_indices(Indices::U16(&idx));
        assert_eq!(call.element_count(), 5);
        assert_eq!(call.triangle_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn share_groups_are_unique() {
        assert_ne!(ShareGroupId::next(), ShareGroupId::next());
    }
}
