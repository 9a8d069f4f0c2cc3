//! WGSL snippets assembled into shader variants.
//!
//! Every program starts with [`PRELUDE`] (uniform block, bindings, vertex
//! interface, shared helpers) and then concatenates one snippet per slot:
//!
//! ```text
//!   main vertex      -> vs_main, calls set_position()
//!   position vertex  -> set_position()
//!   custom stage     -> custom_src_pixel()            (optional)
//!   main fragment    -> fs_main, calls src_pixel() / compose() / apply_mask()
//!   source pixel     -> src_pixel()
//!   composition      -> compose()                     (optional)
//!   mask             -> apply_mask()                  (optional)
//! ```
//!
//! Brush position snippets evaluate brush coordinates per vertex. The
//! projective ones divide by the homogeneous brush coordinate and move that
//! divisor into the clip-space `w`, so perspective-correct interpolation
//! yields the projectively mapped brush coordinate per fragment.

/// Identifier of one snippet.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum SnippetName {
    // main vertex
    MainVertex,
    MainWithTexCoordsVertex,
    MainWithTexCoordsAndOpacityVertex,

    // position vertex
    PositionOnlyVertex,
    ComplexGeometryPositionOnlyVertex,
    PositionWithPatternBrushVertex,
    AffinePositionWithPatternBrushVertex,
    PositionWithLinearGradientBrushVertex,
    AffinePositionWithLinearGradientBrushVertex,
    PositionWithConicalGradientBrushVertex,
    AffinePositionWithConicalGradientBrushVertex,
    PositionWithRadialGradientBrushVertex,
    AffinePositionWithRadialGradientBrushVertex,
    PositionWithTextureBrushVertex,
    AffinePositionWithTextureBrushVertex,

    // main fragment: C = composition, M = mask, O = uniform opacity
    MainFragmentCMO,
    MainFragmentCM,
    MainFragmentMO,
    MainFragmentM,
    MainFragmentCO,
    MainFragmentC,
    MainFragmentO,
    MainFragment,
    MainFragmentImageArrays,

    // source pixel
    ImageSrcFragment,
    AlphaImageSrcFragment,
    NonPremultipliedImageSrcFragment,
    CustomImageSrcFragment,
    SolidBrushSrcFragment,
    TextureBrushSrcFragment,
    AlphaTextureBrushSrcFragment,
    PatternBrushSrcFragment,
    LinearGradientBrushSrcFragment,
    RadialGradientBrushSrcFragment,
    ConicalGradientBrushSrcFragment,
    StencilWriteSrcFragment,

    // mask
    MaskFragment,
    RgbMaskFragmentPass1,
    RgbMaskFragmentPass2,

    // composition
    MultiplyCompositionFragment,
    ScreenCompositionFragment,
    OverlayCompositionFragment,
    DarkenCompositionFragment,
    LightenCompositionFragment,
    ColorDodgeCompositionFragment,
    ColorBurnCompositionFragment,
    HardLightCompositionFragment,
    SoftLightCompositionFragment,
    DifferenceCompositionFragment,
    ExclusionCompositionFragment,
}

impl SnippetName {
    pub fn source(self) -> &'static str {
        use SnippetName::*;
        match self {
            MainVertex => MAIN_VERTEX,
            MainWithTexCoordsVertex => MAIN_WITH_TEX_COORDS_VERTEX,
            MainWithTexCoordsAndOpacityVertex => MAIN_WITH_TEX_COORDS_AND_OPACITY_VERTEX,

            PositionOnlyVertex => POSITION_ONLY_VERTEX,
            ComplexGeometryPositionOnlyVertex => COMPLEX_GEOMETRY_POSITION_ONLY_VERTEX,
            PositionWithPatternBrushVertex => POSITION_WITH_PATTERN_BRUSH_VERTEX,
            AffinePositionWithPatternBrushVertex => AFFINE_POSITION_WITH_PATTERN_BRUSH_VERTEX,
            PositionWithLinearGradientBrushVertex => POSITION_WITH_LINEAR_GRADIENT_BRUSH_VERTEX,
            AffinePositionWithLinearGradientBrushVertex => AFFINE_POSITION_WITH_LINEAR_GRADIENT_BRUSH_VERTEX,
            PositionWithConicalGradientBrushVertex => POSITION_WITH_CONICAL_GRADIENT_BRUSH_VERTEX,
            AffinePositionWithConicalGradientBrushVertex => AFFINE_POSITION_WITH_CONICAL_GRADIENT_BRUSH_VERTEX,
            PositionWithRadialGradientBrushVertex => POSITION_WITH_RADIAL_GRADIENT_BRUSH_VERTEX,
            AffinePositionWithRadialGradientBrushVertex => AFFINE_POSITION_WITH_RADIAL_GRADIENT_BRUSH_VERTEX,
            PositionWithTextureBrushVertex => POSITION_WITH_TEXTURE_BRUSH_VERTEX,
            AffinePositionWithTextureBrushVertex => AFFINE_POSITION_WITH_TEXTURE_BRUSH_VERTEX,

            MainFragmentCMO => MAIN_FRAGMENT_CMO,
            MainFragmentCM => MAIN_FRAGMENT_CM,
            MainFragmentMO => MAIN_FRAGMENT_MO,
            MainFragmentM => MAIN_FRAGMENT_M,
            MainFragmentCO => MAIN_FRAGMENT_CO,
            MainFragmentC => MAIN_FRAGMENT_C,
            MainFragmentO => MAIN_FRAGMENT_O,
            MainFragment => MAIN_FRAGMENT,
            MainFragmentImageArrays => MAIN_FRAGMENT_IMAGE_ARRAYS,

            ImageSrcFragment => IMAGE_SRC_FRAGMENT,
            AlphaImageSrcFragment => ALPHA_IMAGE_SRC_FRAGMENT,
            NonPremultipliedImageSrcFragment => NON_PREMULTIPLIED_IMAGE_SRC_FRAGMENT,
            CustomImageSrcFragment => CUSTOM_IMAGE_SRC_FRAGMENT,
            SolidBrushSrcFragment => SOLID_BRUSH_SRC_FRAGMENT,
            TextureBrushSrcFragment => TEXTURE_BRUSH_SRC_FRAGMENT,
            AlphaTextureBrushSrcFragment => ALPHA_TEXTURE_BRUSH_SRC_FRAGMENT,
            PatternBrushSrcFragment => PATTERN_BRUSH_SRC_FRAGMENT,
            LinearGradientBrushSrcFragment => LINEAR_GRADIENT_BRUSH_SRC_FRAGMENT,
            RadialGradientBrushSrcFragment => RADIAL_GRADIENT_BRUSH_SRC_FRAGMENT,
            ConicalGradientBrushSrcFragment => CONICAL_GRADIENT_BRUSH_SRC_FRAGMENT,
            StencilWriteSrcFragment => STENCIL_WRITE_SRC_FRAGMENT,

            MaskFragment => MASK_FRAGMENT,
            RgbMaskFragmentPass1 => RGB_MASK_FRAGMENT_PASS1,
            RgbMaskFragmentPass2 => RGB_MASK_FRAGMENT_PASS2,

            MultiplyCompositionFragment => MULTIPLY_COMPOSITION,
            ScreenCompositionFragment => SCREEN_COMPOSITION,
            OverlayCompositionFragment => OVERLAY_COMPOSITION,
            DarkenCompositionFragment => DARKEN_COMPOSITION,
            LightenCompositionFragment => LIGHTEN_COMPOSITION,
            ColorDodgeCompositionFragment => COLOR_DODGE_COMPOSITION,
            ColorBurnCompositionFragment => COLOR_BURN_COMPOSITION,
            HardLightCompositionFragment => HARD_LIGHT_COMPOSITION,
            SoftLightCompositionFragment => SOFT_LIGHT_COMPOSITION,
            DifferenceCompositionFragment => DIFFERENCE_COMPOSITION,
            ExclusionCompositionFragment => EXCLUSION_COMPOSITION,
        }
    }
}

// ── prelude ───────────────────────────────────────────────────────────────

/// Shared by every program; the uniform block layout is therefore identical
/// across variants.
pub const PRELUDE: &str = r#"
struct Uniforms {
    fragment_color: vec4<f32>,
    pattern_color: vec4<f32>,
    linear_data: vec3<f32>,
    global_opacity: f32,
    b_radius: vec3<f32>,
    angle: f32,
    fmp: vec2<f32>,
    fmp2_m_radius2: f32,
    inverse_2_fmp2_m_radius2: f32,
    half_viewport_size: vec2<f32>,
    inverted_texture_size: vec2<f32>,
    sqr_fr: f32,
    brush_transform: mat3x3<f32>,
    pmv_matrix: mat3x3<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var brush_texture: texture_2d<f32>;
@group(0) @binding(2) var brush_sampler: sampler;
@group(0) @binding(3) var mask_texture: texture_2d<f32>;
@group(0) @binding(4) var mask_sampler: sampler;
@group(0) @binding(5) var background_texture: texture_2d<f32>;

struct VertexIn {
    @location(0) position: vec2<f32>,
    @location(1) tex_coord: vec2<f32>,
    @location(2) opacity: f32,
    @location(3) pmv0: vec3<f32>,
    @location(4) pmv1: vec3<f32>,
    @location(5) pmv2: vec3<f32>,
};

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
    @location(1) brush: vec3<f32>,
    @location(2) opacity: f32,
};

fn pmv(v: VertexIn) -> mat3x3<f32> {
    return mat3x3<f32>(v.pmv0, v.pmv1, v.pmv2);
}

// Homogeneous brush coordinates of a normalized device position.
fn brush_coords(ndc: vec2<f32>) -> vec3<f32> {
    let window_pos = (ndc + vec2<f32>(1.0)) * u.half_viewport_size;
    return u.brush_transform * vec3<f32>(window_pos, 1.0);
}

fn unpremultiply(c: vec4<f32>) -> vec3<f32> {
    if c.a <= 0.0 {
        return vec3<f32>(0.0);
    }
    return c.rgb / c.a;
}

fn background_pixel(v: VertexOut) -> vec4<f32> {
    return textureLoad(background_texture, vec2<i32>(v.clip.xy), 0);
}

// Separable blend result `b` (straight) turned into a premultiplied color
// that yields the full blend equation under source-over blending.
fn compose_separable(src: vec4<f32>, dst: vec4<f32>, b: vec3<f32>) -> vec4<f32> {
    let rgb = src.a * dst.a * clamp(b, vec3<f32>(0.0), vec3<f32>(1.0)) + src.rgb * (1.0 - dst.a);
    return vec4<f32>(rgb, src.a);
}
"#;

// ── main vertex ───────────────────────────────────────────────────────────

const MAIN_VERTEX: &str = r#"
@vertex
fn vs_main(v: VertexIn) -> VertexOut {
    return set_position(v);
}
"#;

const MAIN_WITH_TEX_COORDS_VERTEX: &str = r#"
@vertex
fn vs_main(v: VertexIn) -> VertexOut {
    var o = set_position(v);
    o.tex_coord = v.tex_coord;
    return o;
}
"#;

const MAIN_WITH_TEX_COORDS_AND_OPACITY_VERTEX: &str = r#"
@vertex
fn vs_main(v: VertexIn) -> VertexOut {
    var o = set_position(v);
    o.tex_coord = v.tex_coord;
    o.opacity = v.opacity;
    return o;
}
"#;

// ── position vertex ───────────────────────────────────────────────────────

const POSITION_ONLY_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    o.clip = vec4<f32>(p.xy, 0.0, p.z);
    o.opacity = 1.0;
    return o;
}
"#;

// Glyph batches take the transform from the uniform block.
const COMPLEX_GEOMETRY_POSITION_ONLY_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = u.pmv_matrix * vec3<f32>(v.position, 1.0);
    o.clip = vec4<f32>(p.xy, 0.0, p.z);
    o.opacity = 1.0;
    return o;
}
"#;

const POSITION_WITH_PATTERN_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    let ndc = p.xy / p.z;
    let h = brush_coords(ndc);
    let inv_z = 1.0 / h.z;
    o.clip = vec4<f32>(ndc * inv_z, 0.0, inv_z);
    o.brush = vec3<f32>(h.xy * 0.125 * inv_z, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

const AFFINE_POSITION_WITH_PATTERN_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    o.clip = vec4<f32>(p.xy, 0.0, p.z);
    let h = brush_coords(p.xy / p.z);
    o.brush = vec3<f32>(h.xy * 0.125, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

const POSITION_WITH_LINEAR_GRADIENT_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    let ndc = p.xy / p.z;
    let h = brush_coords(ndc);
    let inv_z = 1.0 / h.z;
    o.clip = vec4<f32>(ndc * inv_z, 0.0, inv_z);
    let ramp_pos = dot(u.linear_data.xy, h.xy) * u.linear_data.z;
    o.brush = vec3<f32>(ramp_pos * inv_z, 0.0, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

const AFFINE_POSITION_WITH_LINEAR_GRADIENT_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    o.clip = vec4<f32>(p.xy, 0.0, p.z);
    let h = brush_coords(p.xy / p.z);
    o.brush = vec3<f32>(dot(u.linear_data.xy, h.xy) * u.linear_data.z, 0.0, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

const POSITION_WITH_CONICAL_GRADIENT_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    let ndc = p.xy / p.z;
    let h = brush_coords(ndc);
    let inv_z = 1.0 / h.z;
    o.clip = vec4<f32>(ndc * inv_z, 0.0, inv_z);
    o.brush = vec3<f32>(h.xy * inv_z, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

const AFFINE_POSITION_WITH_CONICAL_GRADIENT_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    o.clip = vec4<f32>(p.xy, 0.0, p.z);
    let h = brush_coords(p.xy / p.z);
    o.brush = vec3<f32>(h.xy, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

const POSITION_WITH_RADIAL_GRADIENT_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    let ndc = p.xy / p.z;
    let h = brush_coords(ndc);
    let inv_z = 1.0 / h.z;
    o.clip = vec4<f32>(ndc * inv_z, 0.0, inv_z);
    let a = h.xy * inv_z;
    o.brush = vec3<f32>(a, u.b_radius.x + 2.0 * dot(a, u.fmp));
    o.opacity = 1.0;
    return o;
}
"#;

const AFFINE_POSITION_WITH_RADIAL_GRADIENT_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    o.clip = vec4<f32>(p.xy, 0.0, p.z);
    let a = brush_coords(p.xy / p.z).xy;
    o.brush = vec3<f32>(a, u.b_radius.x + 2.0 * dot(a, u.fmp));
    o.opacity = 1.0;
    return o;
}
"#;

const POSITION_WITH_TEXTURE_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    let ndc = p.xy / p.z;
    let h = brush_coords(ndc);
    let inv_z = 1.0 / h.z;
    o.clip = vec4<f32>(ndc * inv_z, 0.0, inv_z);
    o.brush = vec3<f32>(h.xy * u.inverted_texture_size * inv_z, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

const AFFINE_POSITION_WITH_TEXTURE_BRUSH_VERTEX: &str = r#"
fn set_position(v: VertexIn) -> VertexOut {
    var o: VertexOut;
    let p = pmv(v) * vec3<f32>(v.position, 1.0);
    o.clip = vec4<f32>(p.xy, 0.0, p.z);
    let h = brush_coords(p.xy / p.z);
    o.brush = vec3<f32>(h.xy * u.inverted_texture_size, 0.0);
    o.opacity = 1.0;
    return o;
}
"#;

// ── main fragment ─────────────────────────────────────────────────────────

const MAIN_FRAGMENT_CMO: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return apply_mask(compose(src_pixel(v) * u.global_opacity, v), v);
}
"#;

const MAIN_FRAGMENT_CM: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return apply_mask(compose(src_pixel(v), v), v);
}
"#;

const MAIN_FRAGMENT_MO: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return apply_mask(src_pixel(v) * u.global_opacity, v);
}
"#;

const MAIN_FRAGMENT_M: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return apply_mask(src_pixel(v), v);
}
"#;

const MAIN_FRAGMENT_CO: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return compose(src_pixel(v) * u.global_opacity, v);
}
"#;

const MAIN_FRAGMENT_C: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return compose(src_pixel(v), v);
}
"#;

const MAIN_FRAGMENT_O: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return src_pixel(v) * u.global_opacity;
}
"#;

const MAIN_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return src_pixel(v);
}
"#;

const MAIN_FRAGMENT_IMAGE_ARRAYS: &str = r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return src_pixel(v) * v.opacity;
}
"#;

// ── source pixel ──────────────────────────────────────────────────────────

const IMAGE_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return textureSampleLevel(brush_texture, brush_sampler, v.tex_coord, 0.0);
}
"#;

const ALPHA_IMAGE_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return u.pattern_color * textureSampleLevel(brush_texture, brush_sampler, v.tex_coord, 0.0).a;
}
"#;

const NON_PREMULTIPLIED_IMAGE_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    let texel = textureSampleLevel(brush_texture, brush_sampler, v.tex_coord, 0.0);
    return vec4<f32>(texel.rgb * texel.a, texel.a);
}
"#;

const CUSTOM_IMAGE_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return custom_src_pixel(v.tex_coord);
}
"#;

const SOLID_BRUSH_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return u.fragment_color;
}
"#;

const TEXTURE_BRUSH_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return textureSampleLevel(brush_texture, brush_sampler, v.brush.xy, 0.0);
}
"#;

const ALPHA_TEXTURE_BRUSH_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return u.pattern_color * textureSampleLevel(brush_texture, brush_sampler, v.brush.xy, 0.0).a;
}
"#;

const PATTERN_BRUSH_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return u.pattern_color * textureSampleLevel(brush_texture, brush_sampler, v.brush.xy, 0.0).r;
}
"#;

const LINEAR_GRADIENT_BRUSH_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return textureSampleLevel(brush_texture, brush_sampler, vec2<f32>(v.brush.x, 0.5), 0.0);
}
"#;

const RADIAL_GRADIENT_BRUSH_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    let a = v.brush.xy;
    let b = v.brush.z;
    let c = u.sqr_fr - dot(a, a);
    let det = b * b - 4.0 * u.fmp2_m_radius2 * c;
    var result = vec4<f32>(0.0);
    if det >= 0.0 {
        let det_sqrt = sqrt(det);
        let w = max(
            (-b - det_sqrt) * u.inverse_2_fmp2_m_radius2,
            (-b + det_sqrt) * u.inverse_2_fmp2_m_radius2
        );
        if u.b_radius.y + w * u.b_radius.z >= 0.0 {
            result = textureSampleLevel(brush_texture, brush_sampler, vec2<f32>(w, 0.5), 0.0);
        }
    }
    return result;
}
"#;

const CONICAL_GRADIENT_BRUSH_SRC_FRAGMENT: &str = r#"
const INVERSE_2PI: f32 = 0.15915494309189535;

fn src_pixel(v: VertexOut) -> vec4<f32> {
    let a = v.brush.xy;
    var t: f32;
    if abs(a.y) == abs(a.x) {
        t = (atan2(-a.y + 0.002, a.x) + u.angle) * INVERSE_2PI;
    } else {
        t = (atan2(-a.y, a.x) + u.angle) * INVERSE_2PI;
    }
    return textureSampleLevel(brush_texture, brush_sampler, vec2<f32>(t - floor(t), 0.5), 0.0);
}
"#;

// Color writes are off while stencilling; the color only shows up when
// debugging stencil state.
const STENCIL_WRITE_SRC_FRAGMENT: &str = r#"
fn src_pixel(v: VertexOut) -> vec4<f32> {
    return vec4<f32>(0.98, 0.06, 0.75, 1.0);
}
"#;

// ── masks ─────────────────────────────────────────────────────────────────

const MASK_FRAGMENT: &str = r#"
fn apply_mask(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let coverage = textureSampleLevel(mask_texture, mask_sampler, v.tex_coord, 0.0).r;
    return src * coverage;
}
"#;

// Blended with (Zero, OneMinusSrcColor): dst *= 1 - alpha * coverage.
const RGB_MASK_FRAGMENT_PASS1: &str = r#"
fn apply_mask(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let coverage = textureSampleLevel(mask_texture, mask_sampler, v.tex_coord, 0.0);
    return src.a * coverage;
}
"#;

// Blended with (One, One): dst += src * coverage.
const RGB_MASK_FRAGMENT_PASS2: &str = r#"
fn apply_mask(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let coverage = textureSampleLevel(mask_texture, mask_sampler, v.tex_coord, 0.0);
    return src * coverage;
}
"#;

// ── composition ───────────────────────────────────────────────────────────

const MULTIPLY_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    return compose_separable(src, dst, s * d);
}
"#;

const SCREEN_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    return compose_separable(src, dst, s + d - s * d);
}
"#;

const OVERLAY_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    let one = vec3<f32>(1.0);
    let b = select(one - 2.0 * (one - s) * (one - d), 2.0 * s * d, d <= vec3<f32>(0.5));
    return compose_separable(src, dst, b);
}
"#;

const DARKEN_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    return compose_separable(src, dst, min(unpremultiply(src), unpremultiply(dst)));
}
"#;

const LIGHTEN_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    return compose_separable(src, dst, max(unpremultiply(src), unpremultiply(dst)));
}
"#;

const COLOR_DODGE_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    let one = vec3<f32>(1.0);
    let zero = vec3<f32>(0.0);
    let dodge = min(one, d / max(one - s, vec3<f32>(0.000001)));
    let b = select(select(dodge, one, s >= one), zero, d <= zero);
    return compose_separable(src, dst, b);
}
"#;

const COLOR_BURN_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    let one = vec3<f32>(1.0);
    let zero = vec3<f32>(0.0);
    let burn = one - min(one, (one - d) / max(s, vec3<f32>(0.000001)));
    let b = select(select(burn, zero, s <= zero), one, d >= one);
    return compose_separable(src, dst, b);
}
"#;

const HARD_LIGHT_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    let one = vec3<f32>(1.0);
    let b = select(one - 2.0 * (one - s) * (one - d), 2.0 * s * d, s <= vec3<f32>(0.5));
    return compose_separable(src, dst, b);
}
"#;

const SOFT_LIGHT_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    let one = vec3<f32>(1.0);
    let curve = select(sqrt(d), ((16.0 * d - 12.0) * d + 4.0) * d, d <= vec3<f32>(0.25));
    let darker = d - (one - 2.0 * s) * d * (one - d);
    let lighter = d + (2.0 * s - one) * (curve - d);
    let b = select(lighter, darker, s <= vec3<f32>(0.5));
    return compose_separable(src, dst, b);
}
"#;

const DIFFERENCE_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    return compose_separable(src, dst, abs(unpremultiply(src) - unpremultiply(dst)));
}
"#;

const EXCLUSION_COMPOSITION: &str = r#"
fn compose(src: vec4<f32>, v: VertexOut) -> vec4<f32> {
    let dst = background_pixel(v);
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    return compose_separable(src, dst, s + d - 2.0 * s * d);
}
"#;
