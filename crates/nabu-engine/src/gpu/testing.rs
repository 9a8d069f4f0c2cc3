//! Software [`RenderContext`] for tests.
//!
//! Records every call and rasterizes draws into an RGBA float buffer plus an
//! 8-bit stencil buffer. Fragments are shaded with the current program's
//! `fragment_color` uniform (opaque white when unset); stencil, scissor,
//! color-write and blend state are honored. Pixel centers are sampled with a
//! top-left fill rule, so adjacent triangles never touch a pixel twice.

use std::collections::HashMap;

use crate::coords::{IRect, Vec2, Viewport};

use super::context::{GpuError, ProgramError, RenderContext};
use super::stencil::StencilState;
use super::types::{
    BlendFactor, BlendFunc, Capabilities, DrawCall, FilterMode, Primitive, ProgramId,
    ProgramSource, ShareGroupId, TextureFormat, TextureId, TextureUnit, UniformLocation,
    UniformValue, WrapMode,
};

/// State snapshot of one `draw`.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub primitive: Primitive,
    pub vertex_count: usize,
    pub indexed: bool,
    pub has_tex_coords: bool,
    pub has_opacities: bool,
    pub program: Option<ProgramId>,
    pub blend: Option<BlendFunc>,
    pub color_write: bool,
    pub stencil: Option<StencilState>,
    pub scissor: Option<IRect>,
    pub textures: [Option<TextureId>; TextureUnit::COUNT],
    pub transform: [[f32; 3]; 3],
    pub positions: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateTexture { id: TextureId, width: u32, height: u32, format: TextureFormat },
    UploadTexture { id: TextureId, region: IRect },
    CopyTexture { src: TextureId, dst: TextureId },
    DeleteTexture(TextureId),
    CreateProgram { id: ProgramId, label: String },
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    ClearStencil { rect: Option<IRect>, value: u8 },
    SnapshotBackground,
    Draw(DrawRecord),
    Flush,
    ResetState,
}

struct Texture {
    width: u32,
    height: u32,
    format: TextureFormat,
    data: Vec<u8>,
    sampling: (WrapMode, FilterMode),
}

struct Program {
    label: String,
    wgsl: String,
    uniforms: HashMap<u32, UniformValue>,
}

/// Stable location derived from the uniform name.
fn name_location(name: &str) -> u32 {
    // FNV-1a
    name.bytes().fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193))
}

pub struct RecordingContext {
    size: Viewport,
    caps: Capabilities,
    share_group: ShareGroupId,
    calls: Vec<Call>,

    textures: HashMap<TextureId, Texture>,
    programs: HashMap<ProgramId, Program>,
    next_id: u32,
    programs_created: usize,
    textures_created: usize,
    fail_marker: Option<String>,

    program: Option<ProgramId>,
    blend: Option<BlendFunc>,
    blend_constant: [f32; 4],
    color_write: bool,
    stencil_state: Option<StencilState>,
    scissor: Option<IRect>,
    bound: [Option<TextureId>; TextureUnit::COUNT],
    transform: [[f32; 3]; 3],

    color: Vec<[f32; 4]>,
    stencil: Vec<u8>,
}

impl RecordingContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capabilities(
            width,
            height,
            Capabilities {
                stencil_bits: 8,
                max_texture_size: 4096,
                supports_u32_indices: true,
                target_has_alpha: true,
            },
        )
    }

    pub fn with_capabilities(width: u32, height: u32, caps: Capabilities) -> Self {
        let n = width as usize * height as usize;
        Self {
            size: Viewport::new(width, height),
            caps,
            share_group: ShareGroupId::next(),
            calls: Vec::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            programs_created: 0,
            textures_created: 0,
            fail_marker: None,
            program: None,
            blend: None,
            blend_constant: [0.0; 4],
            color_write: true,
            stencil_state: None,
            scissor: None,
            bound: [None; TextureUnit::COUNT],
            transform: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            color: vec![[0.0; 4]; n],
            stencil: vec![0; n],
        }
    }

    /// Programs whose source contains `marker` fail to build.
    pub fn fail_programs_containing(&mut self, marker: impl Into<String>) {
        self.fail_marker = Some(marker.into());
    }

    pub fn set_share_group(&mut self, group: ShareGroupId) {
        self.share_group = group;
    }

    // ── inspection ────────────────────────────────────────────────────────

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> Vec<&DrawRecord> {
        self.calls
            .iter()
            .filter_map(|c| if let Call::Draw(d) = c { Some(d) } else { None })
            .collect()
    }

    /// Draws that write the stencil buffer.
    pub fn stencil_draws(&self) -> usize {
        self.draws().iter().filter(|d| d.stencil.is_some_and(|s| s.write_mask != 0)).count()
    }

    pub fn stencil_clears(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::ClearStencil { .. })).count()
    }

    pub fn programs_created(&self) -> usize {
        self.programs_created
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn program_label(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(&id).map(|p| p.label.as_str())
    }

    pub fn program_source(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(&id).map(|p| p.wgsl.as_str())
    }

    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.programs.get(&program)?.uniforms.get(&name_location(name)).copied()
    }

    pub fn texture_data(&self, id: TextureId) -> Option<&[u8]> {
        self.textures.get(&id).map(|t| t.data.as_slice())
    }

    pub fn texture_sampling(&self, id: TextureId) -> Option<(WrapMode, FilterMode)> {
        self.textures.get(&id).map(|t| t.sampling)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.color[(y * self.size.width + x) as usize]
    }

    pub fn stencil_at(&self, x: u32, y: u32) -> u8 {
        self.stencil[(y * self.size.width + x) as usize]
    }

    /// Pixels with non-zero alpha.
    pub fn covered_pixels(&self) -> usize {
        self.color.iter().filter(|c| c[3] > 0.0).count()
    }

    pub fn is_covered(&self, x: u32, y: u32) -> bool {
        self.pixel(x, y)[3] > 0.0
    }

    pub fn clear_color(&mut self) {
        self.color.iter_mut().for_each(|c| *c = [0.0; 4]);
    }

    // ── raster ────────────────────────────────────────────────────────────

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn to_device(&self, p: Vec2) -> (Vec2, f32) {
        let [c0, c1, c2] = self.transform;
        let x = c0[0] * p.x + c1[0] * p.y + c2[0];
        let y = c0[1] * p.x + c1[1] * p.y + c2[1];
        let w = c0[2] * p.x + c1[2] * p.y + c2[2];
        let w = if w.abs() < 1e-9 { 1e-9 } else { w };
        let (nx, ny) = (x / w, y / w);
        let dev = Vec2::new(
            (nx + 1.0) * 0.5 * self.size.width as f32,
            (1.0 - ny) * 0.5 * self.size.height as f32,
        );
        (dev, w)
    }

    fn shade(&self) -> [f32; 4] {
        let color = self
            .program
            .and_then(|p| self.programs.get(&p))
            .and_then(|p| p.uniforms.get(&name_location("fragment_color")));
        match color {
            Some(UniformValue::Vec4(c)) => *c,
            _ => [1.0; 4],
        }
    }

    fn factor(&self, f: BlendFactor, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let k = self.blend_constant;
        match f {
            BlendFactor::Zero => [0.0; 4],
            BlendFactor::One => [1.0; 4],
            BlendFactor::SrcColor => src,
            BlendFactor::OneMinusSrcColor => src.map(|v| 1.0 - v),
            BlendFactor::SrcAlpha => [src[3]; 4],
            BlendFactor::OneMinusSrcAlpha => [1.0 - src[3]; 4],
            BlendFactor::DstColor => dst,
            BlendFactor::OneMinusDstColor => dst.map(|v| 1.0 - v),
            BlendFactor::DstAlpha => [dst[3]; 4],
            BlendFactor::OneMinusDstAlpha => [1.0 - dst[3]; 4],
            BlendFactor::ConstantColor => k,
            BlendFactor::OneMinusConstantColor => k.map(|v| 1.0 - v),
        }
    }

    fn write_fragment(&mut self, x: u32, y: u32, front: bool) {
        if let Some(s) = self.scissor {
            if !s.contains(x as i32, y as i32) {
                return;
            }
        }
        let i = (y * self.size.width + x) as usize;
        if let Some(state) = self.stencil_state {
            let (updated, passed) = state.process(self.stencil[i], front);
            self.stencil[i] = updated;
            if !passed {
                return;
            }
        }
        if !self.color_write {
            return;
        }
        let src = self.shade();
        let dst = self.color[i];
        self.color[i] = match self.blend {
            None => src,
            Some(b) => {
                let sf = self.factor(b.src, src, dst);
                let df = self.factor(b.dst, src, dst);
                std::array::from_fn(|c| (src[c] * sf[c] + dst[c] * df[c]).clamp(0.0, 1.0))
            }
        };
    }

    fn raster_triangle(&mut self, a: Vec2, b: Vec2, c: Vec2, front: bool) {
        let edge = |p: Vec2, q: Vec2, r: Vec2| (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
        let area = edge(a, b, c);
        if area == 0.0 || !area.is_finite() {
            return;
        }
        let (a, b, c) = if area > 0.0 { (a, b, c) } else { (a, c, b) };

        // Top edge: horizontal going +x; left edge: going up.
        let owns = |p: Vec2, q: Vec2| (p.y == q.y && q.x > p.x) || q.y < p.y;
        let inside = |w: f32, p: Vec2, q: Vec2| w > 0.0 || (w == 0.0 && owns(p, q));

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as u32).min(self.size.width);
        let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as u32).min(self.size.height);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                if inside(edge(a, b, p), a, b) && inside(edge(b, c, p), b, c) && inside(edge(c, a, p), c, a) {
                    self.write_fragment(x, y, front);
                }
            }
        }
    }
}

impl RenderContext for RecordingContext {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn size(&self) -> Viewport {
        self.size
    }

    fn share_group(&self) -> ShareGroupId {
        self.share_group
    }

    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat) -> Result<TextureId, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::EmptyTexture);
        }
        let max = self.caps.max_texture_size;
        if width > max || height > max {
            return Err(GpuError::TextureTooLarge { width, height, max });
        }
        let id = TextureId(self.alloc_id());
        let data = vec![0; width as usize * height as usize * format.bytes_per_texel()];
        self.textures.insert(id, Texture { width, height, format, data, sampling: Default::default() });
        self.textures_created += 1;
        self.calls.push(Call::CreateTexture { id, width, height, format });
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, region: IRect, data: &[u8]) -> Result<(), GpuError> {
        let tex = self.textures.get_mut(&texture).ok_or(GpuError::UnknownTexture(texture))?;
        let bounds = IRect::new(0, 0, tex.width as i32, tex.height as i32);
        if region.is_empty() || bounds.intersect(region) != Some(region) {
            return Err(GpuError::RegionOutOfBounds { texture, region });
        }
        let bpp = tex.format.bytes_per_texel();
        let expected = region.width as usize * region.height as usize * bpp;
        if data.len() != expected {
            return Err(GpuError::DataSize { expected, got: data.len() });
        }
        let row = region.width as usize * bpp;
        for y in 0..region.height as usize {
            let dst = ((region.y as usize + y) * tex.width as usize + region.x as usize) * bpp;
            tex.data[dst..dst + row].copy_from_slice(&data[y * row..(y + 1) * row]);
        }
        self.calls.push(Call::UploadTexture { id: texture, region });
        Ok(())
    }

    fn copy_texture(
        &mut self,
        src: TextureId,
        src_rect: IRect,
        dst: TextureId,
        dst_origin: (u32, u32),
    ) -> Result<(), GpuError> {
        let (src_w, bpp, pixels) = {
            let s = self.textures.get(&src).ok_or(GpuError::UnknownTexture(src))?;
            let bounds = IRect::new(0, 0, s.width as i32, s.height as i32);
            if bounds.intersect(src_rect) != Some(src_rect) {
                return Err(GpuError::RegionOutOfBounds { texture: src, region: src_rect });
            }
            (s.width as usize, s.format.bytes_per_texel(), s.data.clone())
        };
        let d = self.textures.get_mut(&dst).ok_or(GpuError::UnknownTexture(dst))?;
        let region = IRect::new(dst_origin.0 as i32, dst_origin.1 as i32, src_rect.width, src_rect.height);
        let bounds = IRect::new(0, 0, d.width as i32, d.height as i32);
        if bounds.intersect(region) != Some(region) || d.format.bytes_per_texel() != bpp {
            return Err(GpuError::RegionOutOfBounds { texture: dst, region });
        }
        let row = src_rect.width as usize * bpp;
        for y in 0..src_rect.height as usize {
            let s = ((src_rect.y as usize + y) * src_w + src_rect.x as usize) * bpp;
            let t = ((region.y as usize + y) * d.width as usize + region.x as usize) * bpp;
            d.data[t..t + row].copy_from_slice(&pixels[s..s + row]);
        }
        self.calls.push(Call::CopyTexture { src, dst });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        for slot in &mut self.bound {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
        self.calls.push(Call::DeleteTexture(texture));
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn set_texture_sampling(&mut self, texture: TextureId, wrap: WrapMode, filter: FilterMode) {
        if let Some(t) = self.textures.get_mut(&texture) {
            t.sampling = (wrap, filter);
        }
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: Option<TextureId>) {
        self.bound[unit.index()] = texture;
    }

    fn snapshot_background(&mut self) {
        self.calls.push(Call::SnapshotBackground);
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramId, ProgramError> {
        if let Some(marker) = &self.fail_marker {
            if source.wgsl.contains(marker.as_str()) {
                return Err(ProgramError { label: source.label.clone(), log: format!("rejected `{marker}`") });
            }
        }
        let id = ProgramId(self.alloc_id());
        self.programs.insert(
            id,
            Program { label: source.label.clone(), wgsl: source.wgsl.clone(), uniforms: HashMap::new() },
        );
        self.programs_created += 1;
        self.calls.push(Call::CreateProgram { id, label: source.label.clone() });
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.program == Some(program) {
            self.program = None;
        }
        self.calls.push(Call::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.calls.push(Call::UseProgram(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get(&program)?;
        p.wgsl.contains(name).then(|| UniformLocation(name_location(name)))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(p) = self.program.and_then(|id| self.programs.get_mut(&id)) else { return };
        p.uniforms.insert(location.0, value);
    }

    fn set_blend(&mut self, blend: Option<BlendFunc>) {
        self.blend = blend;
    }

    fn set_blend_constant(&mut self, color: [f32; 4]) {
        self.blend_constant = color;
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.color_write = enabled;
    }

    fn set_stencil(&mut self, state: Option<StencilState>) {
        self.stencil_state = state;
    }

    fn set_scissor(&mut self, rect: Option<IRect>) {
        self.scissor = rect;
    }

    fn clear_stencil(&mut self, rect: Option<IRect>, value: u8) {
        let full = self.size.irect();
        let area = rect.map_or(Some(full), |r| full.intersect(r));
        if let Some(r) = area {
            for y in r.y..r.bottom() {
                for x in r.x..r.right() {
                    self.stencil[(y as u32 * self.size.width + x as u32) as usize] = value;
                }
            }
        }
        self.calls.push(Call::ClearStencil { rect, value });
    }

    fn set_transform_columns(&mut self, columns: [[f32; 3]; 3]) {
        self.transform = columns;
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        let record = DrawRecord {
            primitive: call.primitive,
            vertex_count: call.element_count(),
            indexed: call.indices.is_some(),
            has_tex_coords: call.tex_coords.is_some(),
            has_opacities: call.opacities.is_some(),
            program: self.program,
            blend: self.blend,
            color_write: self.color_write,
            stencil: self.stencil_state,
            scissor: self.scissor,
            textures: self.bound,
            transform: self.transform,
            positions: call.positions.to_vec(),
        };
        self.calls.push(Call::Draw(record));

        let tris = call.triangle_indices();
        for t in tris.chunks_exact(3) {
            let [a, b, c] = [t[0], t[1], t[2]].map(|i| call.positions.get(i as usize).copied());
            let (Some(a), Some(b), Some(c)) = (a, b, c) else {
                continue;
            };
            let ((da, _), (db, _), (dc, _)) = (self.to_device(a), self.to_device(b), self.to_device(c));
            // Facing is decided in normalized device space (y up).
            let signed = (db.x - da.x) * (dc.y - da.y) - (db.y - da.y) * (dc.x - da.x);
            let front = signed < 0.0;
            self.raster_triangle(da, db, dc, front);
        }
    }

    fn flush(&mut self) -> Result<(), GpuError> {
        self.calls.push(Call::Flush);
        Ok(())
    }

    fn reset_state(&mut self) {
        self.program = None;
        self.blend = None;
        self.color_write = true;
        self.stencil_state = None;
        self.scissor = None;
        self.bound = [None; TextureUnit::COUNT];
        self.calls.push(Call::ResetState);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::stencil::{CompareFunction, HIGH_BIT, StencilFaceOps, StencilOp};

    /// Columns mapping device pixels straight to clip space.
    fn pixel_columns(w: f32, h: f32) -> [[f32; 3]; 3] {
        [[2.0 / w, 0.0, 0.0], [0.0, -2.0 / h, 0.0], [-1.0, 1.0, 1.0]]
    }

    fn quad(x0: f32, y0: f32, x1: f32, y1: f32) -> [Vec2; 4] {
        [Vec2::new(x0, y0), Vec2::new(x1, y0), Vec2::new(x1, y1), Vec2::new(x0, y1)]
    }

    #[test]
    fn adjacent_triangles_cover_each_pixel_once() {
        let mut ctx = RecordingContext::new(8, 8);
        ctx.set_transform_columns(pixel_columns(8.0, 8.0));
        ctx.set_stencil(Some(
            StencilState::test(CompareFunction::Always, 0, 0xff)
                .with_ops(StencilFaceOps::always(StencilOp::IncrementWrap))
                .with_write_mask(0xff),
        ));
        ctx.set_color_write(false);
        let q = quad(1.0, 1.0, 5.0, 4.0);
        ctx.draw(&DrawCall::new(Primitive::TriangleFan, &q));
        let ones = (0..8).flat_map(|y| (0..8).map(move |x| (x, y))).filter(|&(x, y)| ctx.stencil_at(x, y) == 1).count();
        assert_eq!(ones, 12);
        assert!((0..8).all(|y| (0..8).all(|x| ctx.stencil_at(x, y) <= 1)));
    }

    #[test]
    fn stencil_test_masks_color() {
        let mut ctx = RecordingContext::new(4, 4);
        ctx.set_transform_columns(pixel_columns(4.0, 4.0));
        ctx.clear_stencil(Some(IRect::new(0, 0, 2, 4)), HIGH_BIT);
        ctx.set_stencil(Some(StencilState::test(CompareFunction::Equal, HIGH_BIT, HIGH_BIT)));
        let q = quad(0.0, 0.0, 4.0, 4.0);
        ctx.draw(&DrawCall::new(Primitive::TriangleFan, &q));
        assert_eq!(ctx.covered_pixels(), 8);
        assert!(ctx.is_covered(1, 3));
        assert!(!ctx.is_covered(2, 0));
    }

    #[test]
    fn scissor_and_blend() {
        let mut ctx = RecordingContext::new(4, 4);
        ctx.set_transform_columns(pixel_columns(4.0, 4.0));
        ctx.set_scissor(Some(IRect::new(0, 0, 1, 1)));
        ctx.set_blend(Some(BlendFunc::new(BlendFactor::ConstantColor, BlendFactor::Zero)));
        ctx.set_blend_constant([0.5; 4]);
        let q = quad(0.0, 0.0, 4.0, 4.0);
        ctx.draw(&DrawCall::new(Primitive::TriangleFan, &q));
        assert_eq!(ctx.covered_pixels(), 1);
        assert_eq!(ctx.pixel(0, 0), [0.5; 4]);
    }

    #[test]
    fn uploads_and_copies_move_texels() {
        let mut ctx = RecordingContext::new(1, 1);
        let a = ctx.create_texture(2, 2, TextureFormat::Alpha8).unwrap();
        let b = ctx.create_texture(4, 4, TextureFormat::Alpha8).unwrap();
        ctx.upload_texture(a, IRect::new(0, 0, 2, 2), &[1, 2, 3, 4]).unwrap();
        ctx.copy_texture(a, IRect::new(0, 0, 2, 2), b, (2, 2)).unwrap();
        let data = ctx.texture_data(b).unwrap();
        assert_eq!(&data[10..12], &[1, 2]);
        assert_eq!(&data[14..16], &[3, 4]);
        assert!(matches!(
            ctx.upload_texture(a, IRect::new(1, 1, 2, 2), &[0; 4]),
            Err(GpuError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn failing_programs() {
        let mut ctx = RecordingContext::new(1, 1);
        ctx.fail_programs_containing("broken");
        let bad = ProgramSource { label: "bad".into(), wgsl: "broken".into() };
        assert!(ctx.create_program(&bad).is_err());
        let good = ProgramSource { label: "good".into(), wgsl: "fragment_color".into() };
        let id = ctx.create_program(&good).unwrap();
        assert!(ctx.uniform_location(id, "fragment_color").is_some());
        assert!(ctx.uniform_location(id, "angle").is_none());
    }
}
