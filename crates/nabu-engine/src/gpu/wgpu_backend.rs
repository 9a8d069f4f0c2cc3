//! [`RenderContext`] on wgpu.
//!
//! Paints into an offscreen `Rgba8Unorm` target with a `Stencil8`
//! attachment. State calls only update the sticky state; `draw` snapshots
//! that state plus the current program's uniform block and appends the
//! geometry to CPU-side buffers. `flush` uploads everything and replays the
//! recorded ops into render passes, splitting passes wherever the target has
//! to be copied into the background texture.
//!
//! Programs are WGSL modules validated with naga first, so a broken variant
//! is reported as a [`ProgramError`] with naga's diagnostic instead of a
//! device error.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::coords::{IRect, Viewport};

use super::context::{GpuError, ProgramError, RenderContext};
use super::stencil::{CompareFunction, StencilFaceOps, StencilOp, StencilState};
use super::types::{
    BlendFactor, BlendFunc, Capabilities, DrawCall, FilterMode, ProgramId, ProgramSource,
    ShareGroupId, TextureFormat, TextureId, TextureUnit, UniformLocation, UniformValue, WrapMode,
};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Stencil8;

/// Name of the uniform block variable every program declares.
const UNIFORM_BLOCK: &str = "u";

/// Upper bound for the reflected uniform block.
const MAX_UNIFORM_BLOCK: usize = 256;

const IDENTITY_COLUMNS: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

const STENCIL_CLEAR_WGSL: &str = r#"
@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(0.0);
}
"#;

// ── GPU types ─────────────────────────────────────────────────────────────

/// Interleaved per-vertex data (20 bytes):
///
///  offset  0  position   [f32; 2]   loc 0
///  offset  8  tex_coord  [f32; 2]   loc 1
///  offset 16  opacity    f32        loc 2
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    tex_coord: [f32; 2],
    opacity: f32,
}

impl Vertex {
    const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x2, // position
        1 => Float32x2, // tex_coord
        2 => Float32    // opacity
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }

    fn position_only_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS[..1],
        }
    }
}

/// Transform columns, one instance per draw (36 bytes, loc 3..=5).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct TransformInstance {
    columns: [[f32; 3]; 3],
}

impl TransformInstance {
    const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        3 => Float32x3,
        4 => Float32x3,
        5 => Float32x3
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<TransformInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}

// ── objects ───────────────────────────────────────────────────────────────

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: TextureFormat,
    sampling: (WrapMode, FilterMode),
}

struct GpuProgram {
    module: wgpu::ShaderModule,
    /// Byte offsets of the uniform block members.
    offsets: HashMap<String, u32>,
    /// Current uniform values; programs keep them across switches.
    block: Vec<u8>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    program: ProgramId,
    blend: Option<BlendFunc>,
    color_write: bool,
    stencil: Option<StencilState>,
}

/// Texture bound to each sampled unit, with its sampler settings.
type BindingKey = [Option<(TextureId, WrapMode, FilterMode)>; 2];

struct DrawOp {
    pipeline: PipelineKey,
    stencil_reference: u8,
    blend_constant: [f32; 4],
    scissor: IRect,
    bindings: BindingKey,
    uniform_offset: u32,
    first_index: u32,
    index_count: u32,
    instance: u32,
}

enum Op {
    Draw(DrawOp),
    ClearStencil { first_vertex: u32, value: u8 },
    Snapshot,
}

/// Offscreen wgpu implementation of [`RenderContext`].
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    size: Viewport,
    share_group: ShareGroupId,
    uniform_alignment: u32,

    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    stencil_view: wgpu::TextureView,
    background: wgpu::Texture,
    background_view: wgpu::TextureView,
    dummy_view: wgpu::TextureView,

    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    clear_pipeline: Option<wgpu::RenderPipeline>,
    samplers: HashMap<(WrapMode, FilterMode), wgpu::Sampler>,

    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, GpuProgram>,
    next_id: u32,

    // sticky state
    program: Option<ProgramId>,
    blend: Option<BlendFunc>,
    blend_constant: [f32; 4],
    color_write: bool,
    stencil: Option<StencilState>,
    scissor: Option<IRect>,
    bound: [Option<TextureId>; TextureUnit::COUNT],
    transform: [[f32; 3]; 3],

    // recorded work
    ops: Vec<Op>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    instances: Vec<TransformInstance>,
    uniforms: Vec<u8>,
    pending_clear: Option<wgpu::Color>,

    warned_missing_program: bool,
}

impl WgpuContext {
    /// Creates a context with its own share group.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        Self::with_share_group(device, queue, width, height, ShareGroupId::next())
    }

    /// Creates a context whose cached resources are shared with the other
    /// contexts of `share_group`. They must all use the same device.
    pub fn with_share_group(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        share_group: ShareGroupId,
    ) -> Self {
        let size = Viewport::new(width.max(1), height.max(1));
        let (target, target_view, stencil_view, background, background_view) =
            create_attachments(&device, size);

        let dummy = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("nabu dummy texture"),
                size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let dummy_view = dummy.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group_layout = create_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nabu paint pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment.max(MAX_UNIFORM_BLOCK as u32);

        Self {
            device,
            queue,
            size,
            share_group,
            uniform_alignment,
            target,
            target_view,
            stencil_view,
            background,
            background_view,
            dummy_view,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            clear_pipeline: None,
            samplers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            program: None,
            blend: None,
            blend_constant: [0.0; 4],
            color_write: true,
            stencil: None,
            scissor: None,
            bound: [None; TextureUnit::COUNT],
            transform: IDENTITY_COLUMNS,
            ops: Vec::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            instances: Vec::new(),
            uniforms: Vec::new(),
            pending_clear: Some(wgpu::Color::TRANSPARENT),
            warned_missing_program: false,
        }
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The color target; premultiplied RGBA8.
    #[inline]
    pub fn target(&self) -> &wgpu::Texture {
        &self.target
    }

    /// Clears color to `color` (premultiplied) and stencil to zero before
    /// the next recorded work.
    pub fn clear(&mut self, color: [f32; 4]) {
        if !self.ops.is_empty() {
            self.flush_or_warn();
        }
        let [r, g, b, a] = color.map(f64::from);
        self.pending_clear = Some(wgpu::Color { r, g, b, a });
    }

    /// Recreates the attachments at a new size; contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.flush_or_warn();
        let size = Viewport::new(width.max(1), height.max(1));
        if size == self.size {
            return;
        }
        let (target, target_view, stencil_view, background, background_view) =
            create_attachments(&self.device, size);
        self.size = size;
        self.target = target;
        self.target_view = target_view;
        self.stencil_view = stencil_view;
        self.background = background;
        self.background_view = background_view;
        self.pending_clear = Some(wgpu::Color::TRANSPARENT);
    }

    /// Flushes and reads the target back as tightly packed premultiplied
    /// RGBA8 rows.
    pub fn read_pixels(&mut self) -> Result<Vec<u8>, GpuError> {
        self.flush()?;

        let Viewport { width, height } = self.size;
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = unpadded.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nabu readback buffer"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nabu readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = mpsc::channel();
        readback.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| GpuError::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|err| GpuError::Readback(err.to_string()))?
            .map_err(|err| GpuError::Readback(err.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let mapped = readback.slice(..).get_mapped_range();
            for row in mapped.chunks_exact(bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        readback.unmap();
        Ok(pixels)
    }

    // ── helpers ───────────────────────────────────────────────────────────

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn flush_or_warn(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("WgpuContext: flush failed: {err}");
        }
    }

    fn flush_pending(&mut self) {
        if !self.ops.is_empty() {
            self.flush_or_warn();
        }
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture, GpuError> {
        self.textures.get(&id).ok_or(GpuError::UnknownTexture(id))
    }

    fn effective_scissor(&self) -> Option<IRect> {
        match self.scissor {
            None => Some(self.size.irect()),
            Some(rect) => rect.intersect(self.size.irect()),
        }
    }

    fn binding_for(&self, unit: TextureUnit) -> Option<(TextureId, WrapMode, FilterMode)> {
        let id = self.bound[unit.index()]?;
        let texture = self.textures.get(&id)?;
        Some((id, texture.sampling.0, texture.sampling.1))
    }

    fn push_uniform_snapshot(&mut self, program: ProgramId) -> u32 {
        let offset = self.uniforms.len();
        let slot = self.uniform_alignment as usize;
        self.uniforms.resize(offset + slot, 0);
        if let Some(block) = self.programs.get(&program).map(|p| &p.block) {
            let n = block.len().min(slot);
            self.uniforms[offset..offset + n].copy_from_slice(&block[..n]);
        }
        offset as u32
    }

    fn ensure_sampler(&mut self, wrap: WrapMode, filter: FilterMode) {
        if self.samplers.contains_key(&(wrap, filter)) {
            return;
        }
        let address = match wrap {
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        };
        let filter_mode = match filter {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nabu sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });
        self.samplers.insert((wrap, filter), sampler);
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(program) = self.programs.get(&key.program) else { return; };

        let write_mask = if key.color_write { wgpu::ColorWrites::ALL } else { wgpu::ColorWrites::empty() };
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("nabu paint pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::layout(), TransformInstance::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: key.blend.map(blend_state),
                    write_mask,
                })],
            }),
            primitive: triangle_list(),
            depth_stencil: Some(depth_stencil_state(key.stencil)),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline);
    }

    fn ensure_clear_pipeline(&mut self) {
        if self.clear_pipeline.is_some() {
            return;
        }
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nabu stencil clear shader"),
            source: wgpu::ShaderSource::Wgsl(STENCIL_CLEAR_WGSL.into()),
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nabu stencil clear pipeline layout"),
            bind_group_layouts: &[],
            immediate_size: 0,
        });
        let replace = StencilState::test(CompareFunction::Always, 0, 0xff)
            .with_ops(StencilFaceOps::always(StencilOp::Replace))
            .with_write_mask(0xff);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("nabu stencil clear pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::position_only_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::empty(),
                })],
            }),
            primitive: triangle_list(),
            depth_stencil: Some(depth_stencil_state(Some(replace))),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.clear_pipeline = Some(pipeline);
    }

    /// `None` if a sampler is missing; samplers are created before flushing.
    fn create_bind_group(&self, key: &BindingKey, uniforms: &wgpu::Buffer) -> Option<wgpu::BindGroup> {
        let view = |slot: Option<(TextureId, WrapMode, FilterMode)>| {
            slot.and_then(|(id, ..)| self.textures.get(&id)).map_or(&self.dummy_view, |t| &t.view)
        };
        let sampler = |slot: Option<(TextureId, WrapMode, FilterMode)>| {
            let (wrap, filter) = slot.map_or((WrapMode::ClampToEdge, FilterMode::Nearest), |(_, w, f)| (w, f));
            self.samplers.get(&(wrap, filter))
        };
        let brush_sampler = sampler(key[0])?;
        let mask_sampler = sampler(key[1])?;

        let uniform_size = NonZeroU64::new(MAX_UNIFORM_BLOCK as u64);
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nabu paint bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: uniforms,
                        offset: 0,
                        size: uniform_size,
                    }),
                },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(view(key[0])) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(brush_sampler) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(view(key[1])) },
                wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::Sampler(mask_sampler) },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&self.background_view),
                },
            ],
        }))
    }

    fn encode_snapshot(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_texture(
            self.target.as_image_copy(),
            self.background.as_image_copy(),
            wgpu::Extent3d { width: self.size.width, height: self.size.height, depth_or_array_layers: 1 },
        );
    }
}

impl RenderContext for WgpuContext {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stencil_bits: 8,
            max_texture_size: self.device.limits().max_texture_dimension_2d,
            supports_u32_indices: true,
            target_has_alpha: true,
        }
    }

    fn size(&self) -> Viewport {
        self.size
    }

    fn share_group(&self) -> ShareGroupId {
        self.share_group
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat) -> Result<TextureId, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::EmptyTexture);
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(GpuError::TextureTooLarge { width, height, max });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("nabu texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TextureId(self.alloc_id());
        self.textures.insert(
            id,
            GpuTexture { texture, view, width, height, format, sampling: Default::default() },
        );
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, region: IRect, data: &[u8]) -> Result<(), GpuError> {
        // Queue writes land before the next submission; recorded draws must
        // see the old contents.
        self.flush_pending();

        let tex = self.texture(texture)?;
        if region.is_empty()
            || region.x < 0
            || region.y < 0
            || region.right() as u32 > tex.width
            || region.bottom() as u32 > tex.height
        {
            return Err(GpuError::RegionOutOfBounds { texture, region });
        }
        let bpp = tex.format.bytes_per_texel();
        let expected = region.width as usize * region.height as usize * bpp;
        if data.len() != expected {
            return Err(GpuError::DataSize { expected, got: data.len() });
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: region.x as u32, y: region.y as u32, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width as u32 * bpp as u32),
                rows_per_image: Some(region.height as u32),
            },
            wgpu::Extent3d { width: region.width as u32, height: region.height as u32, depth_or_array_layers: 1 },
        );
        Ok(())
    }

    fn copy_texture(
        &mut self,
        src: TextureId,
        src_rect: IRect,
        dst: TextureId,
        dst_origin: (u32, u32),
    ) -> Result<(), GpuError> {
        self.flush_pending();

        let (s, d) = (self.texture(src)?, self.texture(dst)?);
        let in_src = src_rect.x >= 0
            && src_rect.y >= 0
            && !src_rect.is_empty()
            && src_rect.right() as u32 <= s.width
            && src_rect.bottom() as u32 <= s.height;
        if !in_src {
            return Err(GpuError::RegionOutOfBounds { texture: src, region: src_rect });
        }
        let dst_region = IRect::new(dst_origin.0 as i32, dst_origin.1 as i32, src_rect.width, src_rect.height);
        if dst_region.right() as u32 > d.width || dst_region.bottom() as u32 > d.height || s.format != d.format {
            return Err(GpuError::RegionOutOfBounds { texture: dst, region: dst_region });
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nabu texture copy encoder"),
        });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &s.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: src_rect.x as u32, y: src_rect.y as u32, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &d.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: dst_origin.0, y: dst_origin.1, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: src_rect.width as u32,
                height: src_rect.height as u32,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.contains_key(&texture) {
            self.flush_pending();
            self.textures.remove(&texture);
        }
        for slot in &mut self.bound {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
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
        self.ops.push(Op::Snapshot);
    }

    // ── programs ──────────────────────────────────────────────────────────

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramId, ProgramError> {
        let (offsets, block_size) = validate_and_reflect(source)?;
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&source.label),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
        });
        let id = ProgramId(self.alloc_id());
        self.programs.insert(id, GpuProgram { module, offsets, block: vec![0; block_size] });
        log::debug!("WgpuContext: created program {id:?} `{}`", source.label);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(&program) {
            return;
        }
        self.flush_pending();
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.offsets.get(name).copied().map(UniformLocation)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.program.and_then(|p| self.programs.get_mut(&p)) else { return; };
        write_uniform(&mut program.block, location.0 as usize, value);
    }

    // ── fixed function ────────────────────────────────────────────────────

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
        self.stencil = state;
    }

    fn set_scissor(&mut self, rect: Option<IRect>) {
        self.scissor = rect;
    }

    fn clear_stencil(&mut self, rect: Option<IRect>, value: u8) {
        let full = self.size.irect();
        let Some(rect) = rect.map_or(Some(full), |r| r.intersect(full)) else { return; };

        let (w, h) = (self.size.width as f32, self.size.height as f32);
        let ndc = |x: i32, y: i32| [2.0 * x as f32 / w - 1.0, 1.0 - 2.0 * y as f32 / h];
        let (tl, tr) = (ndc(rect.x, rect.y), ndc(rect.right(), rect.y));
        let (bl, br) = (ndc(rect.x, rect.bottom()), ndc(rect.right(), rect.bottom()));

        let first_vertex = self.vertices.len() as u32;
        self.vertices.extend(
            [tl, bl, br, tl, br, tr]
                .map(|position| Vertex { position, tex_coord: [0.0; 2], opacity: 1.0 }),
        );
        self.ops.push(Op::ClearStencil { first_vertex, value });
    }

    fn set_transform_columns(&mut self, columns: [[f32; 3]; 3]) {
        self.transform = columns;
    }

    // ── submission ────────────────────────────────────────────────────────

    fn draw(&mut self, call: &DrawCall<'_>) {
        let Some(program) = self.program.filter(|p| self.programs.contains_key(p)) else {
            if !self.warned_missing_program {
                log::warn!("WgpuContext: draw without a live program; skipping");
                self.warned_missing_program = true;
            }
            return;
        };
        let Some(scissor) = self.effective_scissor() else { return; };

        let triangles = call.triangle_indices();
        if triangles.is_empty() {
            return;
        }

        let base = self.vertices.len() as u32;
        self.vertices.extend(call.positions.iter().enumerate().map(|(i, p)| Vertex {
            position: p.to_array(),
            tex_coord: call.tex_coords.and_then(|t| t.get(i)).map_or([0.0; 2], |t| t.to_array()),
            opacity: call.opacities.and_then(|o| o.get(i)).copied().unwrap_or(1.0),
        }));

        let first_index = self.indices.len() as u32;
        let vertex_count = call.positions.len() as u32;
        self.indices.extend(triangles.iter().filter(|&&i| i < vertex_count).map(|i| base + i));
        let index_count = self.indices.len() as u32 - first_index;

        let instance = self.instances.len() as u32;
        self.instances.push(TransformInstance { columns: self.transform });

        let uniform_offset = self.push_uniform_snapshot(program);
        let stencil = self.stencil;
        self.ops.push(Op::Draw(DrawOp {
            pipeline: PipelineKey {
                program,
                blend: self.blend,
                color_write: self.color_write,
                stencil: stencil.map(StencilState::without_reference),
            },
            stencil_reference: stencil.map_or(0, |s| s.reference),
            blend_constant: self.blend_constant,
            scissor,
            bindings: [self.binding_for(TextureUnit::Brush), self.binding_for(TextureUnit::Mask)],
            uniform_offset,
            first_index,
            index_count,
            instance,
        }));
    }

    fn flush(&mut self) -> Result<(), GpuError> {
        if self.ops.is_empty() && self.pending_clear.is_none() {
            return Ok(());
        }
        let ops = std::mem::take(&mut self.ops);

        // Everything the passes borrow is created up front.
        self.ensure_sampler(WrapMode::ClampToEdge, FilterMode::Nearest);
        let mut has_clear = false;
        for op in &ops {
            match op {
                Op::Draw(draw) => {
                    self.ensure_pipeline(draw.pipeline);
                    for (_, wrap, filter) in draw.bindings.iter().flatten() {
                        self.ensure_sampler(*wrap, *filter);
                    }
                }
                Op::ClearStencil { .. } => has_clear = true,
                Op::Snapshot => {}
            }
        }
        if has_clear {
            self.ensure_clear_pipeline();
        }

        let vertices = std::mem::take(&mut self.vertices);
        let indices = std::mem::take(&mut self.indices);
        let instances = std::mem::take(&mut self.instances);
        let mut uniforms = std::mem::take(&mut self.uniforms);
        if uniforms.is_empty() {
            uniforms.resize(self.uniform_alignment as usize, 0);
        }

        let buffer = |label: &str, contents: &[u8], usage: wgpu::BufferUsages| {
            // Zero-sized buffers cannot be bound; keep one element around.
            let contents = if contents.is_empty() { &[0u8; 64][..] } else { contents };
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            })
        };
        let vbo = buffer("nabu vertex buffer", bytemuck::cast_slice(&vertices), wgpu::BufferUsages::VERTEX);
        let ibo = buffer("nabu index buffer", bytemuck::cast_slice(&indices), wgpu::BufferUsages::INDEX);
        let instance_vbo =
            buffer("nabu transform buffer", bytemuck::cast_slice(&instances), wgpu::BufferUsages::VERTEX);
        let ubo = buffer("nabu uniform buffer", &uniforms, wgpu::BufferUsages::UNIFORM);

        let mut bind_groups: HashMap<BindingKey, wgpu::BindGroup> = HashMap::new();
        for op in &ops {
            if let Op::Draw(draw) = op {
                if bind_groups.contains_key(&draw.bindings) {
                    continue;
                }
                if let Some(group) = self.create_bind_group(&draw.bindings, &ubo) {
                    bind_groups.insert(draw.bindings, group);
                }
            }
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nabu paint encoder"),
        });

        let mut clear = self.pending_clear.take();
        let segments: Vec<&[Op]> = ops.split(|op| matches!(op, Op::Snapshot)).collect();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                self.encode_snapshot(&mut encoder);
            }
            if segment.is_empty() && clear.is_none() {
                continue;
            }

            let (color_load, stencil_load) = match clear.take() {
                Some(color) => (wgpu::LoadOp::Clear(color), wgpu::LoadOp::Clear(0)),
                None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
            };
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("nabu paint pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: color_load, store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.stencil_view,
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations { load: stencil_load, store: wgpu::StoreOp::Store }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_vertex_buffer(0, vbo.slice(..));
            rpass.set_vertex_buffer(1, instance_vbo.slice(..));
            rpass.set_index_buffer(ibo.slice(..), wgpu::IndexFormat::Uint32);

            for op in segment.iter() {
                match op {
                    Op::Draw(draw) => {
                        let Some(pipeline) = self.pipelines.get(&draw.pipeline) else { continue; };
                        let Some(bind_group) = bind_groups.get(&draw.bindings) else { continue; };
                        let [r, g, b, a] = draw.blend_constant.map(f64::from);
                        rpass.set_pipeline(pipeline);
                        rpass.set_bind_group(0, bind_group, &[draw.uniform_offset]);
                        rpass.set_stencil_reference(draw.stencil_reference as u32);
                        rpass.set_blend_constant(wgpu::Color { r, g, b, a });
                        let s = draw.scissor;
                        rpass.set_scissor_rect(s.x as u32, s.y as u32, s.width as u32, s.height as u32);
                        rpass.draw_indexed(
                            draw.first_index..draw.first_index + draw.index_count,
                            0,
                            draw.instance..draw.instance + 1,
                        );
                    }
                    Op::ClearStencil { first_vertex, value } => {
                        let Some(pipeline) = self.clear_pipeline.as_ref() else { continue; };
                        rpass.set_pipeline(pipeline);
                        rpass.set_stencil_reference(*value as u32);
                        rpass.set_scissor_rect(0, 0, self.size.width, self.size.height);
                        rpass.draw(*first_vertex..*first_vertex + 6, 0..1);
                    }
                    Op::Snapshot => {}
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn reset_state(&mut self) {
        self.program = None;
        self.blend = None;
        self.blend_constant = [0.0; 4];
        self.color_write = true;
        self.stencil = None;
        self.scissor = None;
        self.bound = [None; TextureUnit::COUNT];
        self.transform = IDENTITY_COLUMNS;
    }
}

// ── construction helpers ──────────────────────────────────────────────────

fn create_attachments(
    device: &wgpu::Device,
    size: Viewport,
) -> (wgpu::Texture, wgpu::TextureView, wgpu::TextureView, wgpu::Texture, wgpu::TextureView) {
    let extent = wgpu::Extent3d { width: size.width, height: size.height, depth_or_array_layers: 1 };
    let texture = |label: &str, format: wgpu::TextureFormat, usage: wgpu::TextureUsages| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    };

    let target = texture(
        "nabu color target",
        TARGET_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
    );
    let stencil = texture("nabu stencil", STENCIL_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT);
    let background = texture(
        "nabu background",
        TARGET_FORMAT,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );

    let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let stencil_view = stencil.create_view(&wgpu::TextureViewDescriptor::default());
    let background_view = background.create_view(&wgpu::TextureViewDescriptor::default());
    (target, target_view, stencil_view, background, background_view)
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    let sampler = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("nabu paint bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(MAX_UNIFORM_BLOCK as u64),
                },
                count: None,
            },
            texture(1),
            sampler(2),
            texture(3),
            sampler(4),
            texture(5),
        ],
    })
}

fn triangle_list() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

// ── state conversion ──────────────────────────────────────────────────────

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Alpha8 => wgpu::TextureFormat::R8Unorm,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
    }
}

fn blend_state(func: BlendFunc) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(func.src),
        dst_factor: blend_factor(func.dst),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: component, alpha: component }
}

fn compare_function(compare: CompareFunction) -> wgpu::CompareFunction {
    match compare {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

fn depth_stencil_state(stencil: Option<StencilState>) -> wgpu::DepthStencilState {
    let stencil = match stencil {
        None => wgpu::StencilState::default(),
        Some(s) => {
            let face = |ops: StencilFaceOps| wgpu::StencilFaceState {
                compare: compare_function(s.compare),
                fail_op: stencil_operation(ops.fail),
                depth_fail_op: stencil_operation(ops.fail),
                pass_op: stencil_operation(ops.pass),
            };
            wgpu::StencilState {
                front: face(s.front),
                back: face(s.back),
                read_mask: s.read_mask as u32,
                write_mask: s.write_mask as u32,
            }
        }
    };
    wgpu::DepthStencilState {
        format: STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil,
        bias: wgpu::DepthBiasState::default(),
    }
}

// ── programs ──────────────────────────────────────────────────────────────

/// Parses and validates `source`, returning the uniform block member
/// offsets and the block size.
fn validate_and_reflect(source: &ProgramSource) -> Result<(HashMap<String, u32>, usize), ProgramError> {
    let fail = |log: String| ProgramError { label: source.label.clone(), log };

    let module = naga::front::wgsl::parse_str(&source.wgsl).map_err(|err| fail(err.emit_to_string(&source.wgsl)))?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default())
        .validate(&module)
        .map_err(|err| fail(err.emit_to_string(&source.wgsl)))?;

    for entry in ["vs_main", "fs_main"] {
        if !module.entry_points.iter().any(|ep| ep.name == entry) {
            return Err(fail(format!("missing entry point `{entry}`")));
        }
    }

    let block_ty = module
        .global_variables
        .iter()
        .find(|(_, var)| var.name.as_deref() == Some(UNIFORM_BLOCK))
        .map(|(_, var)| var.ty)
        .ok_or_else(|| fail(format!("missing uniform block `{UNIFORM_BLOCK}`")))?;

    let naga::TypeInner::Struct { members, span } = &module.types[block_ty].inner else {
        return Err(fail(format!("uniform block `{UNIFORM_BLOCK}` is not a struct")));
    };
    if *span as usize > MAX_UNIFORM_BLOCK {
        return Err(fail(format!("uniform block spans {span} bytes, at most {MAX_UNIFORM_BLOCK} supported")));
    }

    let offsets = members
        .iter()
        .filter_map(|m| m.name.clone().map(|name| (name, m.offset)))
        .collect();
    Ok((offsets, *span as usize))
}

/// Writes `value` at `offset` using the WGSL uniform layout (matrix columns
/// padded to 16 bytes).
fn write_uniform(block: &mut [u8], offset: usize, value: UniformValue) {
    let mut put = |at: usize, floats: &[f32]| {
        let bytes: &[u8] = bytemuck::cast_slice(floats);
        if let Some(dst) = block.get_mut(at..at + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
    };
    match value {
        UniformValue::Float(v) => put(offset, &[v]),
        UniformValue::Vec2(v) => put(offset, &v),
        UniformValue::Vec3(v) => put(offset, &v),
        UniformValue::Vec4(v) => put(offset, &v),
        UniformValue::Mat3(m) => {
            for (i, column) in m.iter().enumerate() {
                put(offset + 16 * i, column);
            }
        }
    }
}
