use anyhow::{Context, Result};

use crate::gpu::{ShareGroupId, WgpuContext};

/// Initialization parameters for the headless GPU layer.
///
/// Paint targets are always `Rgba8Unorm` with a `Stencil8` attachment, so
/// only adapter and device selection is configurable here.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Backends wgpu may pick from.
    pub backends: wgpu::Backends,

    pub power_preference: wgpu::PowerPreference,

    /// Use a software adapter (e.g. on CI machines without a GPU).
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// The engine needs none; favor an empty set for portability.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

/// Owns a wgpu device with no surface.
///
/// Every context created from it shares one share group, so shader
/// programs, gradient ramps and glyph atlases are reused across targets.
pub struct HeadlessGpu {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    share_group: ShareGroupId,
}

impl HeadlessGpu {
    /// Creates a device without a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: GpuInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: init.force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("nabu-engine device"),
                required_features: init.required_features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("headless GPU: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        Ok(Self { adapter, device, queue, share_group: ShareGroupId::next() })
    }

    /// Blocking variant of [`HeadlessGpu::new`] for binaries without an
    /// executor.
    pub fn new_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    /// Creates an offscreen paint target of `width × height` pixels.
    pub fn create_context(&self, width: u32, height: u32) -> Result<WgpuContext> {
        let max = self.device.limits().max_texture_dimension_2d;
        anyhow::ensure!(
            width > 0 && height > 0 && width <= max && height <= max,
            "target size {width}x{height} outside 1..={max}"
        );
        Ok(WgpuContext::with_share_group(
            self.device.clone(),
            self.queue.clone(),
            width,
            height,
            self.share_group,
        ))
    }

    #[inline]
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn share_group(&self) -> ShareGroupId {
        self.share_group
    }
}
