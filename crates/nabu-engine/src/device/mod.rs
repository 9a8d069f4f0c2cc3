//! GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a window
//! - handing out offscreen [`WgpuContext`](crate::gpu::WgpuContext) targets on that device

mod headless;

pub use headless::{GpuInit, HeadlessGpu};
