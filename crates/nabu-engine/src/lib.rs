//! Nabu engine crate.
//!
//! GPU paint engine for immediate-mode 2D vector graphics: paths, strokes,
//! gradients, images and text are turned into stencil passes, shader variant
//! selections and draw calls against a [`gpu::RenderContext`].

pub mod logging;
pub mod config;

pub mod coords;
pub mod paint;
pub mod geom;
pub mod gpu;
pub mod shader;
pub mod cache;
pub mod text;
pub mod engine;
pub mod device;

pub use config::EngineConfig;
pub use engine::PaintEngine;
