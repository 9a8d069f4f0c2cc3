//! Coordinate and geometry types shared across the engine.
//!
//! Canonical CPU space:
//! - Device pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Clip space conversion happens on the GPU through the packed
//! projection-times-transform columns (see `engine::matrix`).

mod irect;
mod rect;
mod transform;
mod vec2;
mod viewport;

pub use irect::IRect;
pub(crate) use irect::{region_intersect, region_subtract};
pub use rect::Rect;
pub use transform::{Transform, TransformKind};
pub use vec2::Vec2;
pub use viewport::Viewport;
