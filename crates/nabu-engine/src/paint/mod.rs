//! Paint model: colors, brushes, pens, images and composition modes.
//!
//! Colors are linear premultiplied RGBA throughout. Geometry types remain
//! in `coords` and `geom`.

pub mod brush;
pub mod color;
pub mod composition;
pub mod gradient;
pub mod hints;
pub mod image;
pub mod pen;

pub use brush::{Brush, BrushKind, BrushPattern};
pub use color::Color;
pub use composition::CompositionMode;
pub use gradient::{ColorStop, Gradient, GradientKind, InterpolationMode, SpreadMode};
pub use hints::RenderHints;
pub use image::{Image, ImageError, ImageFormat, ImageKey};
pub use pen::{CapStyle, JoinStyle, Pen, PenStyle};
