//! Path model and CPU geometry: flattening, fans, strips, dashes and
//! triangulation.

mod dasher;
pub mod flatten;
mod outline;
mod path;
mod stroker;
mod triangulate;
mod vertex_array;

pub use dasher::dash_path;
pub use outline::{device_outline, needs_device_outline};
pub(crate) use path::WeakPath;
pub use path::{FillRule, PathBuilder, PathElement, PathHints, PathId, Subpath, Subpaths, VectorPath};
pub use stroker::Stroker;
pub use triangulate::{
    IndexBuffer, StrokeParams, TRIANGULATION_LIMIT, TriangulateError, Triangulation, triangulate_fill,
    triangulate_stroke, within_triangulation_limits,
};
pub use vertex_array::VertexArray;
