//! Projection and brush matrices.
//!
//! The vertex stage receives one 3×3 matrix, packed as three columns, that
//! takes user-space points straight to clip space:
//!
//! ```text
//!   clip.x = (2/w)·X − W      clip.y = (−2/h)·Y + W      clip.w = W
//! ```
//!
//! where `(X, Y, W)` is the point mapped by the painter transform. Dividing
//! by `W` yields NDC with +Y up, so device row 0 ends up at the top.

use crate::coords::{Transform, TransformKind, Viewport};

/// Flattening floor: curves spanning the whole target stay smooth.
const MIN_INVERSE_SCALE: f32 = 0.0001;

pub(crate) type Columns = [[f32; 3]; 3];

/// Projection × `transform`, column major.
///
/// With `snap` set, translate-only transforms are rounded to whole pixels
/// (halves round down, matching raster output).
pub(crate) fn projection_columns(transform: &Transform, viewport: Viewport, snap: bool) -> Columns {
    let wf = 2.0 / viewport.width.max(1) as f32;
    let hf = -2.0 / viewport.height.max(1) as f32;
    let t = transform;

    let (mut dx, mut dy) = (t.dx(), t.dy());
    if snap && t.kind() == TransformKind::Translate {
        dx = (dx - 0.5).ceil();
        dy = (dy + 0.5).floor();
    }

    [
        [wf * t.m11 - t.m13, hf * t.m12 + t.m13, t.m13],
        [wf * t.m21 - t.m23, hf * t.m22 + t.m23, t.m23],
        [wf * dx - t.m33, hf * dy + t.m33, t.m33],
    ]
}

/// Columns for geometry already in device pixels.
pub(crate) fn device_columns(viewport: Viewport) -> Columns {
    projection_columns(&Transform::identity(), viewport, false)
}

/// User units per device pixel, used as the flattening tolerance scale.
pub(crate) fn inverse_scale(transform: &Transform) -> f32 {
    let max = transform.max_linear_coefficient();
    if max > 0.0 { (1.0 / max).max(MIN_INVERSE_SCALE) } else { 1.0 / MIN_INVERSE_SCALE }
}

/// Upload layout of a transform as a `mat3x3` uniform.
pub(crate) fn transform_columns(t: &Transform) -> Columns {
    [[t.m11, t.m12, t.m13], [t.m21, t.m22, t.m23], [t.m31, t.m32, t.m33]]
}
