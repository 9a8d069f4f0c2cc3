//! Device-space outlines for pens the strip stroker cannot handle.
//!
//! A cosmetic pen keeps its device width only under transforms that scale
//! uniformly; under anything else the path is mapped to device pixels first
//! and stroked there.

use crate::coords::Transform;
use crate::paint::Pen;

use super::dasher::dash_path;
use super::path::VectorPath;
use super::triangulate::{StrokeParams, Triangulation, TriangulateError, triangulate_stroke};

/// True when `pen` must be stroked through [`device_outline`].
pub fn needs_device_outline(pen: &Pen, transform: &Transform) -> bool {
    pen.is_cosmetic() && !scales_uniformly(transform)
}

/// Affine with a linear part that is a rotation times a uniform scale.
fn scales_uniformly(t: &Transform) -> bool {
    if !t.is_affine() {
        return false;
    }
    let col_x = t.m11 * t.m11 + t.m12 * t.m12;
    let col_y = t.m21 * t.m21 + t.m22 * t.m22;
    let skew = t.m11 * t.m21 + t.m12 * t.m22;
    let tol = 1e-4 * col_x.max(col_y).max(1.0);
    (col_x - col_y).abs() <= tol && skew.abs() <= tol
}

/// Strokes `path` after mapping it through `transform`.
///
/// The result is in device pixels and should be drawn with an identity
/// matrix. Triangles overlap at joins.
pub fn device_outline(
    path: &VectorPath,
    transform: &Transform,
    pen: &Pen,
    wide_indices: bool,
) -> Result<Triangulation, TriangulateError> {
    let mut device = path.transformed(transform);
    let width = if pen.width > 0.0 { pen.width } else { 1.0 };

    if let Some(pattern) = pen.dash_pattern() {
        device = dash_path(&device, &pattern, pen.dash_offset, width, 1.0);
    }

    let params = StrokeParams {
        width,
        cap: pen.cap,
        join: pen.join,
        miter_limit: pen.miter_limit,
        tolerance: 0.25,
    };
    triangulate_stroke(&device, params, wide_indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Rect, Vec2};
    use crate::geom::PathBuilder;
    use crate::paint::{CapStyle, Color, PenStyle};

    fn perspective() -> Transform {
        Transform::new(1.0, 0.0, 0.001, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn only_cosmetic_pens_under_distorting_transforms() {
        let hair = Pen::solid(Color::BLACK, 0.0);
        let wide = Pen::solid(Color::BLACK, 3.0);
        assert!(needs_device_outline(&hair, &perspective()));
        assert!(!needs_device_outline(&hair, &Transform::scale(2.0, 2.0)));
        assert!(!needs_device_outline(&hair, &Transform::rotation(0.7)));
        assert!(needs_device_outline(&hair, &Transform::scale(1.0, 3.0)));
        assert!(!needs_device_outline(&wide, &perspective()));
    }

    #[test]
    fn outline_lives_in_device_space() {
        let mut b = PathBuilder::new();
        b.move_to(Vec2::new(0.0, 10.0)).line_to(Vec2::new(100.0, 10.0));
        let pen = Pen::solid(Color::BLACK, 0.0).with_cap(CapStyle::Flat);
        let t = device_outline(&b.build(), &Transform::translation(5.0, 5.0), &pen, true).unwrap();
        let bounds = Rect::bounding(t.vertices.iter().copied()).unwrap();
        assert!((bounds.min().x - 5.0).abs() < 1e-3);
        assert!((bounds.height() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn dashed_outline_has_gaps() {
        let mut b = PathBuilder::new();
        b.move_to(Vec2::new(0.0, 0.0)).line_to(Vec2::new(100.0, 0.0));
        let pen = Pen::solid(Color::BLACK, 0.0).with_cap(CapStyle::Flat);
        let solid = device_outline(&b.build(), &perspective(), &pen, true).unwrap();
        let dashed =
            device_outline(&b.build(), &perspective(), &pen.with_style(PenStyle::Dash), true).unwrap();
        assert!(dashed.vertices.len() > solid.vertices.len());
    }
}
