//! CPU triangulation through lyon.
//!
//! Used when the target has no stencil buffer, for cached concave fills
//! and for strokes that have to be built in device space.

use lyon::lyon_tessellation::{
    BuffersBuilder, FillOptions, FillTessellator, FillVertex, LineCap, LineJoin, StrokeOptions,
    StrokeTessellator, StrokeVertex, VertexBuffers,
};
use lyon::math::point;
use lyon::path::Path as LyonPath;
use thiserror::Error;

use crate::coords::{Rect, Vec2};
use crate::paint::{CapStyle, JoinStyle};

use super::path::{FillRule, PathElement, VectorPath};

/// Coordinates beyond ±`TRIANGULATION_LIMIT` device pixels are rejected.
pub const TRIANGULATION_LIMIT: f32 = 0x8000 as f32;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangulation {
    pub vertices: Vec<Vec2>,
    pub indices: IndexBuffer,
}

#[derive(Debug, Error)]
pub enum TriangulateError {
    #[error("path exceeds +/-32767 pixels")]
    OutOfRange,
    #[error("triangulation needs {0} vertices, more than 16-bit indices can address")]
    TooManyVertices(usize),
    #[error("tessellation failed: {0}")]
    Tessellation(String),
}

/// True when every control point lies strictly inside the range a
/// triangulation can address at the given scale.
pub fn within_triangulation_limits(bounds: Rect, inverse_scale: f32) -> bool {
    let lim = TRIANGULATION_LIMIT * inverse_scale;
    let (min, max) = (bounds.min(), bounds.max());
    min.x > -lim && max.x < lim && min.y > -lim && max.y < lim
}

pub(crate) fn to_lyon(path: &VectorPath) -> LyonPath {
    let mut b = LyonPath::builder();
    for sub in path.subpaths() {
        let Some(&first) = sub.points.first() else { continue };
        b.begin(point(first.x, first.y));
        let mut i = 1;
        for &el in sub.elements.iter().skip(1) {
            match el {
                PathElement::MoveTo | PathElement::LineTo => {
                    let p = sub.points[i];
                    b.line_to(point(p.x, p.y));
                    i += 1;
                }
                PathElement::CurveTo => {
                    let [c1, c2, to] = [sub.points[i], sub.points[i + 1], sub.points[i + 2]];
                    b.cubic_bezier_to(point(c1.x, c1.y), point(c2.x, c2.y), point(to.x, to.y));
                    i += 3;
                }
            }
        }
        b.end(sub.is_closed());
    }
    b.build()
}

fn finish(
    geometry: VertexBuffers<Vec2, u32>,
    wide_indices: bool,
) -> Result<Triangulation, TriangulateError> {
    let indices = if wide_indices {
        IndexBuffer::U32(geometry.indices)
    } else {
        if geometry.vertices.len() > u16::MAX as usize + 1 {
            return Err(TriangulateError::TooManyVertices(geometry.vertices.len()));
        }
        IndexBuffer::U16(geometry.indices.into_iter().map(|i| i as u16).collect())
    };
    Ok(Triangulation { vertices: geometry.vertices, indices })
}

/// Triangulates the filled interior of `path` honoring its fill rule.
///
/// Flattening tolerance is a quarter device pixel at `1 / inverse_scale`.
pub fn triangulate_fill(
    path: &VectorPath,
    inverse_scale: f32,
    wide_indices: bool,
) -> Result<Triangulation, TriangulateError> {
    if !within_triangulation_limits(path.control_point_rect(), inverse_scale) {
        return Err(TriangulateError::OutOfRange);
    }

    let rule = match path.fill_rule() {
        FillRule::Winding => lyon::lyon_tessellation::FillRule::NonZero,
        FillRule::OddEven => lyon::lyon_tessellation::FillRule::EvenOdd,
    };
    let options = FillOptions::default()
        .with_tolerance((0.25 * inverse_scale).max(1e-3))
        .with_fill_rule(rule);

    let mut geometry: VertexBuffers<Vec2, u32> = VertexBuffers::new();
    let mut tessellator = FillTessellator::new();
    tessellator
        .tessellate_path(
            &to_lyon(path),
            &options,
            &mut BuffersBuilder::new(&mut geometry, |v: FillVertex| {
                Vec2::new(v.position().x, v.position().y)
            }),
        )
        .map_err(|e| TriangulateError::Tessellation(format!("{e:?}")))?;

    finish(geometry, wide_indices)
}

/// Stroke parameters for [`triangulate_stroke`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StrokeParams {
    pub width: f32,
    pub cap: CapStyle,
    pub join: JoinStyle,
    pub miter_limit: f32,
    pub tolerance: f32,
}

/// Triangulates the outline of `path` stroked with `params`.
///
/// Triangles may overlap at joins; callers drawing with translucency route
/// them through the stencil buffer.
pub fn triangulate_stroke(
    path: &VectorPath,
    params: StrokeParams,
    wide_indices: bool,
) -> Result<Triangulation, TriangulateError> {
    let cap = match params.cap {
        CapStyle::Flat => LineCap::Butt,
        CapStyle::Square => LineCap::Square,
        CapStyle::Round => LineCap::Round,
    };
    let join = match params.join {
        JoinStyle::Miter => LineJoin::Miter,
        JoinStyle::Bevel => LineJoin::Bevel,
        JoinStyle::Round => LineJoin::Round,
    };
    let options = StrokeOptions::default()
        .with_line_width(params.width.max(1e-3))
        .with_line_cap(cap)
        .with_line_join(join)
        .with_miter_limit(params.miter_limit.max(1.0))
        .with_tolerance(params.tolerance.max(1e-3));

    let mut geometry: VertexBuffers<Vec2, u32> = VertexBuffers::new();
    let mut tessellator = StrokeTessellator::new();
    tessellator
        .tessellate_path(
            &to_lyon(path),
            &options,
            &mut BuffersBuilder::new(&mut geometry, |v: StrokeVertex| {
                Vec2::new(v.position().x, v.position().y)
            }),
        )
        .map_err(|e| TriangulateError::Tessellation(format!("{e:?}")))?;

    finish(geometry, wide_indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PathBuilder;

    fn area(t: &Triangulation) -> f32 {
        let idx: Vec<usize> = match &t.indices {
            IndexBuffer::U16(v) => v.iter().map(|&i| i as usize).collect(),
            IndexBuffer::U32(v) => v.iter().map(|&i| i as usize).collect(),
        };
        idx.chunks_exact(3)
            .map(|tri| {
                let (a, b, c) = (t.vertices[tri[0]], t.vertices[tri[1]], t.vertices[tri[2]]);
                ((b - a).cross(c - a) * 0.5).abs()
            })
            .sum()
    }

    #[test]
    fn limits_scale_with_inverse_scale() {
        let r = Rect::new(0.0, 0.0, 40_000.0, 10.0);
        assert!(!within_triangulation_limits(r, 1.0));
        assert!(within_triangulation_limits(r, 2.0));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let p = PathBuilder::new().add_rect(Rect::new(-40_000.0, 0.0, 10.0, 10.0)).build();
        assert!(matches!(triangulate_fill(&p, 1.0, false), Err(TriangulateError::OutOfRange)));
    }

    #[test]
    fn odd_even_square_with_hole() {
        let mut b = PathBuilder::new().fill_rule(FillRule::OddEven);
        b.add_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        b.add_rect(Rect::new(3.0, 3.0, 4.0, 4.0));
        let t = triangulate_fill(&b.build(), 1.0, false).unwrap();
        assert!(matches!(t.indices, IndexBuffer::U16(_)));
        assert!((area(&t) - 84.0).abs() < 1e-3);
    }

    #[test]
    fn stroke_of_line_has_width() {
        let mut b = PathBuilder::new();
        b.move_to(Vec2::new(0.0, 0.0)).line_to(Vec2::new(10.0, 0.0));
        let params = StrokeParams {
            width: 2.0,
            cap: CapStyle::Flat,
            join: JoinStyle::Bevel,
            miter_limit: 2.0,
            tolerance: 0.1,
        };
        let t = triangulate_stroke(&b.build(), params, true).unwrap();
        assert!((area(&t) - 20.0).abs() < 1e-3);
    }
}
