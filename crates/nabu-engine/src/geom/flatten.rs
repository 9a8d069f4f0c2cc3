//! Curve flattening shared by the vertex array, stroker and dasher.

use crate::coords::{Rect, Vec2};

use super::path::{PathElement, Subpath};

/// Number of points a cubic is split into, including its end point.
///
/// Grows with the on-screen size of the curve's control box and is capped
/// so a huge curve cannot explode the vertex count.
pub fn curve_threshold(c: [Vec2; 4], inverse_scale: f32) -> usize {
    let bounds = Rect::bounding(c).unwrap_or_default();
    let extent = bounds.width().max(bounds.height());
    let t = (extent * std::f32::consts::PI / (inverse_scale.max(1e-4) * 6.0)).min(64.0);
    (t as usize).max(3)
}

#[inline]
pub fn cubic_point(c: [Vec2; 4], t: f32) -> Vec2 {
    let mt = 1.0 - t;
    let a = mt * mt * mt;
    let b = 3.0 * mt * mt * t;
    let d = 3.0 * mt * t * t;
    let e = t * t * t;
    c[0] * a + c[1] * b + c[2] * d + c[3] * e
}

/// Calls `emit` for every flattened point after the start of the curve.
pub fn flatten_cubic(c: [Vec2; 4], inverse_scale: f32, mut emit: impl FnMut(Vec2)) {
    let threshold = curve_threshold(c, inverse_scale);
    let step = 1.0 / (threshold - 1) as f32;
    for i in 1..threshold {
        emit(cubic_point(c, i as f32 * step));
    }
}

/// Flattens one subpath to a polyline.
pub fn flatten_subpath(sub: &Subpath<'_>, inverse_scale: f32) -> Vec<Vec2> {
    let mut out = Vec::with_capacity(sub.points.len());
    let Some(&first) = sub.points.first() else { return out };
    out.push(first);

    let mut i = 1;
    for &el in sub.elements.iter().skip(1) {
        match el {
            PathElement::MoveTo | PathElement::LineTo => {
                out.push(sub.points[i]);
                i += 1;
            }
            PathElement::CurveTo => {
                let c = [sub.points[i - 1], sub.points[i], sub.points[i + 1], sub.points[i + 2]];
                flatten_cubic(c, inverse_scale, |p| out.push(p));
                i += 3;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter_arc(r: f32) -> [Vec2; 4] {
        let k = 0.5523 * r;
        [Vec2::new(r, 0.0), Vec2::new(r, k), Vec2::new(k, r), Vec2::new(0.0, r)]
    }

    #[test]
    fn threshold_has_floor_and_cap() {
        assert_eq!(curve_threshold(quarter_arc(0.1), 1.0), 3);
        assert_eq!(curve_threshold(quarter_arc(10_000.0), 1.0), 64);
    }

    #[test]
    fn threshold_follows_scale() {
        let small = curve_threshold(quarter_arc(20.0), 1.0);
        let zoomed = curve_threshold(quarter_arc(20.0), 0.5);
        assert!(zoomed > small);
    }

    #[test]
    fn flatten_ends_on_curve_end() {
        let c = quarter_arc(50.0);
        let mut pts = Vec::new();
        flatten_cubic(c, 1.0, |p| pts.push(p));
        assert_eq!(pts.len(), curve_threshold(c, 1.0) - 1);
        let last = *pts.last().unwrap();
        assert!((last - c[3]).length() < 1e-4);
    }
}
