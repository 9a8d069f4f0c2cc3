//! Triangle-strip stroker.
//!
//! Produces one strip for the whole path; subpaths are chained through
//! degenerate triangles (last vertex and next first vertex repeated).

use std::f32::consts::{FRAC_PI_2, PI};

use crate::coords::{Rect, Vec2};
use crate::paint::{CapStyle, JoinStyle, Pen};

use super::flatten::flatten_subpath;
use super::path::VectorPath;

const MAX_ARC_STEPS: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct Stroker {
    vertices: Vec<Vec2>,
    bounds: Option<Rect>,
    half_width: f32,
    cap: CapStyle,
    join: JoinStyle,
    miter_limit: f32,
    /// Angle covered by one round join/cap segment.
    arc_step: f32,
}

#[inline]
fn normal(d: Vec2) -> Vec2 {
    d.perp()
}

#[inline]
fn rotate(v: Vec2, a: f32) -> Vec2 {
    let (s, c) = a.sin_cos();
    Vec2::new(v.x * c - v.y * s, v.x * s + v.y * c)
}

impl Stroker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn bounds(&self) -> Rect {
        self.bounds.unwrap_or_default()
    }

    /// Strokes `path` in its own coordinate space.
    ///
    /// Curves are flattened for a device scale of `1 / inverse_scale`.
    /// Cosmetic pens have their width in device pixels, so it is scaled by
    /// `inverse_scale`; a zero width means a one pixel cosmetic line.
    pub fn process(&mut self, path: &VectorPath, pen: &Pen, inverse_scale: f32) {
        self.vertices.clear();
        self.bounds = None;

        let mut half = if pen.width <= 0.0 { 0.5 } else { pen.width * 0.5 };
        if pen.is_cosmetic() {
            half *= inverse_scale;
        }
        self.half_width = half;
        self.cap = pen.cap;
        self.join = pen.join;
        self.miter_limit = pen.miter_limit.max(1.0) * half;

        let device_half = (half / inverse_scale.max(1e-6)).max(0.5);
        let step = 2.0 * (1.0 - 0.25 / device_half).clamp(-1.0, 1.0).acos();
        self.arc_step = if step.is_finite() && step > 1e-3 { step } else { PI / 8.0 };

        for sub in path.subpaths() {
            let mut pts = flatten_subpath(&sub, inverse_scale);
            pts.dedup_by(|a, b| (*a - *b).length_squared() < 1e-12);
            if pts.is_empty() {
                continue;
            }

            let mut strip = Vec::with_capacity(pts.len() * 2 + 8);
            let closed = pts.len() > 2 && pts.first() == pts.last();
            if closed {
                pts.pop();
                self.closed_subpath(&pts, &mut strip);
            } else {
                self.open_subpath(&pts, &mut strip);
            }
            self.append(strip);
        }
    }

    fn append(&mut self, strip: Vec<Vec2>) {
        let Some(&first) = strip.first() else { return };
        if let Some(&last) = self.vertices.last() {
            self.vertices.push(last);
            self.vertices.push(first);
        }
        for &p in &strip {
            let r = Rect::from_origin_size(p, Vec2::zero());
            self.bounds = Some(match self.bounds {
                Some(b) => b.united(r),
                None => r,
            });
        }
        self.vertices.extend(strip);
    }

    fn open_subpath(&self, pts: &[Vec2], out: &mut Vec<Vec2>) {
        if pts.len() == 1 {
            // Zero-length subpath: only capped pens leave a mark.
            if self.cap != CapStyle::Flat {
                let d = Vec2::new(1.0, 0.0);
                self.cap_start(pts[0], d, out);
                self.cap_end(pts[0], d, out);
            }
            return;
        }

        let n = pts.len();
        self.cap_start(pts[0], (pts[1] - pts[0]).normalized(), out);
        for i in 1..n - 1 {
            let d_in = (pts[i] - pts[i - 1]).normalized();
            let d_out = (pts[i + 1] - pts[i]).normalized();
            self.join_at(pts[i], d_in, d_out, out);
        }
        self.cap_end(pts[n - 1], (pts[n - 1] - pts[n - 2]).normalized(), out);
    }

    fn closed_subpath(&self, pts: &[Vec2], out: &mut Vec<Vec2>) {
        let n = pts.len();
        let dir = |i: usize| (pts[(i + 1) % n] - pts[i]).normalized();
        for (i, &p) in pts.iter().enumerate() {
            self.join_at(p, dir((i + n - 1) % n), dir(i), out);
        }
        self.join_at(pts[0], dir(n - 1), dir(0), out);
    }

    #[inline]
    fn pair(&self, p: Vec2, n: Vec2, out: &mut Vec<Vec2>) {
        out.push(p + n * self.half_width);
        out.push(p - n * self.half_width);
    }

    fn join_at(&self, p: Vec2, d_in: Vec2, d_out: Vec2, out: &mut Vec<Vec2>) {
        let (n_in, n_out) = (normal(d_in), normal(d_out));
        let turn = d_in.cross(d_out);

        if turn.abs() < 1e-6 && d_in.dot(d_out) > 0.0 {
            self.pair(p, n_in, out);
            return;
        }

        match self.join {
            JoinStyle::Bevel => {
                self.pair(p, n_in, out);
                self.pair(p, n_out, out);
            }
            JoinStyle::Miter => {
                let bisector = n_in + n_out;
                let cos_half = bisector.normalized().dot(n_in);
                let len = if cos_half > 1e-4 { self.half_width / cos_half } else { f32::INFINITY };
                if len <= self.miter_limit {
                    let m = bisector.normalized() * len;
                    out.push(p + m);
                    out.push(p - m);
                } else {
                    self.pair(p, n_in, out);
                    self.pair(p, n_out, out);
                }
            }
            JoinStyle::Round => {
                self.pair(p, n_in, out);
                let theta = n_in.cross(n_out).atan2(n_in.dot(n_out));
                let steps = ((theta.abs() / self.arc_step).ceil() as usize).clamp(1, MAX_ARC_STEPS);
                let outer_left = turn > 0.0;
                for k in 1..steps {
                    let r = rotate(n_in, theta * k as f32 / steps as f32) * self.half_width;
                    if outer_left {
                        out.push(p + r);
                        out.push(p);
                    } else {
                        out.push(p);
                        out.push(p - r);
                    }
                }
                self.pair(p, n_out, out);
            }
        }
    }

    fn cap_start(&self, p: Vec2, d: Vec2, out: &mut Vec<Vec2>) {
        let n = normal(d);
        match self.cap {
            CapStyle::Flat => self.pair(p, n, out),
            CapStyle::Square => self.pair(p - d * self.half_width, n, out),
            CapStyle::Round => {
                let steps = self.round_cap_steps();
                for k in 0..=steps {
                    let a = FRAC_PI_2 * k as f32 / steps as f32;
                    self.cap_pair(p, -d, n, a, out);
                }
            }
        }
    }

    fn cap_end(&self, p: Vec2, d: Vec2, out: &mut Vec<Vec2>) {
        let n = normal(d);
        match self.cap {
            CapStyle::Flat => self.pair(p, n, out),
            CapStyle::Square => self.pair(p + d * self.half_width, n, out),
            CapStyle::Round => {
                let steps = self.round_cap_steps();
                for k in (0..=steps).rev() {
                    let a = FRAC_PI_2 * k as f32 / steps as f32;
                    self.cap_pair(p, d, n, a, out);
                }
            }
        }
    }

    /// Symmetric pair on the cap circle; `a == 0` is the tip, `a == PI/2`
    /// the full width.
    #[inline]
    fn cap_pair(&self, p: Vec2, outward: Vec2, n: Vec2, a: f32, out: &mut Vec<Vec2>) {
        let (s, c) = a.sin_cos();
        let base = p + outward * (self.half_width * c);
        out.push(base + n * (self.half_width * s));
        out.push(base - n * (self.half_width * s));
    }

    fn round_cap_steps(&self) -> usize {
        ((FRAC_PI_2 / self.arc_step).ceil() as usize).clamp(2, MAX_ARC_STEPS / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PathBuilder;
    use crate::paint::Color;

    fn line(a: Vec2, b: Vec2) -> VectorPath {
        let mut pb = PathBuilder::new();
        pb.move_to(a).line_to(b);
        pb.build()
    }

    fn pen(width: f32) -> Pen {
        Pen::solid(Color::BLACK, width)
    }

    fn stroke(path: &VectorPath, pen: Pen) -> Stroker {
        let mut s = Stroker::new();
        s.process(path, &pen, 1.0);
        s
    }

    // ── caps ──────────────────────────────────────────────────────────────

    #[test]
    fn flat_cap_line_is_a_quad() {
        let s = stroke(&line(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)), pen(2.0).with_cap(CapStyle::Flat));
        assert_eq!(s.vertices().len(), 4);
        assert_eq!(s.bounds(), Rect::new(0.0, -1.0, 10.0, 2.0));
    }

    #[test]
    fn square_cap_extends_by_half_width() {
        let s = stroke(&line(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)), pen(2.0).with_cap(CapStyle::Square));
        assert_eq!(s.bounds(), Rect::new(-1.0, -1.0, 12.0, 2.0));
    }

    #[test]
    fn round_cap_reaches_tip() {
        let s = stroke(&line(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)), pen(4.0).with_cap(CapStyle::Round));
        let b = s.bounds();
        assert!((b.min().x + 2.0).abs() < 1e-4);
        assert!((b.max().x - 12.0).abs() < 1e-4);
    }

    #[test]
    fn lone_point_draws_only_with_caps() {
        let mut pb = PathBuilder::new();
        pb.move_to(Vec2::new(5.0, 5.0));
        let p = pb.build();
        assert!(stroke(&p, pen(2.0).with_cap(CapStyle::Flat)).vertices().is_empty());
        let s = stroke(&p, pen(2.0).with_cap(CapStyle::Square));
        assert_eq!(s.bounds(), Rect::new(4.0, 4.0, 2.0, 2.0));
    }

    // ── joins ─────────────────────────────────────────────────────────────

    fn corner() -> VectorPath {
        let mut pb = PathBuilder::new();
        pb.move_to(Vec2::new(0.0, 0.0))
            .line_to(Vec2::new(10.0, 0.0))
            .line_to(Vec2::new(10.0, 10.0));
        pb.build()
    }

    #[test]
    fn miter_join_reaches_corner() {
        let s = stroke(&corner(), pen(2.0).with_cap(CapStyle::Flat).with_join(JoinStyle::Miter));
        assert!((s.bounds().max().x - 11.0).abs() < 1e-4);
        assert!((s.bounds().min().y + 1.0).abs() < 1e-4);
        assert!(s.vertices().iter().any(|v| (*v - Vec2::new(11.0, -1.0)).length() < 1e-4));
    }

    #[test]
    fn sharp_miter_falls_back_to_bevel() {
        let mut pb = PathBuilder::new();
        pb.move_to(Vec2::new(0.0, 0.0))
            .line_to(Vec2::new(10.0, 0.0))
            .line_to(Vec2::new(0.0, 0.5));
        let pen = pen(2.0).with_cap(CapStyle::Flat).with_join(JoinStyle::Miter);
        let s = stroke(&pb.build(), pen);
        // Miter tip would sit ~40 units past the corner.
        assert!(s.bounds().max().x < 12.0);
    }

    #[test]
    fn bevel_emits_two_pairs() {
        let s = stroke(&corner(), pen(2.0).with_cap(CapStyle::Flat).with_join(JoinStyle::Bevel));
        assert_eq!(s.vertices().len(), 2 + 4 + 2);
    }

    #[test]
    fn round_join_stays_on_circle() {
        let s = stroke(&corner(), pen(4.0).with_cap(CapStyle::Flat).with_join(JoinStyle::Round));
        let c = Vec2::new(10.0, 0.0);
        let v = s.vertices();
        assert!(v.len() > 8);
        for p in &v[2..v.len() - 2] {
            let d = (*p - c).length();
            assert!(d < 1e-4 || (d - 2.0).abs() < 1e-4);
        }
        assert!(v.iter().any(|p| p.x > 10.5 && p.y < -0.5));
    }

    // ── subpaths ──────────────────────────────────────────────────────────

    #[test]
    fn subpaths_are_linked_with_degenerates() {
        let mut pb = PathBuilder::new();
        pb.move_to(Vec2::new(0.0, 0.0)).line_to(Vec2::new(10.0, 0.0));
        pb.move_to(Vec2::new(0.0, 10.0)).line_to(Vec2::new(10.0, 10.0));
        let s = stroke(&pb.build(), pen(2.0).with_cap(CapStyle::Flat));
        let v = s.vertices();
        assert_eq!(v.len(), 4 + 2 + 4);
        assert_eq!(v[3], v[4]);
        assert_eq!(v[5], v[6]);
    }

    #[test]
    fn closed_rect_wraps_around() {
        let p = PathBuilder::new().add_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).build();
        let s = stroke(&p, pen(2.0).with_join(JoinStyle::Miter));
        assert_eq!(s.vertices().len(), 2 * 5);
        assert_eq!(s.vertices()[0], s.vertices()[8]);
        let b = s.bounds();
        assert!((b.min() - Vec2::new(-1.0, -1.0)).length() < 1e-4);
        assert!((b.max() - Vec2::new(11.0, 11.0)).length() < 1e-4);
    }

    #[test]
    fn cosmetic_width_scales_with_inverse_scale() {
        let p = line(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let mut s = Stroker::new();
        s.process(&p, &pen(2.0).with_cap(CapStyle::Flat).with_cosmetic(true), 0.5);
        assert!((s.bounds().height() - 1.0).abs() < 1e-4);

        s.process(&p, &pen(0.0).with_cap(CapStyle::Flat), 0.5);
        assert!((s.bounds().height() - 0.5).abs() < 1e-4);
    }
}
