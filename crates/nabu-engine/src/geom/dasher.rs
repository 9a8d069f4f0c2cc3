//! Splits a path into dashes.

use crate::coords::Vec2;

use super::flatten::flatten_subpath;
use super::path::{PathBuilder, VectorPath};

/// Upper bound on emitted dashes; longer results fall back to a solid line.
const MAX_DASHES: f32 = 100_000.0;

/// Dashes `path` with `pattern` (alternating dash and gap lengths).
///
/// Pattern entries and `offset` are in multiples of `unit`, normally the pen
/// width. Every subpath restarts the pattern at `offset`. An odd-length
/// pattern gets a trailing one unit gap. Returns the input unchanged when the
/// pattern is degenerate or would produce an unreasonable number of dashes.
pub fn dash_path(
    path: &VectorPath,
    pattern: &[f32],
    offset: f32,
    unit: f32,
    inverse_scale: f32,
) -> VectorPath {
    let unit = if unit > 0.0 { unit } else { 1.0 };
    let mut lengths: Vec<f32> = pattern.iter().map(|&d| d.max(0.0) * unit).collect();
    if lengths.len() % 2 == 1 {
        lengths.push(unit);
    }
    let period: f32 = lengths.iter().sum();
    if lengths.is_empty() || period <= 0.0 || !period.is_finite() {
        return path.clone();
    }

    let polylines: Vec<Vec<Vec2>> =
        path.subpaths().map(|sub| flatten_subpath(&sub, inverse_scale)).collect();
    let total: f32 = polylines
        .iter()
        .flat_map(|pl| pl.windows(2).map(|w| (w[1] - w[0]).length()))
        .sum();
    if total / period * (lengths.len() / 2) as f32 > MAX_DASHES {
        log::debug!("dash pattern too dense ({total} / {period}), stroking solid");
        return path.clone();
    }

    let start = (offset * unit).rem_euclid(period);
    let mut out = PathBuilder::new().fill_rule(path.fill_rule());
    for pl in &polylines {
        let mut walker = DashWalker::new(&lengths, start);
        walker.walk(pl, &mut out);
    }
    out.build()
}

struct DashWalker<'a> {
    lengths: &'a [f32],
    index: usize,
    remaining: f32,
    drawing: bool,
}

impl<'a> DashWalker<'a> {
    fn new(lengths: &'a [f32], mut offset: f32) -> Self {
        let mut index = 0;
        let mut remaining = lengths[0];
        while offset > 0.0 {
            if offset >= remaining {
                offset -= remaining;
                index = (index + 1) % lengths.len();
                remaining = lengths[index];
            } else {
                remaining -= offset;
                offset = 0.0;
            }
        }
        Self { lengths, index, remaining, drawing: false }
    }

    #[inline]
    fn is_dash(&self) -> bool {
        self.index.is_multiple_of(2)
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % self.lengths.len();
        self.remaining = self.lengths[self.index];
    }

    fn walk(&mut self, polyline: &[Vec2], out: &mut PathBuilder) {
        for w in polyline.windows(2) {
            let (a, b) = (w[0], w[1]);
            let len = (b - a).length();
            if len <= 0.0 {
                continue;
            }
            if self.is_dash() && !self.drawing {
                out.move_to(a);
                self.drawing = true;
            }

            let mut t = 0.0;
            loop {
                let left = len - t;
                if self.remaining >= left {
                    self.remaining -= left;
                    if self.is_dash() {
                        out.line_to(b);
                    }
                    break;
                }
                t += self.remaining;
                let p = a.lerp(b, t / len);
                if self.is_dash() {
                    out.line_to(p);
                    self.drawing = false;
                }
                self.advance();
                if self.is_dash() {
                    out.move_to(p);
                    self.drawing = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(len: f32) -> VectorPath {
        let mut b = PathBuilder::new();
        b.move_to(Vec2::new(0.0, 0.0)).line_to(Vec2::new(len, 0.0));
        b.build()
    }

    fn assert_starts(p: &VectorPath, expected: &[f32]) {
        let starts: Vec<f32> = p.subpaths().map(|s| s.points[0].x).collect();
        assert_eq!(starts.len(), expected.len(), "{starts:?}");
        for (a, b) in starts.iter().zip(expected) {
            assert!((a - b).abs() < 1e-4, "{starts:?}");
        }
    }

    #[test]
    fn simple_dashes() {
        let d = dash_path(&line(10.0), &[4.0, 2.0], 0.0, 1.0, 1.0);
        assert_starts(&d, &[0.0, 6.0]);
        let last = d.subpaths().last().unwrap();
        assert!((*last.points.last().unwrap() - Vec2::new(10.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn offset_shifts_pattern() {
        let d = dash_path(&line(10.0), &[4.0, 2.0], 5.0, 1.0, 1.0);
        assert_starts(&d, &[1.0, 7.0]);
    }

    #[test]
    fn pattern_scales_with_unit() {
        let d = dash_path(&line(20.0), &[1.0, 1.0], 0.0, 5.0, 1.0);
        assert_starts(&d, &[0.0, 10.0]);
    }

    #[test]
    fn dash_spans_corners() {
        let mut b = PathBuilder::new();
        b.move_to(Vec2::new(0.0, 0.0))
            .line_to(Vec2::new(3.0, 0.0))
            .line_to(Vec2::new(3.0, 3.0));
        let d = dash_path(&b.build(), &[4.0, 10.0], 0.0, 1.0, 1.0);
        let sub = d.subpaths().next().unwrap();
        assert_eq!(sub.points.len(), 3);
        assert!((sub.points[2] - Vec2::new(3.0, 1.0)).length() < 1e-4);
        assert_eq!(d.subpaths().count(), 1);
    }

    #[test]
    fn degenerate_patterns_return_input() {
        let p = line(10.0);
        assert_eq!(dash_path(&p, &[], 0.0, 1.0, 1.0).id(), p.id());
        assert_eq!(dash_path(&p, &[0.0, 0.0], 0.0, 1.0, 1.0).id(), p.id());
        assert_eq!(dash_path(&line(1.0e9), &[1.0, 1.0], 0.0, 1.0, 1.0).points().len(), 2);
    }
}
