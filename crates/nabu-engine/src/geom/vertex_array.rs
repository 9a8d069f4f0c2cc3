use crate::coords::{Rect, Vec2};

use super::flatten::flatten_cubic;
use super::path::{PathElement, VectorPath};

/// Flattened path geometry: points plus subpath stops.
///
/// Each stop is the end offset of one triangle fan, so fan `i` spans
/// `points[stops[i-1]..stops[i]]` (with an implicit leading 0).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexArray {
    points: Vec<Vec2>,
    stops: Vec<usize>,
    bounds: Option<Rect>,
}

impl VertexArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.stops.clear();
        self.bounds = None;
    }

    #[inline]
    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    #[inline]
    pub fn stops(&self) -> &[usize] {
        &self.stops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box of every point added so far.
    #[inline]
    pub fn bounds(&self) -> Rect {
        self.bounds.unwrap_or_default()
    }

    /// The fans delimited by the stops.
    pub fn fans(&self) -> impl Iterator<Item = &[Vec2]> + '_ {
        let mut start = 0;
        self.stops.iter().map(move |&end| {
            let fan = &self.points[start..end];
            start = end;
            fan
        })
    }

    /// Appends a path.
    ///
    /// Curves are flattened for a device scale of `1 / inverse_scale`. With
    /// `outline == false` each subpath becomes a closed fan; concave paths
    /// additionally get their centroid as the fan's first vertex so fans of
    /// star-shaped subpaths stay tight.
    pub fn add_path(&mut self, path: &VectorPath, inverse_scale: f32, outline: bool) {
        let points = path.points();
        let elements = path.elements();
        let Some(&first) = points.first() else { return };

        let concave = !path.is_convex();
        if !outline && concave {
            self.add_centroid(path, 0);
        }

        let mut last_move_to = self.points.len();
        self.line_to(first);

        let mut i = 1;
        for &el in elements.iter().skip(1) {
            match el {
                PathElement::MoveTo => {
                    if !outline {
                        self.add_closing_line(last_move_to);
                    }
                    self.stops.push(self.points.len());
                    if !outline {
                        if concave {
                            self.add_centroid(path, i);
                        }
                        last_move_to = self.points.len();
                    }
                    self.line_to(points[i]);
                    i += 1;
                }
                PathElement::LineTo => {
                    self.line_to(points[i]);
                    i += 1;
                }
                PathElement::CurveTo => {
                    let c = [points[i - 1], points[i], points[i + 1], points[i + 2]];
                    flatten_cubic(c, inverse_scale, |p| self.line_to(p));
                    i += 3;
                }
            }
        }

        if !outline {
            self.add_closing_line(last_move_to);
        }
        self.stops.push(self.points.len());
    }

    /// Appends a rectangle as a four point fan.
    pub fn add_rect(&mut self, r: Rect) {
        for p in r.normalized().corners() {
            self.line_to(p);
        }
        self.stops.push(self.points.len());
    }

    /// Appends an arbitrary quad as a four point fan.
    pub fn add_quad(&mut self, quad: [Vec2; 4]) {
        for p in quad {
            self.line_to(p);
        }
        self.stops.push(self.points.len());
    }

    /// Appends one vertex without touching the stops.
    #[inline]
    pub fn add_vertex(&mut self, p: Vec2) {
        self.line_to(p);
    }

    #[inline]
    fn line_to(&mut self, p: Vec2) {
        self.points.push(p);
        let r = Rect::from_origin_size(p, Vec2::zero());
        self.bounds = Some(match self.bounds {
            Some(b) => b.united(r),
            None => r,
        });
    }

    fn add_closing_line(&mut self, index: usize) {
        let Some(&start) = self.points.get(index) else { return };
        if self.points.last() != Some(&start) {
            self.line_to(start);
        }
    }

    /// Adds the mean of the subpath's points that starts at `point_index`.
    fn add_centroid(&mut self, path: &VectorPath, point_index: usize) {
        let points = path.points();
        let elements = path.elements();

        // Walk elements to find where this subpath's points end.
        let mut p = 0;
        let mut end = points.len();
        let mut started = false;
        for &el in elements {
            if el == PathElement::MoveTo {
                if started {
                    end = p;
                    break;
                }
                if p == point_index {
                    started = true;
                }
            }
            p += if el == PathElement::CurveTo { 3 } else { 1 };
        }

        let run = &points[point_index..end.max(point_index + 1).min(points.len())];
        let sum = run.iter().fold(Vec2::zero(), |acc, &q| acc + q);
        self.line_to(sum / run.len() as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PathBuilder;

    #[test]
    fn convex_polygon_is_single_fan() {
        let path = PathBuilder::new()
            .convex(true)
            .add_polygon(&[Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(2.0, 3.0)])
            .build();
        let mut va = VertexArray::new();
        va.add_path(&path, 1.0, false);
        assert_eq!(va.stops(), &[4]);
        assert_eq!(va.points()[0], Vec2::new(0.0, 0.0));
        assert_eq!(va.bounds(), Rect::new(0.0, 0.0, 4.0, 3.0));
    }

    #[test]
    fn concave_fill_gets_centroid_per_subpath() {
        let mut b = PathBuilder::new();
        b.add_polygon(&[Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(4.0, 4.0)]);
        b.add_polygon(&[Vec2::new(10.0, 0.0), Vec2::new(13.0, 0.0), Vec2::new(13.0, 3.0)]);
        let path = b.build();

        let mut va = VertexArray::new();
        va.add_path(&path, 1.0, false);

        let fans: Vec<&[Vec2]> = va.fans().collect();
        assert_eq!(fans.len(), 2);
        // centroid + 4 closed points
        assert_eq!(fans[0].len(), 5);
        assert_eq!(fans[0][0], Vec2::new(2.0, 1.0));
        assert_eq!(fans[1][0], Vec2::new(11.5, 0.75));
    }

    #[test]
    fn open_subpath_is_closed_for_fill() {
        let mut b = PathBuilder::new();
        b.move_to(Vec2::new(0.0, 0.0))
            .line_to(Vec2::new(5.0, 0.0))
            .line_to(Vec2::new(5.0, 5.0));
        let path = b.convex(true).build();
        let mut va = VertexArray::new();
        va.add_path(&path, 1.0, false);
        assert_eq!(va.points().len(), 4);
        assert_eq!(va.points()[3], Vec2::new(0.0, 0.0));

        let mut outline = VertexArray::new();
        outline.add_path(&path, 1.0, true);
        assert_eq!(outline.points().len(), 3);
    }

    #[test]
    fn curves_follow_inverse_scale() {
        let path = PathBuilder::new().add_ellipse(Rect::new(0.0, 0.0, 100.0, 100.0)).build();
        let mut near = VertexArray::new();
        near.add_path(&path, 0.25, false);
        let mut far = VertexArray::new();
        far.add_path(&path, 4.0, false);
        assert!(near.len() > far.len());
    }
}
