use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bitflags::bitflags;

use crate::coords::{Rect, Transform, Vec2};

/// Element tag for each point run of a [`VectorPath`].
///
/// `CurveTo` consumes three points: two control points and the end point.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PathElement {
    MoveTo,
    LineTo,
    CurveTo,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum FillRule {
    /// Non-zero winding.
    #[default]
    Winding,
    OddEven,
}

bitflags! {
    /// Shape facts known when the path was built.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct PathHints: u8 {
        /// A single axis-aligned rectangle.
        const RECT = 1 << 0;
        /// Every subpath is convex and there is one subpath.
        const CONVEX = 1 << 1;
        /// At least one cubic segment.
        const CURVED = 1 << 2;
    }
}

/// Process-unique identity of a path's geometry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PathId(u64);

impl PathId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PathId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub(crate) struct PathData {
    id: PathId,
    points: Vec<Vec2>,
    elements: Vec<PathElement>,
    hints: PathHints,
    fill_rule: FillRule,
    control_rect: Rect,
    cacheable: AtomicBool,
}

/// Immutable vector path shared by reference.
///
/// `elements` is parallel to `points` except that a `CurveTo` tag covers
/// three points. The first element is always a `MoveTo`.
///
/// The engine marks a path cacheable after its first use so flattened or
/// triangulated geometry is only kept for paths that get drawn repeatedly.
#[derive(Debug, Clone)]
pub struct VectorPath {
    data: Arc<PathData>,
}

/// Non-owning handle used by geometry caches to notice dropped paths.
#[derive(Debug, Clone)]
pub(crate) struct WeakPath(Weak<PathData>);

impl WeakPath {
    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl VectorPath {
    #[inline]
    pub fn id(&self) -> PathId {
        self.data.id
    }

    #[inline]
    pub fn points(&self) -> &[Vec2] {
        &self.data.points
    }

    #[inline]
    pub fn elements(&self) -> &[PathElement] {
        &self.data.elements
    }

    #[inline]
    pub fn hints(&self) -> PathHints {
        self.data.hints
    }

    #[inline]
    pub fn fill_rule(&self) -> FillRule {
        self.data.fill_rule
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.points.is_empty()
    }

    #[inline]
    pub fn is_rect(&self) -> bool {
        self.data.hints.contains(PathHints::RECT)
    }

    #[inline]
    pub fn is_convex(&self) -> bool {
        self.data.hints.contains(PathHints::CONVEX)
    }

    #[inline]
    pub fn has_curves(&self) -> bool {
        self.data.hints.contains(PathHints::CURVED)
    }

    /// Bounding box of every point, control points included.
    #[inline]
    pub fn control_point_rect(&self) -> Rect {
        self.data.control_rect
    }

    #[inline]
    pub fn is_cacheable(&self) -> bool {
        self.data.cacheable.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn make_cacheable(&self) {
        self.data.cacheable.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn downgrade(&self) -> WeakPath {
        WeakPath(Arc::downgrade(&self.data))
    }

    /// Copy of this path with every point mapped through `t`.
    ///
    /// Rectangle hints survive only translate and scale transforms.
    pub fn transformed(&self, t: &Transform) -> VectorPath {
        let mut hints = self.data.hints;
        if t.kind() > crate::coords::TransformKind::Scale {
            hints.remove(PathHints::RECT);
        }
        if !t.is_affine() {
            hints.remove(PathHints::CONVEX);
        }
        let points: Vec<Vec2> = self.data.points.iter().map(|&p| t.map(p)).collect();
        VectorPath::from_parts(points, self.data.elements.clone(), hints, self.data.fill_rule)
    }

    fn from_parts(
        points: Vec<Vec2>,
        elements: Vec<PathElement>,
        hints: PathHints,
        fill_rule: FillRule,
    ) -> Self {
        let control_rect = Rect::bounding(points.iter().copied()).unwrap_or_default();
        Self {
            data: Arc::new(PathData {
                id: PathId::next(),
                points,
                elements,
                hints,
                fill_rule,
                control_rect,
                cacheable: AtomicBool::new(false),
            }),
        }
    }

    /// Point runs per subpath, each starting at its `MoveTo`.
    pub fn subpaths(&self) -> Subpaths<'_> {
        Subpaths { path: self, point: 0, element: 0 }
    }
}

/// One subpath: its points and the element tags that produced them.
#[derive(Debug, Copy, Clone)]
pub struct Subpath<'a> {
    pub points: &'a [Vec2],
    pub elements: &'a [PathElement],
}

impl Subpath<'_> {
    /// Ends where it started.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.points.len() > 2 && self.points.first() == self.points.last()
    }
}

pub struct Subpaths<'a> {
    path: &'a VectorPath,
    point: usize,
    element: usize,
}

impl<'a> Iterator for Subpaths<'a> {
    type Item = Subpath<'a>;

    fn next(&mut self) -> Option<Subpath<'a>> {
        let elements = self.path.elements();
        let points = self.path.points();
        if self.element >= elements.len() {
            return None;
        }

        let (p0, e0) = (self.point, self.element);
        let mut p = self.point + 1;
        let mut e = self.element + 1;
        while e < elements.len() && elements[e] != PathElement::MoveTo {
            p += if elements[e] == PathElement::CurveTo { 3 } else { 1 };
            e += 1;
        }
        self.point = p;
        self.element = e;
        Some(Subpath { points: &points[p0..p.min(points.len())], elements: &elements[e0..e] })
    }
}

/// Incremental constructor for [`VectorPath`].
#[derive(Debug, Default, Clone)]
pub struct PathBuilder {
    points: Vec<Vec2>,
    elements: Vec<PathElement>,
    fill_rule: FillRule,
    hints: PathHints,
    subpath_start: Option<usize>,
    shapes: u32,
    convex_override: Option<bool>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_rule(mut self, rule: FillRule) -> Self {
        self.fill_rule = rule;
        self
    }

    /// Asserts (or denies) that the finished path is convex.
    pub fn convex(mut self, convex: bool) -> Self {
        self.convex_override = Some(convex);
        self
    }

    pub fn move_to(&mut self, p: Vec2) -> &mut Self {
        self.subpath_start = Some(self.points.len());
        self.points.push(p);
        self.elements.push(PathElement::MoveTo);
        self.shapes += 1;
        self
    }

    pub fn line_to(&mut self, p: Vec2) -> &mut Self {
        self.ensure_started();
        self.points.push(p);
        self.elements.push(PathElement::LineTo);
        self
    }

    pub fn cubic_to(&mut self, c1: Vec2, c2: Vec2, to: Vec2) -> &mut Self {
        self.ensure_started();
        self.points.extend([c1, c2, to]);
        self.elements.push(PathElement::CurveTo);
        self.hints.insert(PathHints::CURVED);
        self
    }

    /// Quadratic segment, stored as the equivalent cubic.
    pub fn quad_to(&mut self, c: Vec2, to: Vec2) -> &mut Self {
        let from = self.current();
        let c1 = from + (c - from) * (2.0 / 3.0);
        let c2 = to + (c - to) * (2.0 / 3.0);
        self.cubic_to(c1, c2, to)
    }

    /// Closes the current subpath with a line back to its start.
    pub fn close(&mut self) -> &mut Self {
        if let Some(start) = self.subpath_start {
            let first = self.points[start];
            if self.points.last() != Some(&first) {
                self.points.push(first);
                self.elements.push(PathElement::LineTo);
            }
        }
        self
    }

    pub fn add_rect(&mut self, r: Rect) -> &mut Self {
        let r = r.normalized();
        let [a, b, c, d] = r.corners();
        self.move_to(a);
        self.line_to(b).line_to(c).line_to(d).close();
        self.hints.insert(PathHints::RECT | PathHints::CONVEX);
        self
    }

    /// Ellipse inscribed in `r`, as four cubic arcs.
    pub fn add_ellipse(&mut self, r: Rect) -> &mut Self {
        const K: f32 = 0.552_284_8;
        let r = r.normalized();
        let c = r.center();
        let (rx, ry) = (r.width() * 0.5, r.height() * 0.5);
        let (kx, ky) = (rx * K, ry * K);

        self.move_to(Vec2::new(c.x + rx, c.y));
        self.cubic_to(
            Vec2::new(c.x + rx, c.y + ky),
            Vec2::new(c.x + kx, c.y + ry),
            Vec2::new(c.x, c.y + ry),
        );
        self.cubic_to(
            Vec2::new(c.x - kx, c.y + ry),
            Vec2::new(c.x - rx, c.y + ky),
            Vec2::new(c.x - rx, c.y),
        );
        self.cubic_to(
            Vec2::new(c.x - rx, c.y - ky),
            Vec2::new(c.x - kx, c.y - ry),
            Vec2::new(c.x, c.y - ry),
        );
        self.cubic_to(
            Vec2::new(c.x + kx, c.y - ry),
            Vec2::new(c.x + rx, c.y - ky),
            Vec2::new(c.x + rx, c.y),
        );
        self.hints.insert(PathHints::CONVEX);
        self
    }

    /// Closed polygon through `points`.
    pub fn add_polygon(&mut self, points: &[Vec2]) -> &mut Self {
        let Some((&first, rest)) = points.split_first() else { return self };
        self.move_to(first);
        for &p in rest {
            self.line_to(p);
        }
        self.close()
    }

    pub fn build(&self) -> VectorPath {
        let mut hints = self.hints;
        if self.shapes != 1 {
            hints.remove(PathHints::RECT | PathHints::CONVEX);
        }
        match self.convex_override {
            Some(true) => hints.insert(PathHints::CONVEX),
            Some(false) => hints.remove(PathHints::CONVEX | PathHints::RECT),
            None => {}
        }
        VectorPath::from_parts(self.points.clone(), self.elements.clone(), hints, self.fill_rule)
    }

    fn current(&self) -> Vec2 {
        self.points.last().copied().unwrap_or_default()
    }

    fn ensure_started(&mut self) {
        if self.subpath_start.is_none() {
            self.move_to(Vec2::zero());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_gets_rect_hint() {
        let p = PathBuilder::new().add_rect(Rect::new(1.0, 2.0, 3.0, 4.0)).build();
        assert!(p.is_rect() && p.is_convex());
        assert_eq!(p.control_point_rect(), Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(p.points().len(), 5);
    }

    #[test]
    fn two_shapes_lose_shape_hints() {
        let mut b = PathBuilder::new();
        b.add_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        b.add_rect(Rect::new(5.0, 0.0, 1.0, 1.0));
        let p = b.build();
        assert!(!p.is_rect());
        assert!(!p.is_convex());
        assert_eq!(p.subpaths().count(), 2);
    }

    #[test]
    fn ellipse_is_curved_and_convex() {
        let p = PathBuilder::new().add_ellipse(Rect::new(0.0, 0.0, 10.0, 10.0)).build();
        assert!(p.has_curves() && p.is_convex());
        let sub = p.subpaths().next().unwrap();
        assert_eq!(sub.points.len(), 13);
        assert!(sub.is_closed());
    }

    #[test]
    fn line_without_move_starts_at_origin() {
        let mut b = PathBuilder::new();
        b.line_to(Vec2::new(1.0, 1.0));
        let p = b.build();
        assert_eq!(p.elements()[0], PathElement::MoveTo);
        assert_eq!(p.points()[0], Vec2::zero());
    }

    #[test]
    fn ids_and_cacheable_flag() {
        let a = PathBuilder::new().add_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).build();
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert!(!b.is_cacheable());
        a.make_cacheable();
        assert!(b.is_cacheable());
        let weak = a.downgrade();
        drop(a);
        assert!(weak.is_alive());
        drop(b);
        assert!(!weak.is_alive());
    }

    #[test]
    fn rotation_drops_rect_hint() {
        let p = PathBuilder::new().add_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).build();
        assert!(p.transformed(&Transform::scale(2.0, 2.0)).is_rect());
        assert!(!p.transformed(&Transform::rotation(0.3)).is_rect());
    }
}
