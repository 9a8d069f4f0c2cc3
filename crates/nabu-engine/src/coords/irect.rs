/// Integer rectangle in device pixels.
///
/// Used for scissor boxes and the stencil dirty region, where half pixels
/// have no meaning.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl IRect {
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn right(self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(self) -> i32 {
        self.y + self.height
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[inline]
    pub fn area(self) -> i64 {
        if self.is_empty() { 0 } else { self.width as i64 * self.height as i64 }
    }

    #[inline]
    pub fn contains(self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    #[inline]
    pub fn intersect(self, other: IRect) -> Option<IRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        let r = IRect::new(x0, y0, x1 - x0, y1 - y0);
        (!r.is_empty()).then_some(r)
    }

    /// Parts of `self` not covered by `other`, as up to four disjoint bands.
    pub fn subtract(self, other: IRect) -> Vec<IRect> {
        let Some(hole) = self.intersect(other) else {
            return if self.is_empty() { Vec::new() } else { vec![self] };
        };

        let bands = [
            IRect::new(self.x, self.y, self.width, hole.y - self.y),
            IRect::new(self.x, hole.bottom(), self.width, self.bottom() - hole.bottom()),
            IRect::new(self.x, hole.y, hole.x - self.x, hole.height),
            IRect::new(hole.right(), hole.y, self.right() - hole.right(), hole.height),
        ];
        bands.into_iter().filter(|r| !r.is_empty()).collect()
    }
}

/// Removes `hole` from every rectangle of `region`.
pub(crate) fn region_subtract(region: &[IRect], hole: IRect) -> Vec<IRect> {
    region.iter().flat_map(|r| r.subtract(hole)).collect()
}

/// Pieces of `region` inside `clip`.
pub(crate) fn region_intersect(region: &[IRect], clip: IRect) -> Vec<IRect> {
    region.iter().filter_map(|r| r.intersect(clip)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(rs: &[IRect]) -> i64 {
        rs.iter().map(|r| r.area()).sum()
    }

    #[test]
    fn intersect_disjoint_is_none() {
        assert!(IRect::new(0, 0, 4, 4).intersect(IRect::new(4, 0, 4, 4)).is_none());
    }

    #[test]
    fn subtract_center_leaves_ring() {
        let parts = IRect::new(0, 0, 10, 10).subtract(IRect::new(2, 2, 4, 4));
        assert_eq!(parts.len(), 4);
        assert_eq!(area(&parts), 100 - 16);
        for p in &parts {
            assert!(p.intersect(IRect::new(2, 2, 4, 4)).is_none());
        }
    }

    #[test]
    fn subtract_covering_hole_is_empty() {
        assert!(IRect::new(1, 1, 2, 2).subtract(IRect::new(0, 0, 10, 10)).is_empty());
    }

    #[test]
    fn subtract_disjoint_keeps_self() {
        let a = IRect::new(0, 0, 3, 3);
        assert_eq!(a.subtract(IRect::new(5, 5, 1, 1)), vec![a]);
    }

    #[test]
    fn region_helpers() {
        let region = vec![IRect::new(0, 0, 10, 10)];
        let rest = region_subtract(&region, IRect::new(0, 0, 10, 5));
        assert_eq!(rest, vec![IRect::new(0, 5, 10, 5)]);
        assert_eq!(region_intersect(&rest, IRect::new(0, 0, 10, 6)), vec![IRect::new(0, 5, 10, 1)]);
    }
}
