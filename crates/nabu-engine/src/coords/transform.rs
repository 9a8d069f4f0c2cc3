use super::{Rect, Vec2};

/// Coarse classification of a transform, ordered by cost.
///
/// Paint decisions compare kinds (`kind <= TransformKind::Scale`), so the
/// variant order is significant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformKind {
    Identity,
    Translate,
    Scale,
    Rotate,
    Shear,
    Project,
}

/// 3×3 homogeneous transform applied to row vectors.
///
/// A point maps as
/// `x' = m11·x + m21·y + m31`, `y' = m12·x + m22·y + m32`,
/// `w' = m13·x + m23·y + m33`, followed by a divide by `w'` when the
/// transform is projective. `m31`/`m32` are the translation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub m11: f32,
    pub m12: f32,
    pub m13: f32,
    pub m21: f32,
    pub m22: f32,
    pub m23: f32,
    pub m31: f32,
    pub m32: f32,
    pub m33: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

const EPS: f32 = 1e-6;

#[inline]
fn fuzzy_zero(v: f32) -> bool {
    v.abs() <= EPS
}

impl Transform {
    #[inline]
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0)
    }

    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub const fn new(
        m11: f32, m12: f32, m13: f32,
        m21: f32, m22: f32, m23: f32,
        m31: f32, m32: f32, m33: f32,
    ) -> Self {
        Self { m11, m12, m13, m21, m22, m23, m31, m32, m33 }
    }

    /// Affine transform from the 2×2 linear part plus translation.
    #[inline]
    pub const fn affine(m11: f32, m12: f32, m21: f32, m22: f32, dx: f32, dy: f32) -> Self {
        Self::new(m11, m12, 0.0, m21, m22, 0.0, dx, dy, 1.0)
    }

    #[inline]
    pub const fn translation(dx: f32, dy: f32) -> Self {
        Self::affine(1.0, 0.0, 0.0, 1.0, dx, dy)
    }

    #[inline]
    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self::affine(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Clockwise rotation on screen (y-down) by `radians`.
    #[inline]
    pub fn rotation(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self::affine(c, s, -s, c, 0.0, 0.0)
    }

    #[inline]
    pub fn dx(&self) -> f32 {
        self.m31
    }

    #[inline]
    pub fn dy(&self) -> f32 {
        self.m32
    }

    pub fn kind(&self) -> TransformKind {
        if !fuzzy_zero(self.m13) || !fuzzy_zero(self.m23) || !fuzzy_zero(self.m33 - 1.0) {
            return TransformKind::Project;
        }
        if !fuzzy_zero(self.m12) || !fuzzy_zero(self.m21) {
            let dot = self.m11 * self.m12 + self.m21 * self.m22;
            return if fuzzy_zero(dot) { TransformKind::Rotate } else { TransformKind::Shear };
        }
        if !fuzzy_zero(self.m11 - 1.0) || !fuzzy_zero(self.m22 - 1.0) {
            return TransformKind::Scale;
        }
        if !fuzzy_zero(self.m31) || !fuzzy_zero(self.m32) {
            return TransformKind::Translate;
        }
        TransformKind::Identity
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.kind() == TransformKind::Identity
    }

    #[inline]
    pub fn is_affine(&self) -> bool {
        self.kind() < TransformKind::Project
    }

    pub fn determinant(&self) -> f32 {
        self.m11 * (self.m33 * self.m22 - self.m32 * self.m23)
            - self.m21 * (self.m33 * self.m12 - self.m32 * self.m13)
            + self.m31 * (self.m23 * self.m12 - self.m22 * self.m13)
    }

    /// Inverse transform; `None` when singular.
    pub fn inverted(&self) -> Option<Transform> {
        let det = self.determinant();
        if det.abs() <= f32::EPSILON * 1e-3 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Transform::new(
            (self.m22 * self.m33 - self.m23 * self.m32) * inv,
            (self.m13 * self.m32 - self.m12 * self.m33) * inv,
            (self.m12 * self.m23 - self.m13 * self.m22) * inv,
            (self.m23 * self.m31 - self.m21 * self.m33) * inv,
            (self.m11 * self.m33 - self.m13 * self.m31) * inv,
            (self.m13 * self.m21 - self.m11 * self.m23) * inv,
            (self.m21 * self.m32 - self.m22 * self.m31) * inv,
            (self.m12 * self.m31 - self.m11 * self.m32) * inv,
            (self.m11 * self.m22 - self.m12 * self.m21) * inv,
        ))
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &Transform) -> Transform {
        let a = self;
        let b = next;
        Transform::new(
            a.m11 * b.m11 + a.m12 * b.m21 + a.m13 * b.m31,
            a.m11 * b.m12 + a.m12 * b.m22 + a.m13 * b.m32,
            a.m11 * b.m13 + a.m12 * b.m23 + a.m13 * b.m33,
            a.m21 * b.m11 + a.m22 * b.m21 + a.m23 * b.m31,
            a.m21 * b.m12 + a.m22 * b.m22 + a.m23 * b.m32,
            a.m21 * b.m13 + a.m22 * b.m23 + a.m23 * b.m33,
            a.m31 * b.m11 + a.m32 * b.m21 + a.m33 * b.m31,
            a.m31 * b.m12 + a.m32 * b.m22 + a.m33 * b.m32,
            a.m31 * b.m13 + a.m32 * b.m23 + a.m33 * b.m33,
        )
    }

    /// Translation applied before `self`.
    #[inline]
    pub fn pre_translate(&self, dx: f32, dy: f32) -> Transform {
        Transform::translation(dx, dy).then(self)
    }

    /// Scale applied before `self`.
    #[inline]
    pub fn pre_scale(&self, sx: f32, sy: f32) -> Transform {
        Transform::scale(sx, sy).then(self)
    }

    pub fn map(&self, p: Vec2) -> Vec2 {
        let x = self.m11 * p.x + self.m21 * p.y + self.m31;
        let y = self.m12 * p.x + self.m22 * p.y + self.m32;
        if self.is_affine() {
            return Vec2::new(x, y);
        }
        let w = self.m13 * p.x + self.m23 * p.y + self.m33;
        let w = if w.abs() < EPS { EPS.copysign(w) } else { w };
        Vec2::new(x / w, y / w)
    }

    /// Bounding box of the mapped corners.
    pub fn map_rect(&self, r: Rect) -> Rect {
        let corners = r.normalized().corners().map(|c| self.map(c));
        Rect::bounding(corners).unwrap_or_default()
    }

    /// Largest magnitude among the linear coefficients.
    #[inline]
    pub fn max_linear_coefficient(&self) -> f32 {
        self.m11.abs().max(self.m22.abs()).max(self.m12.abs()).max(self.m21.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    // ── kind ──────────────────────────────────────────────────────────────

    #[test]
    fn classification_orders_by_cost() {
        assert_eq!(Transform::identity().kind(), TransformKind::Identity);
        assert_eq!(Transform::translation(3.0, 0.0).kind(), TransformKind::Translate);
        assert_eq!(Transform::scale(2.0, 2.0).kind(), TransformKind::Scale);
        assert_eq!(Transform::rotation(0.5).kind(), TransformKind::Rotate);
        assert_eq!(Transform::affine(1.0, 0.0, 0.5, 1.0, 0.0, 0.0).kind(), TransformKind::Shear);
        let mut p = Transform::identity();
        p.m13 = 0.001;
        assert_eq!(p.kind(), TransformKind::Project);
    }

    // ── composition ───────────────────────────────────────────────────────

    #[test]
    fn then_applies_left_first() {
        let t = Transform::scale(2.0, 2.0).then(&Transform::translation(10.0, 0.0));
        assert!(close(t.map(Vec2::new(1.0, 1.0)), Vec2::new(12.0, 2.0)));
    }

    #[test]
    fn pre_translate_offsets_input() {
        let t = Transform::scale(2.0, 2.0).pre_translate(1.0, 0.0);
        assert!(close(t.map(Vec2::zero()), Vec2::new(2.0, 0.0)));
    }

    // ── inverse ───────────────────────────────────────────────────────────

    #[test]
    fn inverse_round_trips() {
        let t = Transform::rotation(0.7)
            .then(&Transform::scale(3.0, 0.5))
            .then(&Transform::translation(-4.0, 9.0));
        let inv = t.inverted().unwrap();
        let p = Vec2::new(13.0, -2.5);
        assert!(close(inv.map(t.map(p)), p));
    }

    #[test]
    fn singular_has_no_inverse() {
        assert!(Transform::scale(0.0, 1.0).inverted().is_none());
    }

    #[test]
    fn projective_inverse_round_trips() {
        let mut t = Transform::scale(2.0, 2.0);
        t.m13 = 0.002;
        let inv = t.inverted().unwrap();
        let p = Vec2::new(40.0, 20.0);
        assert!(close(inv.map(t.map(p)), p));
    }

    #[test]
    fn map_rect_of_rotation_is_bounding_box() {
        let r = Transform::rotation(std::f32::consts::FRAC_PI_2).map_rect(Rect::new(0.0, 0.0, 4.0, 2.0));
        assert!((r.width() - 2.0).abs() < 1e-4);
        assert!((r.height() - 4.0).abs() < 1e-4);
    }
}
