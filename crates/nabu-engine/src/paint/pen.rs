use super::{Brush, Color};

/// Dash style of a pen. Custom patterns are dash/gap lengths in pen widths.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PenStyle {
    NoPen,
    #[default]
    Solid,
    Dash,
    Dot,
    DashDot,
    DashDotDot,
    Custom(Vec<f32>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum CapStyle {
    Flat,
    #[default]
    Square,
    Round,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum JoinStyle {
    Miter,
    #[default]
    Bevel,
    Round,
}

/// Outline description.
///
/// A `width` of zero draws a one pixel wide cosmetic line. A cosmetic pen
/// keeps its width in device pixels whatever the transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Pen {
    pub width: f32,
    pub style: PenStyle,
    pub cap: CapStyle,
    pub join: JoinStyle,
    pub miter_limit: f32,
    pub dash_offset: f32,
    pub cosmetic: bool,
    pub brush: Brush,
}

impl Default for Pen {
    fn default() -> Self {
        Self::solid(Color::BLACK, 1.0)
    }
}

impl Pen {
    pub fn new(brush: Brush, width: f32) -> Self {
        Self {
            width,
            style: PenStyle::Solid,
            cap: CapStyle::default(),
            join: JoinStyle::default(),
            miter_limit: 2.0,
            dash_offset: 0.0,
            cosmetic: false,
            brush,
        }
    }

    #[inline]
    pub fn solid(color: Color, width: f32) -> Self {
        Self::new(Brush::solid(color), width)
    }

    pub fn with_style(mut self, style: PenStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_cap(mut self, cap: CapStyle) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_join(mut self, join: JoinStyle) -> Self {
        self.join = join;
        self
    }

    pub fn with_miter_limit(mut self, limit: f32) -> Self {
        self.miter_limit = limit;
        self
    }

    pub fn with_dash_offset(mut self, offset: f32) -> Self {
        self.dash_offset = offset;
        self
    }

    pub fn with_cosmetic(mut self, cosmetic: bool) -> Self {
        self.cosmetic = cosmetic;
        self
    }

    /// Zero-width pens are always cosmetic.
    #[inline]
    pub fn is_cosmetic(&self) -> bool {
        self.cosmetic || self.width == 0.0
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.style != PenStyle::NoPen && !self.brush.is_none()
    }

    /// Dash/gap lengths in pen widths, `None` for solid lines.
    pub fn dash_pattern(&self) -> Option<Vec<f32>> {
        let pattern = match &self.style {
            PenStyle::NoPen | PenStyle::Solid => return None,
            PenStyle::Dash => vec![4.0, 2.0],
            PenStyle::Dot => vec![1.0, 2.0],
            PenStyle::DashDot => vec![4.0, 2.0, 1.0, 2.0],
            PenStyle::DashDotDot => vec![4.0, 2.0, 1.0, 2.0, 1.0, 2.0],
            PenStyle::Custom(p) => p.clone(),
        };
        Some(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_has_no_dashes() {
        assert!(Pen::default().dash_pattern().is_none());
        assert_eq!(Pen::default().with_style(PenStyle::Dot).dash_pattern(), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn hairline_is_cosmetic() {
        assert!(Pen::solid(Color::BLACK, 0.0).is_cosmetic());
        assert!(!Pen::solid(Color::BLACK, 1.0).is_cosmetic());
    }
}
