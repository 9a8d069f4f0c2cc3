use std::hash::{Hash, Hasher};

use crate::coords::Vec2;

use super::Color;

/// Gradient spread behavior outside [0, 1] range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SpreadMode {
    /// Clamp to edge stops.
    Pad,
    /// Repeat the gradient pattern.
    Repeat,
    /// Mirror-repeat the gradient pattern.
    Reflect,
}

/// How colors between two stops are blended.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum InterpolationMode {
    /// Interpolate premultiplied colors.
    #[default]
    Color,
    /// Interpolate straight channels independently, premultiplying afterwards.
    Component,
}

/// A single gradient stop.
///
/// `t` is expected in [0, 1]; stops are sorted when the ramp is built.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorStop {
    pub t: f32,
    pub color: Color,
}

impl ColorStop {
    #[inline]
    pub const fn new(t: f32, color: Color) -> Self {
        Self { t, color }
    }
}

/// Gradient geometry in user space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum GradientKind {
    Linear {
        start: Vec2,
        end: Vec2,
    },
    /// Two-point radial gradient: circles interpolate from the focal circle
    /// to the center circle.
    Radial {
        center: Vec2,
        radius: f32,
        focal: Vec2,
        focal_radius: f32,
    },
    /// Sweep around `center`, starting at `angle` degrees counter-clockwise.
    Conical {
        center: Vec2,
        angle: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub kind: GradientKind,
    pub stops: Vec<ColorStop>,
    pub spread: SpreadMode,
    pub interpolation: InterpolationMode,
}

impl Gradient {
    pub fn linear(start: Vec2, end: Vec2, stops: Vec<ColorStop>) -> Self {
        Self::with_kind(GradientKind::Linear { start, end }, stops)
    }

    /// Radial gradient whose focal point is the center.
    pub fn radial(center: Vec2, radius: f32, stops: Vec<ColorStop>) -> Self {
        Self::with_kind(
            GradientKind::Radial { center, radius, focal: center, focal_radius: 0.0 },
            stops,
        )
    }

    pub fn radial_focal(
        center: Vec2,
        radius: f32,
        focal: Vec2,
        focal_radius: f32,
        stops: Vec<ColorStop>,
    ) -> Self {
        Self::with_kind(GradientKind::Radial { center, radius, focal, focal_radius }, stops)
    }

    pub fn conical(center: Vec2, angle: f32, stops: Vec<ColorStop>) -> Self {
        Self::with_kind(GradientKind::Conical { center, angle }, stops)
    }

    fn with_kind(kind: GradientKind, stops: Vec<ColorStop>) -> Self {
        Self {
            kind,
            stops,
            spread: SpreadMode::Pad,
            interpolation: InterpolationMode::Color,
        }
    }

    pub fn with_spread(mut self, spread: SpreadMode) -> Self {
        self.spread = spread;
        self
    }

    pub fn with_interpolation(mut self, interpolation: InterpolationMode) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// True when every stop is fully opaque.
    pub fn is_opaque(&self) -> bool {
        !self.stops.is_empty() && self.stops.iter().all(|s| s.color.is_opaque())
    }

    /// Content hash of the stop list.
    ///
    /// Two gradients with equal stops share a ramp regardless of geometry.
    pub fn stops_hash(&self) -> u64 {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        self.stops.len().hash(&mut h);
        for s in &self.stops {
            s.t.to_bits().hash(&mut h);
            for c in s.color.to_array() {
                c.to_bits().hash(&mut h);
            }
        }
        h.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops() -> Vec<ColorStop> {
        vec![ColorStop::new(0.0, Color::BLACK), ColorStop::new(1.0, Color::WHITE)]
    }

    #[test]
    fn stops_hash_ignores_geometry() {
        let a = Gradient::linear(Vec2::zero(), Vec2::new(10.0, 0.0), stops());
        let b = Gradient::radial(Vec2::new(5.0, 5.0), 3.0, stops());
        assert_eq!(a.stops_hash(), b.stops_hash());
    }

    #[test]
    fn stops_hash_sees_colors() {
        let a = Gradient::linear(Vec2::zero(), Vec2::new(10.0, 0.0), stops());
        let mut other = stops();
        other[1].color = Color::from_straight(1.0, 0.0, 0.0, 1.0);
        let b = Gradient::linear(Vec2::zero(), Vec2::new(10.0, 0.0), other);
        assert_ne!(a.stops_hash(), b.stops_hash());
    }

    #[test]
    fn opacity_follows_stops() {
        let mut g = Gradient::conical(Vec2::zero(), 0.0, stops());
        assert!(g.is_opaque());
        g.stops[0].color = Color::TRANSPARENT;
        assert!(!g.is_opaque());
    }
}
