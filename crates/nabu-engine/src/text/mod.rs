//! Glyph sources and text layout.
//!
//! A [`FontEngine`] rasterizes glyphs for the glyph cache; [`FontSystem`]
//! loads fonts and lays strings out into [`GlyphRun`]s.

mod font_engine;
mod font_system;
mod fontdue_engine;

pub use font_engine::{is_uniform_scale, FontEngine, GlyphFormat, GlyphId, RasterizedGlyph};
pub use font_system::{FontId, FontLoadError, FontSystem, GlyphRun};
pub use fontdue_engine::FontdueEngine;
