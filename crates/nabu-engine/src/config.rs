//! Engine configuration.

use crate::text::GlyphFormat;

/// Tunables for a [`PaintEngine`](crate::PaintEngine) and the caches it
/// creates for its share group.
///
/// Cache capacities only take effect for the first engine of a share group;
/// later engines reuse whatever the group already holds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of linked shader programs kept per share group.
    pub shader_cache_capacity: usize,

    /// Maximum number of gradient ramp textures kept per share group.
    pub gradient_cache_capacity: usize,

    /// Width in texels of a gradient ramp.
    pub gradient_ramp_size: u32,

    /// Upper bound on the bytes held by uploaded image textures.
    pub texture_cache_budget_bytes: usize,

    /// Caps the backend's reported maximum texture size.
    ///
    /// Images larger than the effective limit are downscaled before upload.
    pub max_texture_size_override: Option<u32>,

    /// Side length of a freshly created glyph atlas.
    pub glyph_atlas_initial_size: u32,

    /// Height the glyph atlas may grow to before it is cleared and refilled.
    ///
    /// `None` uses the backend's maximum texture size.
    pub glyph_atlas_max_height: Option<u32>,

    /// Number of horizontal sub-pixel buckets per glyph when the font engine
    /// supports sub-pixel positioning.
    pub subpixel_positions: u8,

    /// Transparent border kept around every glyph in the atlas.
    pub glyph_margin: u32,

    /// Glyph format used when the target and transform allow it.
    pub default_glyph_format: GlyphFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shader_cache_capacity: 30,
            gradient_cache_capacity: 60,
            gradient_ramp_size: 1024,
            texture_cache_budget_bytes: 64 * 1024 * 1024,
            max_texture_size_override: None,
            glyph_atlas_initial_size: 256,
            glyph_atlas_max_height: None,
            subpixel_positions: 4,
            glyph_margin: 1,
            default_glyph_format: GlyphFormat::A8,
        }
    }
}
