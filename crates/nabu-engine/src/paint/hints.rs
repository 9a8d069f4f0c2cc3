use bitflags::bitflags;

bitflags! {
    /// Quality hints carried in the paint state.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RenderHints: u8 {
        /// Smooth geometry edges. Edge coverage comes from the target's
        /// multisampling; the engine itself emits aliased geometry.
        const ANTIALIASING = 1 << 0;
        /// Sample images and texture brushes with linear filtering.
        const SMOOTH_PIXMAP_TRANSFORM = 1 << 1;
        /// Allow sub-pixel (A32) text where the target permits it.
        const TEXT_ANTIALIASING = 1 << 2;
    }
}

impl Default for RenderHints {
    fn default() -> Self {
        RenderHints::ANTIALIASING | RenderHints::TEXT_ANTIALIASING
    }
}
