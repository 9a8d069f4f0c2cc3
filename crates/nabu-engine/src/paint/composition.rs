/// How source fragments combine with the destination.
///
/// Modes up to and including [`CompositionMode::Plus`] map onto the fixed
/// blend unit. The separable blend modes after it are evaluated in the
/// fragment shader against a copy of the destination.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, PartialOrd, Ord)]
pub enum CompositionMode {
    #[default]
    SourceOver,
    DestinationOver,
    Clear,
    Source,
    Destination,
    SourceIn,
    DestinationIn,
    SourceOut,
    DestinationOut,
    SourceAtop,
    DestinationAtop,
    Xor,
    Plus,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl CompositionMode {
    /// Handled by blend state alone, without a composition shader.
    #[inline]
    pub fn is_native(self) -> bool {
        self <= CompositionMode::Plus
    }
}
