//! Stencil buffer layout and state.
//!
//! An 8-bit stencil value is split in two fields:
//!
//! ```text
//!   bit 7        bits 0..=6
//!   HIGH_BIT     PAYLOAD
//! ```
//!
//! The payload holds the clip level of the pixel (the pixel is inside the
//! current clip when its payload equals the engine's current level), or a
//! winding count while a complex fill is being accumulated. The high bit
//! marks fill coverage: even-odd fills toggle it, winding fills set it where
//! the count is non-zero, and the cover pass clears it again.

/// Fill-coverage marker bit.
pub const HIGH_BIT: u8 = 0x80;

/// Clip level and winding-count bits.
pub const PAYLOAD_MASK: u8 = 0x7f;

/// Clip level stored in the payload bits. Always within `1..=PAYLOAD_MASK`
/// for an active clip; zero means "outside every clip".
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub struct ClipLevel(u8);

impl ClipLevel {
    pub const NONE: ClipLevel = ClipLevel(0);
    pub const MAX: ClipLevel = ClipLevel(PAYLOAD_MASK);

    /// `None` when `value` does not fit the payload bits.
    #[inline]
    pub const fn new(value: u8) -> Option<Self> {
        if value <= PAYLOAD_MASK { Some(ClipLevel(value)) } else { None }
    }

    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The following level, `None` once the payload is exhausted.
    #[inline]
    pub const fn next(self) -> Option<Self> {
        ClipLevel::new(self.0 + 1)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl CompareFunction {
    /// `(reference & mask) OP (stored & mask)`.
    pub fn passes(self, reference: u8, stored: u8, mask: u8) -> bool {
        let (r, s) = (reference & mask, stored & mask);
        match self {
            CompareFunction::Never => false,
            CompareFunction::Less => r < s,
            CompareFunction::Equal => r == s,
            CompareFunction::LessEqual => r <= s,
            CompareFunction::Greater => r > s,
            CompareFunction::NotEqual => r != s,
            CompareFunction::GreaterEqual => r >= s,
            CompareFunction::Always => true,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

impl StencilOp {
    /// New stored value before the write mask is applied.
    pub fn apply(self, stored: u8, reference: u8) -> u8 {
        match self {
            StencilOp::Keep => stored,
            StencilOp::Zero => 0,
            StencilOp::Replace => reference,
            StencilOp::IncrementClamp => stored.saturating_add(1),
            StencilOp::DecrementClamp => stored.saturating_sub(1),
            StencilOp::Invert => !stored,
            StencilOp::IncrementWrap => stored.wrapping_add(1),
            StencilOp::DecrementWrap => stored.wrapping_sub(1),
        }
    }
}

/// Operations for one polygon facing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct StencilFaceOps {
    pub fail: StencilOp,
    pub pass: StencilOp,
}

impl StencilFaceOps {
    pub const KEEP: StencilFaceOps = StencilFaceOps { fail: StencilOp::Keep, pass: StencilOp::Keep };

    #[inline]
    pub const fn new(fail: StencilOp, pass: StencilOp) -> Self {
        Self { fail, pass }
    }

    /// Same op on pass and fail.
    #[inline]
    pub const fn always(op: StencilOp) -> Self {
        Self { fail: op, pass: op }
    }
}

/// Complete stencil test and update configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StencilState {
    pub compare: CompareFunction,
    pub reference: u8,
    pub read_mask: u8,
    pub write_mask: u8,
    pub front: StencilFaceOps,
    pub back: StencilFaceOps,
}

impl StencilState {
    /// Test only, no writes.
    pub const fn test(compare: CompareFunction, reference: u8, read_mask: u8) -> Self {
        Self {
            compare,
            reference,
            read_mask,
            write_mask: 0,
            front: StencilFaceOps::KEEP,
            back: StencilFaceOps::KEEP,
        }
    }

    pub const fn with_ops(mut self, ops: StencilFaceOps) -> Self {
        self.front = ops;
        self.back = ops;
        self
    }

    pub const fn with_face_ops(mut self, front: StencilFaceOps, back: StencilFaceOps) -> Self {
        self.front = front;
        self.back = back;
        self
    }

    pub const fn with_write_mask(mut self, mask: u8) -> Self {
        self.write_mask = mask;
        self
    }

    /// Stencil value after a fragment of the given facing runs through this
    /// state. Returns the updated value and whether the test passed.
    pub fn process(&self, stored: u8, front_facing: bool) -> (u8, bool) {
        let ops = if front_facing { self.front } else { self.back };
        let passed = self.compare.passes(self.reference, stored, self.read_mask);
        let op = if passed { ops.pass } else { ops.fail };
        let updated = op.apply(stored, self.reference);
        let merged = (stored & !self.write_mask) | (updated & self.write_mask);
        (merged, passed)
    }

    /// Key for pipeline caches: everything but the reference, which is
    /// dynamic state.
    pub fn without_reference(mut self) -> Self {
        self.reference = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_levels_stay_in_payload() {
        assert_eq!(ClipLevel::new(127), Some(ClipLevel::MAX));
        assert_eq!(ClipLevel::new(128), None);
        assert_eq!(ClipLevel::MAX.next(), None);
        assert_eq!(ClipLevel::NONE.next().map(ClipLevel::value), Some(1));
    }

    #[test]
    fn compare_masks_both_sides() {
        assert!(CompareFunction::Equal.passes(3, 0x83, PAYLOAD_MASK));
        assert!(!CompareFunction::Equal.passes(3, 0x83, 0xff));
        assert!(CompareFunction::NotEqual.passes(0, 0x80, HIGH_BIT));
    }

    #[test]
    fn invert_touches_only_write_mask() {
        let s = StencilState::test(CompareFunction::Always, 0, 0xff)
            .with_ops(StencilFaceOps::new(StencilOp::Keep, StencilOp::Invert))
            .with_write_mask(HIGH_BIT);
        assert_eq!(s.process(0x05, true), (0x85, true));
        assert_eq!(s.process(0x85, false), (0x05, true));
    }

    #[test]
    fn winding_counts_wrap_per_facing() {
        let s = StencilState::test(CompareFunction::Always, 0, 0xff)
            .with_face_ops(
                StencilFaceOps::always(StencilOp::IncrementWrap),
                StencilFaceOps::always(StencilOp::DecrementWrap),
            )
            .with_write_mask(PAYLOAD_MASK);
        let (v, _) = s.process(0, false);
        assert_eq!(v, 0x7f);
        let (v, _) = s.process(v, true);
        assert_eq!(v, 0);
        assert_eq!(s.process(0x80, false).0, 0xff);
    }
}
