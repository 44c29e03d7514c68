/*!
Multibuffering of a byte range.

A multibuffered range has one copy per frame slot, laid out back to back.  The copy for slot `s`
starts at `base + stride * s`.  The GPU reads the copy belonging to the frame it is executing
while the CPU writes the copy for the frame it is recording, so neither observes a torn write.
*/

use crate::sync::FrameSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Multibuffered {
    base: u64,
    stride: u64,
}

impl Multibuffered {
    pub(crate) fn new(base: u64, stride: u64) -> Self {
        Multibuffered { base, stride }
    }

    /// Bytes spanned by all copies.
    pub(crate) fn span(&self, frame_count: usize) -> u64 {
        self.stride * frame_count as u64
    }

    pub(crate) fn offset_for(&self, slot: FrameSlot) -> u64 {
        self.base + self.stride * slot.index() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_are_stride_apart() {
        let m = Multibuffered::new(512, 256);
        assert_eq!(m.offset_for(FrameSlot::new(0)), 512);
        assert_eq!(m.offset_for(FrameSlot::new(1)), 768);
        assert_eq!(m.offset_for(FrameSlot::new(2)), 1024);
        assert_eq!(m.span(3), 768);
    }
}
