// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Scratch constant slots.
//!
//! The scratch region is a fixed array of equally sized slots, replicated per frame slot.  Slots
//! are reserved before the heap is finished and are never returned.  Requesting more slots than
//! configured, or a slot larger than the configured slot size, is a contract violation.

use crate::error::{Error, violation};
use crate::multibuffer::Multibuffered;
use crate::sync::FrameSlot;

/// Names a reserved scratch slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScratchIndex(u32);

impl ScratchIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub(crate) struct ScratchRing {
    slot_size: u64,
    slot_count: u32,
    next: u32,
}

impl ScratchRing {
    pub(crate) fn new(slot_size: u64, slot_count: u32) -> Self {
        ScratchRing {
            slot_size,
            slot_count,
            next: 0,
        }
    }

    #[track_caller]
    pub(crate) fn request(&mut self, size: u64) -> Result<ScratchIndex, Error> {
        const OPERATION: &str = "UniformHeap::request_scratch_slot";
        if size > self.slot_size {
            return violation!(
                UpdateTooLarge,
                OPERATION,
                "{size} bytes exceeds the scratch slot size of {slot_size}",
                slot_size = self.slot_size
            );
        }
        if self.next == self.slot_count {
            return violation!(
                Exhausted,
                OPERATION,
                "all {count} scratch slots are reserved",
                count = self.slot_count
            );
        }
        let index = ScratchIndex(self.next);
        self.next += 1;
        Ok(index)
    }

    pub(crate) fn contains(&self, index: ScratchIndex) -> bool {
        index.0 < self.next
    }

    pub(crate) fn slot_size(&self) -> u64 {
        self.slot_size
    }

    pub(crate) fn reserved(&self) -> u32 {
        self.next
    }

    /// Bytes backing every slot for every frame.
    pub(crate) fn total_size(&self, frame_count: usize) -> u64 {
        self.frame_stride() * frame_count as u64
    }

    fn frame_stride(&self) -> u64 {
        self.slot_size * self.slot_count as u64
    }

    /// Placement of `index` relative to the start of the scratch region.
    pub(crate) fn placement(&self, index: ScratchIndex) -> Multibuffered {
        Multibuffered::new(index.0 as u64 * self.slot_size, self.frame_stride())
    }

    pub(crate) fn offset(&self, index: ScratchIndex, slot: FrameSlot) -> u64 {
        self.placement(index).offset_for(slot)
    }
}
