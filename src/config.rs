// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Construction-time configuration.
//!
//! Configuration is a plain value built with `with_*` setters and validated when a
//! [`FrameLoop`](crate::FrameLoop) is constructed.  Out-of-range values are contract violations.

use crate::bittricks::is_aligned;
use crate::error::{Error, violation};

/// Smallest and largest supported number of frames in flight.
pub const MIN_FRAME_COUNT: usize = 2;
pub const MAX_FRAME_COUNT: usize = 4;

/// When retired objects are destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimPolicy {
    /// Destroy once the GPU has completed the fence generation of the frame that retired the
    /// object.
    #[default]
    FenceGeneration,
    /// Destroy on the second revisit of the slot that retired the object.
    SlotCycle,
}

/// Sizing of the uniform heap regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    constant_alignment: u64,
    scratch_slot_size: u64,
    scratch_slot_count: u32,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            constant_alignment: 256,
            scratch_slot_size: 256,
            scratch_slot_count: 64,
        }
    }
}

impl HeapConfig {
    /// Alignment of every allocation's offset and slot size.  Must be a power of two.
    pub fn with_constant_alignment(mut self, alignment: u64) -> Self {
        self.constant_alignment = alignment;
        self
    }

    pub fn with_scratch_slot_size(mut self, size: u64) -> Self {
        self.scratch_slot_size = size;
        self
    }

    pub fn with_scratch_slot_count(mut self, count: u32) -> Self {
        self.scratch_slot_count = count;
        self
    }

    pub fn constant_alignment(&self) -> u64 {
        self.constant_alignment
    }

    pub fn scratch_slot_size(&self) -> u64 {
        self.scratch_slot_size
    }

    pub fn scratch_slot_count(&self) -> u32 {
        self.scratch_slot_count
    }

    #[track_caller]
    pub(crate) fn validate(&self) -> Result<(), Error> {
        const OPERATION: &str = "HeapConfig::validate";
        if !self.constant_alignment.is_power_of_two() {
            return violation!(
                InvalidConfig,
                OPERATION,
                "constant alignment {alignment} is not a power of two",
                alignment = self.constant_alignment
            );
        }
        if self.scratch_slot_size == 0 || !is_aligned(self.scratch_slot_size, self.constant_alignment) {
            return violation!(
                InvalidConfig,
                OPERATION,
                "scratch slot size {size} is not a nonzero multiple of {alignment}",
                size = self.scratch_slot_size,
                alignment = self.constant_alignment
            );
        }
        Ok(())
    }
}

/// Top-level configuration of a [`FrameLoop`](crate::FrameLoop).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    frame_count: usize,
    reclaim_policy: ReclaimPolicy,
    heap: HeapConfig,
    descriptor_slack: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            frame_count: 3,
            reclaim_policy: ReclaimPolicy::default(),
            heap: HeapConfig::default(),
            descriptor_slack: 4096,
        }
    }
}

impl FrameConfig {
    /// Frames in flight, `2..=4`.
    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn with_reclaim_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.reclaim_policy = policy;
        self
    }

    pub fn with_heap(mut self, heap: HeapConfig) -> Self {
        self.heap = heap;
        self
    }

    /// Extra descriptor slots reserved beyond what was requested before `finish`.
    pub fn with_descriptor_slack(mut self, slack: u32) -> Self {
        self.descriptor_slack = slack;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn reclaim_policy(&self) -> ReclaimPolicy {
        self.reclaim_policy
    }

    pub fn heap(&self) -> &HeapConfig {
        &self.heap
    }

    pub fn descriptor_slack(&self) -> u32 {
        self.descriptor_slack
    }

    #[track_caller]
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !(MIN_FRAME_COUNT..=MAX_FRAME_COUNT).contains(&self.frame_count) {
            return violation!(
                InvalidConfig,
                "FrameConfig::validate",
                "frame count {count} is outside {MIN_FRAME_COUNT}..={MAX_FRAME_COUNT}",
                count = self.frame_count
            );
        }
        self.heap.validate()
    }
}
