// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! CPU/GPU frame synchronization.
//!
//! With `N` frames in flight there are `N` frame slots.  Each slot owns a fence.  At the end of a
//! frame the fence of that frame's slot is signaled with a fresh value from a single monotonic
//! counter; before a slot is reused the CPU blocks until that value has completed.  Because the
//! counter is shared, the values double as *fence generations*: every value the GPU has reached
//! implies that all earlier frames are complete too.
//!
//! | Operation | Blocks? |
//! |-----------|---------|
//! | [`FrameSynchronizer::signal_after_submit`] | no |
//! | [`FrameSynchronizer::wait_if_not_ready`] | only if the slot's last frame is still executing |
//! | [`FrameSynchronizer::wait_for_gpu`] | always, until all submitted work is done |
//!
//! Once the device is removed, waits return immediately so shutdown can proceed.

use crate::error::{Error, violation};
use crate::imp;
use std::fmt::{Display, Formatter};

/// Index of a frame in flight, `0..frame_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameSlot(u8);

impl FrameSlot {
    pub const fn new(index: u8) -> Self {
        FrameSlot(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The slot after this one.
    pub fn next(self, frame_count: usize) -> Self {
        Self::wrapping(self.index() + 1, frame_count)
    }

    /// The slot `index % frame_count`.
    pub(crate) fn wrapping(index: usize, frame_count: usize) -> Self {
        FrameSlot((index % frame_count) as u8)
    }
}

impl Display for FrameSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

#[derive(Debug)]
struct SlotFence {
    fence: imp::Fence,
    last_signaled: u64,
}

/// Owns the per-slot fences and the current frame slot.
#[derive(Debug)]
pub struct FrameSynchronizer {
    device: imp::Device,
    slots: Vec<SlotFence>,
    current: FrameSlot,
    next_value: u64,
}

impl FrameSynchronizer {
    /// Creates one fence per slot, each at value 0.
    pub fn new(device: &imp::Device, frame_count: usize) -> Result<Self, Error> {
        let mut slots = Vec::with_capacity(frame_count);
        for index in 0..frame_count {
            let fence = device.create_fence(&format!("frame fence {index}"))?;
            slots.push(SlotFence {
                fence,
                last_signaled: 0,
            });
        }
        Ok(FrameSynchronizer {
            device: device.clone(),
            slots,
            current: FrameSlot::default(),
            next_value: 1,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    /// The slot the CPU is currently recording.
    pub fn current_buffer_index(&self) -> FrameSlot {
        self.current
    }

    pub(crate) fn set_current(&mut self, slot: FrameSlot) {
        debug_assert!(slot.index() < self.slots.len());
        self.current = slot;
    }

    /// The generation that the next signal will carry.
    ///
    /// Work recorded now completes no earlier than this generation.
    pub fn pending_generation(&self) -> u64 {
        self.next_value
    }

    /// The highest generation the GPU has completed.
    pub fn completed_generation(&self) -> u64 {
        self.slots
            .iter()
            .map(|s| s.fence.completed_value())
            .max()
            .unwrap_or(0)
    }

    #[track_caller]
    fn check_slot(&self, slot: FrameSlot, operation: &'static str) -> Result<usize, Error> {
        if slot.index() < self.slots.len() {
            Ok(slot.index())
        } else {
            violation!(
                UnknownIndex,
                operation,
                "{slot} is out of range for {count} frames in flight",
                count = self.slots.len()
            )
        }
    }

    /// The value most recently signaled for `slot`.
    #[track_caller]
    pub fn last_signaled(&self, slot: FrameSlot) -> Result<u64, Error> {
        let index = self.check_slot(slot, "FrameSynchronizer::last_signaled")?;
        Ok(self.slots[index].last_signaled)
    }

    /// Queues a signal on `slot`'s fence after all submitted work.  Returns the value signaled.
    #[track_caller]
    pub fn signal_after_submit(&mut self, slot: FrameSlot) -> Result<u64, Error> {
        let index = self.check_slot(slot, "FrameSynchronizer::signal_after_submit")?;
        let value = self.next_value;
        let entry = &mut self.slots[index];
        self.device.signal(&entry.fence, value)?;
        entry.last_signaled = value;
        self.next_value += 1;
        logwise::trace_sync!(
            "FrameSynchronizer signaled {slot} with {value}",
            slot = slot.index(),
            value = value
        );
        Ok(value)
    }

    /// Blocks until the frame last submitted on `slot` has completed.
    #[track_caller]
    pub fn wait_if_not_ready(&self, slot: FrameSlot) -> Result<(), Error> {
        let index = self.check_slot(slot, "FrameSynchronizer::wait_if_not_ready")?;
        let entry = &self.slots[index];
        if entry.fence.completed_value() >= entry.last_signaled {
            return Ok(());
        }
        if self.is_device_removed() {
            return Ok(());
        }
        let stall = logwise::perfwarn_begin!("FrameSynchronizer::wait_if_not_ready");
        self.device.wait(&entry.fence, entry.last_signaled)?;
        drop(stall);
        Ok(())
    }

    /// Signals the current slot and blocks until the GPU reaches that value, which drains all
    /// previously submitted work.
    pub fn wait_for_gpu(&mut self) -> Result<(), Error> {
        if let Some(reason) = self.device.removal_reason() {
            logwise::warn_sync!(
                "FrameSynchronizer::wait_for_gpu skipped; device removed: {reason}",
                reason = reason
            );
            return Ok(());
        }
        let slot = self.current;
        let value = self.signal_after_submit(slot)?;
        let stall = logwise::perfwarn_begin!("FrameSynchronizer::wait_for_gpu");
        self.device.wait(&self.slots[slot.index()].fence, value)?;
        drop(stall);
        Ok(())
    }

    pub fn is_device_removed(&self) -> bool {
        self.device.removal_reason().is_some()
    }
}

#[cfg(all(test, not(feature = "backend_wgpu")))]
mod tests {
    use super::*;

    #[test]
    fn generations_are_shared_across_slots() {
        let device = imp::Device::new().unwrap();
        let mut sync = FrameSynchronizer::new(&device, 3).unwrap();
        assert_eq!(sync.signal_after_submit(FrameSlot::new(0)).unwrap(), 1);
        assert_eq!(sync.signal_after_submit(FrameSlot::new(1)).unwrap(), 2);
        assert_eq!(sync.pending_generation(), 3);
        assert_eq!(sync.completed_generation(), 0);
        sync.wait_if_not_ready(FrameSlot::new(0)).unwrap();
        assert_eq!(sync.completed_generation(), 1);
        //slot 2 was never signaled
        sync.wait_if_not_ready(FrameSlot::new(2)).unwrap();
        assert_eq!(device.pending_submissions(), 1);
    }

    #[test]
    fn slots_wrap() {
        assert_eq!(FrameSlot::new(1).next(3), FrameSlot::new(2));
        assert_eq!(FrameSlot::new(2).next(3), FrameSlot::new(0));
        assert_eq!(FrameSlot::wrapping(5, 2).index(), 1);
    }

    #[test]
    fn foreign_slots_are_rejected() {
        let device = imp::Device::new().unwrap();
        let mut sync = FrameSynchronizer::new(&device, 2).unwrap();
        let outside = FrameSlot::new(2);
        for kind in [
            sync.last_signaled(outside).unwrap_err().violation_kind(),
            sync.wait_if_not_ready(outside).unwrap_err().violation_kind(),
            sync.signal_after_submit(outside).unwrap_err().violation_kind(),
        ] {
            assert_eq!(kind, Some(crate::error::ViolationKind::UnknownIndex));
        }
        //nothing was signaled
        assert_eq!(sync.pending_generation(), 1);
        assert_eq!(device.pending_submissions(), 0);
    }

    #[test]
    fn wait_for_gpu_drains() {
        let device = imp::Device::new().unwrap();
        let mut sync = FrameSynchronizer::new(&device, 2).unwrap();
        sync.signal_after_submit(FrameSlot::new(0)).unwrap();
        sync.set_current(FrameSlot::new(1));
        sync.wait_for_gpu().unwrap();
        assert_eq!(device.pending_submissions(), 0);
        assert_eq!(sync.completed_generation(), 2);
        assert_eq!(sync.last_signaled(FrameSlot::new(1)).unwrap(), 2);
    }

    #[test]
    fn removal_makes_waits_noops() {
        let device = imp::Device::new().unwrap();
        let mut sync = FrameSynchronizer::new(&device, 2).unwrap();
        sync.signal_after_submit(FrameSlot::new(0)).unwrap();
        device.inject_device_removal("lost");
        sync.wait_if_not_ready(FrameSlot::new(0)).unwrap();
        sync.wait_for_gpu().unwrap();
        assert!(sync.is_device_removed());
    }
}
