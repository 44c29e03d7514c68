// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The frame loop.

[`FrameLoop`] owns every piece of per-device frame state: the synchronizer, the uniform heap, the
descriptor table, the state tracker, the reclaimer and the copy queue.  There is no global state;
pass the loop (or borrow pieces of it) to whatever needs it.

# Frame protocol

```text
setup:     request_*  ->  finish
per frame: begin_frame -> update_* / set_resource_state / queue_copy
           -> flush_copies -> (record work on command_list) -> end_frame
teardown:  shutdown
```

`begin_frame` waits until the GPU has finished the frame that last used the current slot.
`end_frame` submits the frame's command list, presents, signals the slot's fence, sweeps the
reclaimer, and moves to the slot of the presenter's next image.

Calls made out of this order are contract violations.
*/

use crate::bindings::allocation::GpuAddress;
use crate::bindings::descriptor_table::{DescriptorHandle, DescriptorTableAllocator};
use crate::bindings::resource_tracking::{ResourceId, StateTracker};
use crate::bindings::scratch::ScratchIndex;
use crate::bindings::uniform_heap::{DynamicIndex, StaticIndex, StaticUpdatePolicy, UniformHeap};
use crate::bindings::visible_to::{ResourceKind, ResourceState, Subresource};
use crate::config::FrameConfig;
use crate::copy_scheduler::CopyScheduler;
use crate::error::{Error, violation};
use crate::imp::{self, Buffer, CommandList, CommandListKind, Device};
use crate::reclaim::Reclaimer;
use crate::sync::{FrameSlot, FrameSynchronizer};

/// The presentation target a frame is handed to.
pub trait Present {
    /// Presents the frame just submitted.
    fn present(&mut self) -> Result<(), Error>;
    /// The image the next frame will render into.
    fn current_image_index(&self) -> usize;
}

/// A presenter with no surface.  Images rotate round-robin.
#[derive(Debug, Clone)]
pub struct Headless {
    image_count: usize,
    current: usize,
    presented: u64,
}

impl Headless {
    pub fn new(image_count: usize) -> Self {
        Headless {
            image_count: image_count.max(1),
            current: 0,
            presented: 0,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Present for Headless {
    fn present(&mut self) -> Result<(), Error> {
        self.current = (self.current + 1) % self.image_count;
        self.presented += 1;
        Ok(())
    }

    fn current_image_index(&self) -> usize {
        self.current
    }
}

/// A snapshot of frame loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_submitted: u64,
    /// Dynamic bytes reserved, counting every slot's copy.
    pub dynamic_bytes: u64,
    pub static_bytes: u64,
    /// Scratch bytes reserved, counting every slot's copy.
    pub scratch_bytes: u64,
    pub barriers_emitted: u64,
    /// Copies recorded by all flushes.
    pub copies_flushed: u64,
    /// Staged uploads not yet released.
    pub staged_uploads_in_flight: usize,
    pub descriptors_used: u32,
    pub pending_reclaims: usize,
    pub reclaimed: u64,
}

#[derive(Debug)]
struct OpenFrame {
    slot: FrameSlot,
    list: CommandList,
    flushed: bool,
}

#[derive(Debug)]
pub struct FrameLoop {
    device: Device,
    config: FrameConfig,
    sync: FrameSynchronizer,
    heap: UniformHeap,
    descriptors: DescriptorTableAllocator,
    tracker: StateTracker,
    reclaimer: Reclaimer,
    copies: CopyScheduler,
    open: Option<OpenFrame>,
    frames_submitted: u64,
    copies_flushed: u64,
    shut_down: bool,
}

impl FrameLoop {
    #[track_caller]
    pub fn new(device: Device, config: FrameConfig) -> Result<Self, Error> {
        config.validate()?;
        let sync = FrameSynchronizer::new(&device, config.frame_count())?;
        logwise::info_sync!(
            "FrameLoop created with {frames} frames in flight",
            frames = config.frame_count()
        );
        Ok(FrameLoop {
            heap: UniformHeap::new(config.heap(), config.frame_count()),
            descriptors: DescriptorTableAllocator::new(config.descriptor_slack()),
            tracker: StateTracker::new(),
            reclaimer: Reclaimer::new(config.reclaim_policy()),
            copies: CopyScheduler::new(),
            open: None,
            frames_submitted: 0,
            copies_flushed: 0,
            shut_down: false,
            device,
            config,
            sync,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn heap(&self) -> &UniformHeap {
        &self.heap
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.sync
    }

    pub fn current_frame_slot(&self) -> FrameSlot {
        self.sync.current_buffer_index()
    }

    fn check_device(&self) -> Result<(), Error> {
        match self.device.removal_reason() {
            Some(reason) => Err(Error::Platform(imp::Error::DeviceRemoved { reason })),
            None => Ok(()),
        }
    }

    // setup

    #[track_caller]
    pub fn request_dynamic_space(&mut self, size: u64) -> Result<DynamicIndex, Error> {
        self.heap.request_dynamic_space(size)
    }

    #[track_caller]
    pub fn request_static_space(
        &mut self,
        size: u64,
        policy: StaticUpdatePolicy,
    ) -> Result<StaticIndex, Error> {
        self.heap.request_static_space(size, policy)
    }

    #[track_caller]
    pub fn request_scratch_slot(&mut self, size: u64) -> Result<ScratchIndex, Error> {
        self.heap.request_scratch_slot(size)
    }

    #[track_caller]
    pub fn request_descriptor_space(&mut self, count: u32) -> Result<(), Error> {
        self.descriptors.request_more_space(count)
    }

    /// Creates the heap backings and the descriptor table.
    #[track_caller]
    pub fn finish(&mut self) -> Result<(), Error> {
        self.heap.finish(&self.device, &mut self.tracker)?;
        self.descriptors.finish(&self.device)?;
        Ok(())
    }

    // addresses and handles

    #[track_caller]
    pub fn dynamic_address(&self, index: DynamicIndex) -> Result<GpuAddress, Error> {
        self.heap.dynamic_address(index, self.current_frame_slot())
    }

    #[track_caller]
    pub fn static_address(&self, index: StaticIndex) -> Result<GpuAddress, Error> {
        self.heap.static_address(index)
    }

    #[track_caller]
    pub fn scratch_address(&self, index: ScratchIndex) -> Result<GpuAddress, Error> {
        self.heap.scratch_address(index, self.current_frame_slot())
    }

    #[track_caller]
    pub fn next_descriptor_handle(&mut self) -> Result<DescriptorHandle, Error> {
        self.descriptors.next_handle()
    }

    #[track_caller]
    pub fn descriptor_handle(&self, offset_from_start: u32) -> Result<DescriptorHandle, Error> {
        self.descriptors.handle(offset_from_start)
    }

    // updates

    /// The slot per-slot memory may be written for.
    ///
    /// Between `end_frame` and `begin_frame` the current slot has not been waited on, so the GPU
    /// may still read it.
    #[track_caller]
    fn writable_slot(&self, operation: &'static str) -> Result<FrameSlot, Error> {
        match &self.open {
            Some(frame) => Ok(frame.slot),
            //the heap reports BeforeFinish
            None if !self.heap.is_finished() => Ok(self.current_frame_slot()),
            None => violation!(
                FrameOrder,
                operation,
                "no frame is open; {slot} may still be in use by the GPU",
                slot = self.current_frame_slot()
            ),
        }
    }

    /// Writes the open frame's copy of a dynamic allocation.
    #[track_caller]
    pub fn update_dynamic(&self, index: DynamicIndex, data: &[u8]) -> Result<(), Error> {
        let slot = self.writable_slot("FrameLoop::update_dynamic")?;
        self.heap.update_dynamic(&self.device, index, slot, data)
    }

    /// Stages a static update; the copy is recorded at the next flush.
    #[track_caller]
    pub fn update_static(&mut self, index: StaticIndex, data: &[u8]) -> Result<(), Error> {
        let slot = self.current_frame_slot();
        self.heap.update_static(&self.device, index, slot, data)
    }

    #[track_caller]
    pub fn update_frequently_updated_static(
        &mut self,
        index: StaticIndex,
        data: &[u8],
    ) -> Result<(), Error> {
        self.heap.update_frequently_updated_static(index, data)
    }

    #[track_caller]
    pub fn update_scratch(&self, index: ScratchIndex, data: &[u8]) -> Result<(), Error> {
        let slot = self.writable_slot("FrameLoop::update_scratch")?;
        self.heap.update_scratch(&self.device, index, slot, data)
    }

    // state

    #[track_caller]
    pub fn register_resource(
        &mut self,
        kind: ResourceKind,
        initial: ResourceState,
        target: ResourceState,
        label: &str,
    ) -> Result<ResourceId, Error> {
        self.tracker.register(kind, initial, target, label)
    }

    #[track_caller]
    pub fn forget_resource(&mut self, id: ResourceId) -> Result<(), Error> {
        self.tracker.forget(id)
    }

    #[track_caller]
    fn open_frame(&mut self, operation: &'static str) -> Result<&mut OpenFrame, Error> {
        match self.open.as_mut() {
            Some(frame) => Ok(frame),
            None => violation!(FrameOrder, operation, "no frame is open"),
        }
    }

    /// Transitions a resource on the open frame's command list.  Returns barriers emitted.
    #[track_caller]
    pub fn set_resource_state(
        &mut self,
        id: ResourceId,
        state: ResourceState,
        subresource: Subresource,
    ) -> Result<usize, Error> {
        let Some(frame) = self.open.as_mut() else {
            return violation!(FrameOrder, "FrameLoop::set_resource_state", "no frame is open");
        };
        self.tracker
            .set_resource_state(&mut frame.list, id, state, subresource)
    }

    #[track_caller]
    pub fn set_resource_to_target_state(
        &mut self,
        id: ResourceId,
        subresource: Subresource,
    ) -> Result<usize, Error> {
        let Some(frame) = self.open.as_mut() else {
            return violation!(
                FrameOrder,
                "FrameLoop::set_resource_to_target_state",
                "no frame is open"
            );
        };
        self.tracker
            .set_resource_to_target_state(&mut frame.list, id, subresource)
    }

    // copies

    #[track_caller]
    pub fn queue_copy(&mut self, destination: &Buffer, source: &Buffer) -> Result<(), Error> {
        self.copies.queue_copy(destination, source)
    }

    // lifetime

    /// Keeps `owner` alive until no in-flight frame can reference it.
    pub fn retire<T: Send + 'static>(&mut self, owner: T, label: &str) {
        let slot = self.current_frame_slot();
        let generation = self.sync.pending_generation();
        self.reclaimer.retire(owner, label, slot, generation);
    }

    // frame boundary

    /// Waits for the current slot and opens its command list.
    #[track_caller]
    pub fn begin_frame(&mut self) -> Result<FrameSlot, Error> {
        const OPERATION: &str = "FrameLoop::begin_frame";
        if self.shut_down {
            return violation!(FrameOrder, OPERATION, "the frame loop is shut down");
        }
        if let Some(open) = &self.open {
            return violation!(
                FrameOrder,
                OPERATION,
                "the frame on {slot} was not ended",
                slot = open.slot
            );
        }
        self.check_device()?;
        let slot = self.current_frame_slot();
        self.sync.wait_if_not_ready(slot)?;
        let list = self.device.create_command_list(
            CommandListKind::Direct,
            &format!("frame {frame}", frame = self.frames_submitted),
        );
        self.open = Some(OpenFrame {
            slot,
            list,
            flushed: false,
        });
        Ok(slot)
    }

    /// The open frame's command list.
    #[track_caller]
    pub fn command_list(&mut self) -> Result<&mut CommandList, Error> {
        Ok(&mut self.open_frame("FrameLoop::command_list")?.list)
    }

    /// Records pending static uploads and queued copies.  At most once per frame.
    ///
    /// Returns the number of copies recorded.
    #[track_caller]
    pub fn flush_copies(&mut self) -> Result<usize, Error> {
        const OPERATION: &str = "FrameLoop::flush_copies";
        let Some(frame) = self.open.as_mut() else {
            return violation!(FrameOrder, OPERATION, "no frame is open");
        };
        if frame.flushed {
            return violation!(
                FrameOrder,
                OPERATION,
                "copies were already flushed for the frame on {slot}",
                slot = frame.slot
            );
        }
        let report =
            self.heap
                .record_copies(&self.device, &mut frame.list, &mut self.tracker, frame.slot)?;
        let queued = self.copies.flush(&mut frame.list)?;
        frame.flushed = true;
        let copies = report.copies() + queued;
        self.copies_flushed += copies as u64;
        Ok(copies)
    }

    /// Submits, presents, signals, sweeps and advances to the next slot.
    #[track_caller]
    pub fn end_frame(&mut self, presenter: &mut dyn Present) -> Result<(), Error> {
        let Some(OpenFrame { slot, list, .. }) = self.open.take() else {
            return violation!(FrameOrder, "FrameLoop::end_frame", "no frame is open");
        };
        let divergent = self.tracker.divergent_resources().count();
        if divergent > 0 {
            logwise::warn_sync!(
                "FrameLoop submitting {slot} with {divergent} resources outside their target state",
                slot = slot.index(),
                divergent = divergent
            );
        }
        self.device.submit(list)?;
        presenter.present()?;
        self.sync.signal_after_submit(slot)?;
        self.frames_submitted += 1;
        let completed = self.sync.completed_generation();
        let reclaimed = self.reclaimer.sweep(slot, completed);
        if reclaimed > 0 {
            logwise::trace_sync!(
                "FrameLoop reclaimed {reclaimed} objects on {slot}",
                reclaimed = reclaimed,
                slot = slot.index()
            );
        }
        let next = FrameSlot::wrapping(presenter.current_image_index(), self.config.frame_count());
        self.sync.set_current(next);
        Ok(())
    }

    /// Waits for the GPU to go idle and releases everything deferred.
    #[track_caller]
    pub fn shutdown(&mut self) -> Result<(), Error> {
        if let Some(open) = &self.open {
            return violation!(
                FrameOrder,
                "FrameLoop::shutdown",
                "the frame on {slot} was not ended",
                slot = open.slot
            );
        }
        if self.shut_down {
            return Ok(());
        }
        self.sync.wait_for_gpu()?;
        let drained = self.reclaimer.drain();
        self.heap.release_pending();
        self.shut_down = true;
        logwise::info_sync!(
            "FrameLoop shut down after {frames} frames; released {drained} deferred objects",
            frames = self.frames_submitted,
            drained = drained
        );
        Ok(())
    }

    pub fn stats(&self) -> FrameStats {
        let (dynamic_bytes, static_bytes, scratch_bytes) = self.heap.region_bytes();
        FrameStats {
            frames_submitted: self.frames_submitted,
            dynamic_bytes,
            static_bytes,
            scratch_bytes,
            barriers_emitted: self.tracker.barriers_emitted(),
            copies_flushed: self.copies_flushed,
            staged_uploads_in_flight: self.heap.staged_uploads_in_flight(),
            descriptors_used: self.descriptors.used(),
            pending_reclaims: self.reclaimer.pending(),
            reclaimed: self.reclaimer.reclaimed(),
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if self.shut_down || self.open.is_some() {
            return;
        }
        if let Err(e) = self.shutdown() {
            logwise::error_sync!(
                "FrameLoop shutdown on drop failed: {err}",
                err = logwise::privacy::LogIt(&e)
            );
        }
    }
}
