// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The uniform heap: bump-allocated constant data for frames in flight.

# Regions

| Region | Memory | Copies | Written by |
|--------|--------|--------|------------|
| [`Region::Dynamic`] | upload | one per frame slot | CPU, every frame |
| [`Region::Scratch`] | upload | one per frame slot, fixed-size slots | CPU, per dispatch |
| [`Region::Static`] | device-local | one | copies recorded at flush |

# Lifecycle

1. Request space: [`UniformHeap::request_dynamic_space`], [`UniformHeap::request_static_space`],
   [`UniformHeap::request_scratch_slot`].  Each returns an index.
2. [`UniformHeap::finish`] creates the backing buffers.  No more requests are accepted.
3. Each frame, update by index and read GPU addresses by index.  Dynamic and scratch updates take
   effect immediately in the current slot's copy.  Static updates are queued and copied at the
   next flush.

The dynamic copy for slot `s` lives at `base + byte_size * s`, so two slots' addresses for the
same allocation always differ by `byte_size` times the slot distance.

# Static update paths

Static allocations choose a [`StaticUpdatePolicy`] at request time.  `Staged` allocates a
staging buffer per update and releases it one full frame cycle after the copy; use it for data
that changes rarely.  `Frequent` keeps one upload mirror per slot and at most one pending update
per allocation; use it for data that changes most frames.
*/

use crate::bindings::allocation::{AllocationRecord, BumpRegion, GpuAddress, Region};
use crate::bindings::resource_tracking::{ResourceId, StateTracker};
use crate::bindings::scratch::{ScratchIndex, ScratchRing};
use crate::bindings::staging::PendingUploads;
use crate::bindings::visible_to::{ResourceKind, ResourceState, Subresource};
use crate::bittricks::align_up;
use crate::config::HeapConfig;
use crate::error::{Error, violation};
use crate::imp::{Buffer, CommandList, Device, MemoryKind};
use crate::multibuffer::Multibuffered;
use crate::sync::FrameSlot;

/// Names a dynamic allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicIndex(u32);

/// Names a static allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticIndex(u32);

impl StaticIndex {
    #[cfg(test)]
    pub(crate) fn from_raw(index: u32) -> Self {
        StaticIndex(index)
    }
}

/// How a static allocation is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaticUpdatePolicy {
    /// A staging buffer per update.
    #[default]
    Staged,
    /// A per-slot upload mirror; updates are deduplicated until flush.
    Frequent,
}

#[derive(Debug)]
struct Backing {
    upload: Buffer,
    scratch_base: u64,
    device_local: Option<Buffer>,
    mirror: Option<Buffer>,
    static_resource: Option<ResourceId>,
}

/// What one flush recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FlushReport {
    pub(crate) staged: usize,
    pub(crate) frequent: usize,
    pub(crate) released: usize,
}

impl FlushReport {
    pub(crate) fn copies(&self) -> usize {
        self.staged + self.frequent
    }
}

#[derive(Debug)]
pub struct UniformHeap {
    frame_count: usize,
    alignment: u64,
    dynamic: BumpRegion,
    statics: BumpRegion,
    policies: Vec<StaticUpdatePolicy>,
    mirrors: Vec<Option<Multibuffered>>,
    mirror_cursor: u64,
    scratch: ScratchRing,
    backing: Option<Backing>,
    pending: PendingUploads,
}

impl UniformHeap {
    pub fn new(config: &HeapConfig, frame_count: usize) -> Self {
        let alignment = config.constant_alignment();
        UniformHeap {
            frame_count,
            alignment,
            dynamic: BumpRegion::new(Region::Dynamic, alignment, frame_count),
            statics: BumpRegion::new(Region::Static, alignment, 1),
            policies: Vec::new(),
            mirrors: Vec::new(),
            mirror_cursor: 0,
            scratch: ScratchRing::new(config.scratch_slot_size(), config.scratch_slot_count()),
            backing: None,
            pending: PendingUploads::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.backing.is_some()
    }

    #[track_caller]
    fn check_not_finished(&self, operation: &'static str) -> Result<(), Error> {
        if self.is_finished() {
            return violation!(AfterFinish, operation, "the uniform heap is already finished");
        }
        Ok(())
    }

    #[track_caller]
    fn backing(&self, operation: &'static str) -> Result<&Backing, Error> {
        match &self.backing {
            Some(backing) => Ok(backing),
            None => violation!(BeforeFinish, operation, "the uniform heap is not finished"),
        }
    }

    /// Reserves `size` bytes in every frame slot's copy of the dynamic region.
    #[track_caller]
    pub fn request_dynamic_space(&mut self, size: u64) -> Result<DynamicIndex, Error> {
        const OPERATION: &str = "UniformHeap::request_dynamic_space";
        self.check_not_finished(OPERATION)?;
        Ok(DynamicIndex(self.dynamic.push(size, OPERATION)?))
    }

    /// Reserves `size` bytes of the static region.
    #[track_caller]
    pub fn request_static_space(
        &mut self,
        size: u64,
        policy: StaticUpdatePolicy,
    ) -> Result<StaticIndex, Error> {
        const OPERATION: &str = "UniformHeap::request_static_space";
        self.check_not_finished(OPERATION)?;
        let index = self.statics.push(size, OPERATION)?;
        let mirror = match policy {
            StaticUpdatePolicy::Staged => None,
            StaticUpdatePolicy::Frequent => {
                let stride = self.statics.get(index).map_or(0, |r| r.byte_size);
                let mirror = Multibuffered::new(self.mirror_cursor, stride);
                self.mirror_cursor += mirror.span(self.frame_count);
                Some(mirror)
            }
        };
        self.policies.push(policy);
        self.mirrors.push(mirror);
        Ok(StaticIndex(index))
    }

    /// Reserves one scratch slot able to hold `size` bytes.
    #[track_caller]
    pub fn request_scratch_slot(&mut self, size: u64) -> Result<ScratchIndex, Error> {
        self.check_not_finished("UniformHeap::request_scratch_slot")?;
        self.scratch.request(size)
    }

    /// Creates the backing buffers.  The static region is registered with `tracker` with
    /// [`ResourceState::VertexAndConstantBuffer`] as its target.
    #[track_caller]
    pub fn finish(&mut self, device: &Device, tracker: &mut StateTracker) -> Result<(), Error> {
        const OPERATION: &str = "UniformHeap::finish";
        self.check_not_finished(OPERATION)?;
        let scratch_base = self.dynamic.total_size();
        let scratch_size = self.scratch.total_size(self.frame_count);
        let upload_size = match scratch_base
            .checked_add(scratch_size)
            .and_then(|s| align_up(s.max(self.alignment), self.alignment))
        {
            Some(size) => size,
            None => {
                return violation!(Exhausted, OPERATION, "upload region overflows");
            }
        };
        let upload = device.create_buffer(upload_size, MemoryKind::Upload, "uniform heap upload")?;
        let static_size = self.statics.total_size();
        let (device_local, static_resource) = if static_size > 0 {
            let buffer =
                device.create_buffer(static_size, MemoryKind::DeviceLocal, "uniform heap static")?;
            //shaders may bind the region before its first upload
            let id = tracker.register(
                ResourceKind::Buffer,
                ResourceState::VertexAndConstantBuffer,
                ResourceState::VertexAndConstantBuffer,
                "uniform heap static",
            )?;
            (Some(buffer), Some(id))
        } else {
            (None, None)
        };
        let mirror = if self.mirror_cursor > 0 {
            Some(device.create_buffer(
                self.mirror_cursor,
                MemoryKind::Upload,
                "uniform heap frequent mirror",
            )?)
        } else {
            None
        };
        logwise::info_sync!(
            "UniformHeap finished: dynamic {dynamic} scratch {scratch} static {statics} mirror {mirror} bytes",
            dynamic = scratch_base,
            scratch = scratch_size,
            statics = static_size,
            mirror = self.mirror_cursor
        );
        self.backing = Some(Backing {
            upload,
            scratch_base,
            device_local,
            mirror,
            static_resource,
        });
        Ok(())
    }

    #[track_caller]
    fn dynamic_record(
        &self,
        index: DynamicIndex,
        operation: &'static str,
    ) -> Result<AllocationRecord, Error> {
        match self.dynamic.get(index.0) {
            Some(record) => Ok(*record),
            None => violation!(UnknownIndex, operation, "{index:?} was not allocated by this heap"),
        }
    }

    #[track_caller]
    fn static_record(
        &self,
        index: StaticIndex,
        operation: &'static str,
    ) -> Result<AllocationRecord, Error> {
        match self.statics.get(index.0) {
            Some(record) => Ok(*record),
            None => violation!(UnknownIndex, operation, "{index:?} was not allocated by this heap"),
        }
    }

    #[track_caller]
    fn check_scratch(&self, index: ScratchIndex, operation: &'static str) -> Result<(), Error> {
        if !self.scratch.contains(index) {
            return violation!(UnknownIndex, operation, "{index:?} was not reserved by this heap");
        }
        Ok(())
    }

    #[track_caller]
    fn check_size(
        len: usize,
        capacity: u64,
        operation: &'static str,
    ) -> Result<(), Error> {
        if len as u64 > capacity {
            return violation!(
                UpdateTooLarge,
                operation,
                "{len} bytes exceeds the slot size of {capacity}"
            );
        }
        Ok(())
    }

    /// The record describing a dynamic allocation.  Valid before `finish`.
    #[track_caller]
    pub fn dynamic_allocation(&self, index: DynamicIndex) -> Result<AllocationRecord, Error> {
        self.dynamic_record(index, "UniformHeap::dynamic_allocation")
    }

    #[track_caller]
    pub fn static_allocation(&self, index: StaticIndex) -> Result<AllocationRecord, Error> {
        self.static_record(index, "UniformHeap::static_allocation")
    }

    #[track_caller]
    pub fn dynamic_address(&self, index: DynamicIndex, slot: FrameSlot) -> Result<GpuAddress, Error> {
        const OPERATION: &str = "UniformHeap::dynamic_address";
        let backing = self.backing(OPERATION)?;
        let record = self.dynamic_record(index, OPERATION)?;
        let offset = Multibuffered::new(record.byte_offset, record.byte_size).offset_for(slot);
        Ok(GpuAddress(backing.upload.gpu_address() + offset))
    }

    #[track_caller]
    pub fn static_address(&self, index: StaticIndex) -> Result<GpuAddress, Error> {
        const OPERATION: &str = "UniformHeap::static_address";
        let backing = self.backing(OPERATION)?;
        let record = self.static_record(index, OPERATION)?;
        match &backing.device_local {
            Some(buffer) => Ok(GpuAddress(buffer.gpu_address() + record.byte_offset)),
            None => violation!(UnknownIndex, OPERATION, "the static region is empty"),
        }
    }

    #[track_caller]
    pub fn scratch_address(&self, index: ScratchIndex, slot: FrameSlot) -> Result<GpuAddress, Error> {
        const OPERATION: &str = "UniformHeap::scratch_address";
        let backing = self.backing(OPERATION)?;
        self.check_scratch(index, OPERATION)?;
        Ok(GpuAddress(
            backing.upload.gpu_address() + backing.scratch_base + self.scratch.offset(index, slot),
        ))
    }

    /// Writes `data` into `slot`'s copy of a dynamic allocation.
    #[track_caller]
    pub fn update_dynamic(
        &self,
        device: &Device,
        index: DynamicIndex,
        slot: FrameSlot,
        data: &[u8],
    ) -> Result<(), Error> {
        const OPERATION: &str = "UniformHeap::update_dynamic";
        let backing = self.backing(OPERATION)?;
        let record = self.dynamic_record(index, OPERATION)?;
        Self::check_size(data.len(), record.byte_size, OPERATION)?;
        let offset = Multibuffered::new(record.byte_offset, record.byte_size).offset_for(slot);
        device.write_buffer(&backing.upload, offset, data)?;
        Ok(())
    }

    /// Writes `data` into `slot`'s copy of a scratch slot.
    #[track_caller]
    pub fn update_scratch(
        &self,
        device: &Device,
        index: ScratchIndex,
        slot: FrameSlot,
        data: &[u8],
    ) -> Result<(), Error> {
        const OPERATION: &str = "UniformHeap::update_scratch";
        let backing = self.backing(OPERATION)?;
        self.check_scratch(index, OPERATION)?;
        Self::check_size(data.len(), self.scratch.slot_size(), OPERATION)?;
        let offset = backing.scratch_base + self.scratch.offset(index, slot);
        device.write_buffer(&backing.upload, offset, data)?;
        Ok(())
    }

    /// Stages `data` for a static allocation.  The copy is recorded at the next flush.
    #[track_caller]
    pub fn update_static(
        &mut self,
        device: &Device,
        index: StaticIndex,
        slot: FrameSlot,
        data: &[u8],
    ) -> Result<(), Error> {
        const OPERATION: &str = "UniformHeap::update_static";
        self.backing(OPERATION)?;
        let record = self.static_record(index, OPERATION)?;
        Self::check_size(data.len(), record.byte_size, OPERATION)?;
        if data.is_empty() {
            return Ok(());
        }
        let staging = device.create_buffer(
            data.len() as u64,
            MemoryKind::Upload,
            &format!("static staging {index}", index = index.0),
        )?;
        device.write_buffer(&staging, 0, data)?;
        self.pending.push_staged(staging, record.byte_offset, slot);
        Ok(())
    }

    /// Queues `data` for a [`StaticUpdatePolicy::Frequent`] allocation, replacing any update
    /// still pending for it.
    #[track_caller]
    pub fn update_frequently_updated_static(
        &mut self,
        index: StaticIndex,
        data: &[u8],
    ) -> Result<(), Error> {
        const OPERATION: &str = "UniformHeap::update_frequently_updated_static";
        self.backing(OPERATION)?;
        let record = self.static_record(index, OPERATION)?;
        if self.policies[index.0 as usize] != StaticUpdatePolicy::Frequent {
            return violation!(
                PolicyMismatch,
                OPERATION,
                "{index:?} was requested with the staged policy"
            );
        }
        Self::check_size(data.len(), record.byte_size, OPERATION)?;
        self.pending.push_frequent(index, data);
        Ok(())
    }

    pub fn has_pending_copies(&self) -> bool {
        self.pending.has_copies()
    }

    /// Pending staged records, including committed ones awaiting release.
    pub fn staged_uploads_in_flight(&self) -> usize {
        self.pending.staged_len()
    }

    pub fn frequent_updates_pending(&self) -> usize {
        self.pending.frequent_len()
    }

    /// Records every pending static upload on `list` for frame `slot`.
    ///
    /// Staged records committed by the previous flush on this slot are released first; the
    /// caller must have waited on the slot's fence.
    pub(crate) fn record_copies(
        &mut self,
        device: &Device,
        list: &mut CommandList,
        tracker: &mut StateTracker,
        slot: FrameSlot,
    ) -> Result<FlushReport, Error> {
        let mut report = FlushReport {
            released: self.pending.release_committed(slot),
            ..FlushReport::default()
        };
        if !self.pending.has_copies() {
            return Ok(report);
        }
        let Some(backing) = &self.backing else {
            return violation!(
                BeforeFinish,
                "UniformHeap::record_copies",
                "the uniform heap is not finished"
            );
        };
        let (Some(device_local), Some(static_resource)) =
            (&backing.device_local, backing.static_resource)
        else {
            return violation!(
                UnknownIndex,
                "UniformHeap::record_copies",
                "uploads are pending but the static region is empty"
            );
        };
        tracker.set_resource_state(list, static_resource, ResourceState::CopyDest, Subresource::All)?;
        for record in self.pending.uncommitted() {
            list.copy_buffer(
                &record.staging,
                0,
                device_local,
                record.destination_offset,
                record.len,
            )?;
            record.committed = true;
            record.queued_at = slot;
            report.staged += 1;
        }
        for update in self.pending.take_frequent() {
            let index = update.index.0;
            let (Some(mirror), Some(mirror_buffer), Some(record)) = (
                self.mirrors[index as usize],
                &backing.mirror,
                self.statics.get(index),
            ) else {
                return violation!(
                    UnknownIndex,
                    "UniformHeap::record_copies",
                    "static allocation {index} has no frequent-update mirror"
                );
            };
            let source_offset = mirror.offset_for(slot);
            device.write_buffer(mirror_buffer, source_offset, &update.bytes)?;
            list.copy_buffer(
                mirror_buffer,
                source_offset,
                device_local,
                record.byte_offset,
                update.bytes.len() as u64,
            )?;
            report.frequent += 1;
        }
        tracker.set_resource_to_target_state(list, static_resource, Subresource::All)?;
        logwise::trace_sync!(
            "UniformHeap recorded {staged} staged and {frequent} frequent copies on {slot}",
            staged = report.staged,
            frequent = report.frequent,
            slot = slot.index()
        );
        Ok(report)
    }

    /// Drops every pending upload.  Only valid once the GPU is idle.
    pub(crate) fn release_pending(&mut self) {
        self.pending.clear();
    }

    /// Bytes reserved in each region, counting every frame slot's copy.
    pub fn region_bytes(&self) -> (u64, u64, u64) {
        (
            self.dynamic.total_size(),
            self.statics.total_size(),
            self.scratch.reserved() as u64 * self.scratch.slot_size() * self.frame_count as u64,
        )
    }

    /// The upload buffer holding the dynamic and scratch regions.
    pub fn upload_buffer(&self) -> Option<&Buffer> {
        self.backing.as_ref().map(|b| &b.upload)
    }

    /// The device-local buffer holding the static region.
    pub fn static_buffer(&self) -> Option<&Buffer> {
        self.backing.as_ref().and_then(|b| b.device_local.as_ref())
    }

    /// The tracked id of the static region.
    pub fn static_resource(&self) -> Option<ResourceId> {
        self.backing.as_ref().and_then(|b| b.static_resource)
    }

    pub fn dynamic_len(&self) -> usize {
        self.dynamic.len()
    }

    pub fn static_len(&self) -> usize {
        self.statics.len()
    }
}

#[cfg(all(test, not(feature = "backend_wgpu")))]
mod tests {
    use super::*;
    use crate::error::ViolationKind;
    use crate::imp::CommandListKind;

    fn heap(frame_count: usize) -> (Device, UniformHeap, StateTracker) {
        (
            Device::new().unwrap(),
            UniformHeap::new(&HeapConfig::default(), frame_count),
            StateTracker::new(),
        )
    }

    #[test]
    fn dynamic_addresses_differ_by_size_per_slot() {
        let (device, mut heap, mut tracker) = heap(2);
        let first = heap.request_dynamic_space(64).unwrap();
        let index = heap.request_dynamic_space(256).unwrap();
        heap.finish(&device, &mut tracker).unwrap();
        let a = heap.dynamic_address(index, FrameSlot::new(0)).unwrap();
        let b = heap.dynamic_address(index, FrameSlot::new(1)).unwrap();
        assert_eq!(b.0 - a.0, 256);
        //the first allocation occupies two 256-byte copies
        let base = heap.dynamic_address(first, FrameSlot::new(0)).unwrap();
        assert_eq!(a.0 - base.0, 512);
    }

    #[test]
    fn dynamic_updates_land_in_the_slot_copy() {
        let (device, mut heap, mut tracker) = heap(2);
        let index = heap.request_dynamic_space(16).unwrap();
        heap.finish(&device, &mut tracker).unwrap();
        heap.update_dynamic(&device, index, FrameSlot::new(1), &[9; 16])
            .unwrap();
        let upload = heap.upload_buffer().unwrap();
        assert_eq!(device.read_buffer(upload, 0, 16).unwrap(), vec![0; 16]);
        assert_eq!(device.read_buffer(upload, 256, 16).unwrap(), vec![9; 16]);
    }

    #[test]
    fn ordering_and_size_contracts() {
        let (device, mut heap, mut tracker) = heap(3);
        let index = heap.request_dynamic_space(100).unwrap();
        assert_eq!(
            heap.dynamic_address(index, FrameSlot::new(0))
                .unwrap_err()
                .violation_kind(),
            Some(ViolationKind::BeforeFinish)
        );
        heap.finish(&device, &mut tracker).unwrap();
        assert_eq!(
            heap.request_dynamic_space(4).unwrap_err().violation_kind(),
            Some(ViolationKind::AfterFinish)
        );
        assert_eq!(
            heap.request_static_space(4, StaticUpdatePolicy::Staged)
                .unwrap_err()
                .violation_kind(),
            Some(ViolationKind::AfterFinish)
        );
        assert_eq!(
            heap.request_scratch_slot(4).unwrap_err().violation_kind(),
            Some(ViolationKind::AfterFinish)
        );
        heap.update_dynamic(&device, index, FrameSlot::new(0), &[0; 256])
            .unwrap();
        assert_eq!(
            heap.update_dynamic(&device, index, FrameSlot::new(0), &[0; 257])
                .unwrap_err()
                .violation_kind(),
            Some(ViolationKind::UpdateTooLarge)
        );
        assert_eq!(
            heap.finish(&device, &mut tracker).unwrap_err().violation_kind(),
            Some(ViolationKind::AfterFinish)
        );
    }

    #[test]
    fn staged_upload_round_trip() {
        let (device, mut heap, mut tracker) = heap(2);
        let index = heap
            .request_static_space(8, StaticUpdatePolicy::Staged)
            .unwrap();
        heap.finish(&device, &mut tracker).unwrap();
        heap.update_static(&device, index, FrameSlot::new(0), &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        assert!(heap.has_pending_copies());
        let mut list = device.create_command_list(CommandListKind::Direct, "frame");
        let report = heap
            .record_copies(&device, &mut list, &mut tracker, FrameSlot::new(0))
            .unwrap();
        assert_eq!(report.staged, 1);
        assert_eq!(list.transitions().len(), 2);
        device.submit(list).unwrap();
        let static_buffer = heap.static_buffer().unwrap();
        assert_eq!(
            device.read_buffer(static_buffer, 0, 8).unwrap(),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );
        //the record stays until slot 0 comes round again
        assert_eq!(heap.staged_uploads_in_flight(), 1);
        let mut list = device.create_command_list(CommandListKind::Direct, "frame");
        let report = heap
            .record_copies(&device, &mut list, &mut tracker, FrameSlot::new(1))
            .unwrap();
        assert_eq!(report, FlushReport::default());
        let report = heap
            .record_copies(&device, &mut list, &mut tracker, FrameSlot::new(0))
            .unwrap();
        assert_eq!(report.released, 1);
        assert_eq!(heap.staged_uploads_in_flight(), 0);
    }

    #[test]
    fn frequent_updates_use_the_latest_value() {
        let (device, mut heap, mut tracker) = heap(3);
        let staged = heap
            .request_static_space(4, StaticUpdatePolicy::Staged)
            .unwrap();
        let index = heap
            .request_static_space(4, StaticUpdatePolicy::Frequent)
            .unwrap();
        heap.finish(&device, &mut tracker).unwrap();
        assert_eq!(
            heap.update_frequently_updated_static(staged, &[1])
                .unwrap_err()
                .violation_kind(),
            Some(ViolationKind::PolicyMismatch)
        );
        heap.update_frequently_updated_static(index, &[1, 1, 1, 1])
            .unwrap();
        heap.update_frequently_updated_static(index, &[2, 2, 2, 2])
            .unwrap();
        assert_eq!(heap.frequent_updates_pending(), 1);
        let mut list = device.create_command_list(CommandListKind::Direct, "frame");
        let report = heap
            .record_copies(&device, &mut list, &mut tracker, FrameSlot::new(2))
            .unwrap();
        assert_eq!(report.frequent, 1);
        assert_eq!(list.copy_count(), 1);
        device.submit(list).unwrap();
        let record = heap.static_allocation(index).unwrap();
        assert_eq!(
            device
                .read_buffer(heap.static_buffer().unwrap(), record.byte_offset, 4)
                .unwrap(),
            vec![2; 4]
        );
        assert_eq!(heap.frequent_updates_pending(), 0);
    }

    #[test]
    fn frequent_update_without_mirror_is_reported() {
        let (device, mut heap, mut tracker) = heap(2);
        let staged = heap
            .request_static_space(4, StaticUpdatePolicy::Staged)
            .unwrap();
        heap.finish(&device, &mut tracker).unwrap();
        heap.pending.push_frequent(staged, &[7; 4]);
        let mut list = device.create_command_list(CommandListKind::Direct, "frame");
        assert_eq!(
            heap.record_copies(&device, &mut list, &mut tracker, FrameSlot::new(0))
                .unwrap_err()
                .violation_kind(),
            Some(ViolationKind::UnknownIndex)
        );
        assert_eq!(list.copy_count(), 0);
    }

    #[test]
    fn scratch_slots_follow_dynamic_region() {
        let (device, mut heap, mut tracker) = heap(2);
        heap.request_dynamic_space(256).unwrap();
        let scratch = heap.request_scratch_slot(64).unwrap();
        heap.finish(&device, &mut tracker).unwrap();
        let upload = heap.upload_buffer().unwrap().gpu_address();
        assert_eq!(
            heap.scratch_address(scratch, FrameSlot::new(0)).unwrap().0,
            upload + 512
        );
        assert_eq!(
            heap.scratch_address(scratch, FrameSlot::new(1)).unwrap().0,
            upload + 512 + 256 * 64
        );
        assert_eq!(
            heap.update_scratch(&device, scratch, FrameSlot::new(0), &[0; 257])
                .unwrap_err()
                .violation_kind(),
            Some(ViolationKind::UpdateTooLarge)
        );
        assert_eq!(heap.region_bytes(), (512, 0, 512));
    }
}
