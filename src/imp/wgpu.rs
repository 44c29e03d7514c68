// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
wgpu backend.

wgpu has no user-visible virtual addresses, fences, or descriptor heaps, so this backend maps them:

* GPU addresses are byte offsets within the backing buffer.  Bind the buffer returned by the
  allocator with that offset.
* A [`Fence`] is a completed-value counter advanced from `Queue::on_submitted_work_done` and a
  record of the last submission that signals it.  Waiting polls the device for that submission.
* A [`DescriptorTable`] is a virtual range; handles are plain indices (increment 1).
* Resource transitions are recorded for bookkeeping only.  wgpu inserts the real barriers.

Copy offsets and lengths are padded to `wgpu::COPY_BUFFER_ALIGNMENT`.
*/

use crate::bindings::resource_tracking::Transition;
use crate::imp::{
    CommandListKind, MemoryKind, STATUS_DEVICE_REMOVED, STATUS_FAIL, STATUS_INVALID_ARG,
    STATUS_OUT_OF_MEMORY,
};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wgpu::{BufferUsages, ErrorFilter, MapMode, PollType};

pub use wgpu::SubmissionIndex;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pad(len: u64) -> u64 {
    len.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no suitable adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("{label}: allocation failed: {message}")]
    OutOfMemory { label: String, message: String },
    #[error("{label}: validation failed: {message}")]
    Validation { label: String, message: String },
    #[error("device removed: {reason}")]
    DeviceRemoved { reason: String },
    #[error("{label} is {memory:?} memory and cannot be written by the CPU")]
    NotCpuWritable { label: String, memory: MemoryKind },
    #[error("{label}: access of {len} bytes at offset {offset} exceeds size {size}")]
    OutOfBounds {
        label: String,
        offset: u64,
        len: u64,
        size: u64,
    },
    #[error("fence {label} was waited for value {value} which is never signaled")]
    FenceNeverSignaled { label: String, value: u64 },
    #[error("poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("readback map failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
}

impl Error {
    pub fn status(&self) -> u32 {
        match self {
            Error::OutOfMemory { .. } => STATUS_OUT_OF_MEMORY,
            Error::DeviceRemoved { .. } => STATUS_DEVICE_REMOVED,
            Error::NotCpuWritable { .. }
            | Error::OutOfBounds { .. }
            | Error::Validation { .. } => STATUS_INVALID_ARG,
            Error::RequestAdapter(_)
            | Error::RequestDevice(_)
            | Error::FenceNeverSignaled { .. }
            | Error::Poll(_)
            | Error::Map(_) => STATUS_FAIL,
        }
    }

    pub fn is_device_removed(&self) -> bool {
        matches!(self, Error::DeviceRemoved { .. })
    }
}

struct BufferInner {
    buffer: wgpu::Buffer,
    label: String,
    size: u64,
    memory: MemoryKind,
}

#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("label", &self.inner.label)
            .field("size", &self.inner.size)
            .field("memory", &self.inner.memory)
            .finish()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Buffer {
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// wgpu addresses are offsets within the bound buffer.
    pub fn gpu_address(&self) -> u64 {
        0
    }

    pub fn memory(&self) -> MemoryKind {
        self.inner.memory
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The underlying wgpu buffer, for binding.
    pub fn as_wgpu(&self) -> &wgpu::Buffer {
        &self.inner.buffer
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<(), Error> {
        match offset.checked_add(len) {
            Some(end) if end <= self.inner.size => Ok(()),
            _ => Err(Error::OutOfBounds {
                label: self.inner.label.clone(),
                offset,
                len,
                size: self.inner.size,
            }),
        }
    }
}

struct FenceInner {
    label: String,
    completed: AtomicU64,
    last_signal: Mutex<Option<(u64, SubmissionIndex)>>,
    device: wgpu::Device,
}

#[derive(Clone)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Debug for Fence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("label", &self.inner.label)
            .field("completed", &self.inner.completed.load(Ordering::Acquire))
            .finish()
    }
}

impl Fence {
    /// The highest value the GPU has signaled.  Polls the device without blocking.
    pub fn completed_value(&self) -> u64 {
        if let Err(e) = self.inner.device.poll(PollType::Poll) {
            logwise::warn_sync!(
                "wgpu::Fence::completed_value poll failed: {err}",
                err = logwise::privacy::LogIt(&e)
            );
        }
        self.inner.completed.load(Ordering::Acquire)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorTable {
    label: String,
    capacity: u32,
}

impl DescriptorTable {
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn cpu_start(&self) -> u64 {
        0
    }

    pub fn gpu_start(&self) -> u64 {
        0
    }

    pub fn increment(&self) -> u32 {
        1
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

pub struct CommandList {
    kind: CommandListKind,
    label: String,
    encoder: wgpu::CommandEncoder,
    transitions: Vec<Transition>,
    copies: usize,
}

impl Debug for CommandList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("copies", &self.copies)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

impl CommandList {
    pub fn kind(&self) -> CommandListKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn copy_buffer(
        &mut self,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        len: u64,
    ) -> Result<(), Error> {
        source.check_range(source_offset, len)?;
        destination.check_range(destination_offset, len)?;
        self.encoder.copy_buffer_to_buffer(
            &source.inner.buffer,
            source_offset,
            &destination.inner.buffer,
            destination_offset,
            pad(len),
        );
        self.copies += 1;
        Ok(())
    }

    pub fn resource_barrier(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn copy_count(&self) -> usize {
        self.copies
    }

    /// The encoder, for recording render and compute passes.
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }
}

struct DeviceShared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<Mutex<Option<String>>>,
}

#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("removed", &self.removal_reason())
            .finish()
    }
}

impl Device {
    /// Requests the default adapter and a device from it.
    pub fn new() -> Result<Self, Error> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = test_executors::sleep_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )?;
        let descriptor = wgpu::DeviceDescriptor {
            label: Some("frames_and_fences"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        };
        let (device, queue) = test_executors::sleep_on(adapter.request_device(&descriptor))?;
        Ok(Self::from_wgpu(device, queue))
    }

    /// Wraps an existing device and queue.
    pub fn from_wgpu(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let lost = Arc::new(Mutex::new(None));
        let move_lost = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            logwise::error_sync!(
                "wgpu device lost: {reason} {message}",
                reason = logwise::privacy::LogIt(&reason),
                message = message.clone()
            );
            *lock(&move_lost) = Some(format!("{reason:?}: {message}"));
        });
        Device {
            shared: Arc::new(DeviceShared {
                device,
                queue,
                lost,
            }),
        }
    }

    fn check_removed(&self) -> Result<(), Error> {
        match lock(&self.shared.lost).as_ref() {
            Some(reason) => Err(Error::DeviceRemoved {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn create_buffer(
        &self,
        size: u64,
        memory: MemoryKind,
        label: &str,
    ) -> Result<Buffer, Error> {
        self.check_removed()?;
        let usage = match memory {
            MemoryKind::Upload => BufferUsages::UNIFORM | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            MemoryKind::DeviceLocal => {
                BufferUsages::UNIFORM
                    | BufferUsages::STORAGE
                    | BufferUsages::COPY_DST
                    | BufferUsages::COPY_SRC
            }
            MemoryKind::Readback => BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        };
        self.shared.device.push_error_scope(ErrorFilter::Validation);
        self.shared.device.push_error_scope(ErrorFilter::OutOfMemory);
        let buffer = self.shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: pad(size),
            usage,
            mapped_at_creation: false,
        });
        let oom = test_executors::sleep_on(self.shared.device.pop_error_scope());
        let validation = test_executors::sleep_on(self.shared.device.pop_error_scope());
        if let Some(e) = oom {
            return Err(Error::OutOfMemory {
                label: label.to_string(),
                message: e.to_string(),
            });
        }
        if let Some(e) = validation {
            return Err(Error::Validation {
                label: label.to_string(),
                message: e.to_string(),
            });
        }
        Ok(Buffer {
            inner: Arc::new(BufferInner {
                buffer,
                label: label.to_string(),
                size,
                memory,
            }),
        })
    }

    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), Error> {
        self.check_removed()?;
        if !buffer.memory().is_cpu_writable() {
            return Err(Error::NotCpuWritable {
                label: buffer.label().to_string(),
                memory: buffer.memory(),
            });
        }
        buffer.check_range(offset, data.len() as u64)?;
        if data.len() as u64 == pad(data.len() as u64) {
            self.shared.queue.write_buffer(&buffer.inner.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(pad(data.len() as u64) as usize, 0);
            self.shared
                .queue
                .write_buffer(&buffer.inner.buffer, offset, &padded);
        }
        Ok(())
    }

    /// Copies the range into a mappable buffer and blocks until it can be read.
    pub fn read_buffer(&self, buffer: &Buffer, offset: u64, len: u64) -> Result<Vec<u8>, Error> {
        self.check_removed()?;
        buffer.check_range(offset, len)?;
        let readback = self.create_buffer(len, MemoryKind::Readback, "read_buffer")?;
        let mut list = self.create_command_list(CommandListKind::Copy, "read_buffer");
        list.copy_buffer(buffer, offset, &readback, 0, len)?;
        self.submit(list)?;
        let (sender, receiver) = r#continue::continuation();
        readback
            .inner
            .buffer
            .slice(..)
            .map_async(MapMode::Read, move |result| sender.send(result));
        self.shared.device.poll(PollType::Wait)?;
        test_executors::sleep_on(receiver)?;
        let bytes = {
            let view = readback.inner.buffer.slice(..).get_mapped_range();
            view[..len as usize].to_vec()
        };
        readback.inner.buffer.unmap();
        Ok(bytes)
    }

    pub fn create_command_list(&self, kind: CommandListKind, label: &str) -> CommandList {
        let encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        CommandList {
            kind,
            label: label.to_string(),
            encoder,
            transitions: Vec::new(),
            copies: 0,
        }
    }

    pub fn submit(&self, list: CommandList) -> Result<SubmissionIndex, Error> {
        self.check_removed()?;
        logwise::trace_sync!(
            "wgpu::Device::submit {label} with {copies} copies",
            label = list.label.clone(),
            copies = list.copies
        );
        Ok(self.shared.queue.submit(std::iter::once(list.encoder.finish())))
    }

    pub fn create_fence(&self, label: &str) -> Result<Fence, Error> {
        self.check_removed()?;
        Ok(Fence {
            inner: Arc::new(FenceInner {
                label: label.to_string(),
                completed: AtomicU64::new(0),
                last_signal: Mutex::new(None),
                device: self.shared.device.clone(),
            }),
        })
    }

    pub fn signal(&self, fence: &Fence, value: u64) -> Result<(), Error> {
        self.check_removed()?;
        let index = self
            .shared
            .queue
            .submit(std::iter::empty::<wgpu::CommandBuffer>());
        let move_fence = fence.inner.clone();
        self.shared.queue.on_submitted_work_done(move || {
            move_fence.completed.fetch_max(value, Ordering::AcqRel);
        });
        *lock(&fence.inner.last_signal) = Some((value, index));
        Ok(())
    }

    pub fn wait(&self, fence: &Fence, value: u64) -> Result<(), Error> {
        if fence.inner.completed.load(Ordering::Acquire) >= value
            || self.removal_reason().is_some()
        {
            return Ok(());
        }
        let index = match lock(&fence.inner.last_signal).as_ref() {
            Some((signaled, index)) if *signaled >= value => index.clone(),
            _ => {
                return Err(Error::FenceNeverSignaled {
                    label: fence.label().to_string(),
                    value,
                });
            }
        };
        self.shared
            .device
            .poll(PollType::WaitForSubmissionIndex(index))?;
        Ok(())
    }

    pub fn create_descriptor_table(
        &self,
        capacity: u32,
        label: &str,
    ) -> Result<DescriptorTable, Error> {
        self.check_removed()?;
        Ok(DescriptorTable {
            label: label.to_string(),
            capacity,
        })
    }

    pub fn removal_reason(&self) -> Option<String> {
        lock(&self.shared.lost).clone()
    }

    pub fn as_wgpu(&self) -> (&wgpu::Device, &wgpu::Queue) {
        (&self.shared.device, &self.shared.queue)
    }
}
