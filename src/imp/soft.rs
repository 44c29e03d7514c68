// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Software GPU backend.

This backend models a GPU queue in host memory.  Buffers are byte vectors with fake GPU virtual
addresses; command lists record copies and transitions; submissions and fence signals are queued
in order and executed by a simulated GPU.

By default execution is [`Execution::Lazy`]: nothing runs until somebody waits on a fence, reads a
buffer back, or drives the queue with [`Device::step_gpu`] / [`Device::finish_gpu`].  This makes
frames-in-flight observable in tests: the CPU can run ahead of the "GPU" by a chosen number of
frames and the effect on reclamation and slot reuse can be checked exactly.

Failure injection is available through [`SoftConfig::with_max_buffer_size`] and
[`Device::inject_device_removal`].
*/

use crate::bindings::resource_tracking::Transition;
use crate::imp::{
    CommandListKind, MemoryKind, STATUS_DEVICE_REMOVED, STATUS_FAIL, STATUS_INVALID_ARG,
    STATUS_OUT_OF_MEMORY,
};
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

//fake virtual address space
const ADDRESS_SPACE_BASE: u64 = 0x0000_0100_0000_0000;
const ADDRESS_GRANULARITY: u64 = 64 * 1024;
const DESCRIPTOR_CPU_BASE: u64 = 0x0000_7000_0000_0000;
const DESCRIPTOR_GPU_BASE: u64 = 0x0000_0800_0000_0000;
const DESCRIPTOR_INCREMENT: u32 = 32;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{label}: {requested} bytes exceeds the device limit of {limit} bytes")]
    OutOfMemory {
        label: String,
        requested: u64,
        limit: u64,
    },
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
}

impl Error {
    /// The platform status code for this failure.
    pub fn status(&self) -> u32 {
        match self {
            Error::OutOfMemory { .. } => STATUS_OUT_OF_MEMORY,
            Error::DeviceRemoved { .. } => STATUS_DEVICE_REMOVED,
            Error::NotCpuWritable { .. } | Error::OutOfBounds { .. } => STATUS_INVALID_ARG,
            Error::FenceNeverSignaled { .. } => STATUS_FAIL,
        }
    }

    pub fn is_device_removed(&self) -> bool {
        matches!(self, Error::DeviceRemoved { .. })
    }
}

/// When the simulated GPU executes submitted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    /// Work runs only when the CPU waits, reads back, or steps the queue.
    #[default]
    Lazy,
    /// Work runs as soon as it is submitted.
    Immediate,
}

/// Construction options for the software device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftConfig {
    execution: Execution,
    max_buffer_size: u64,
}

impl Default for SoftConfig {
    fn default() -> Self {
        SoftConfig {
            execution: Execution::Lazy,
            max_buffer_size: 256 * 1024 * 1024,
        }
    }
}

impl SoftConfig {
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Buffers larger than this fail with an out-of-memory status.
    pub fn with_max_buffer_size(mut self, max_buffer_size: u64) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    pub fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }
}

/// Identifies a submission on the simulated queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionIndex(u64);

struct BufferInner {
    label: String,
    size: u64,
    memory: MemoryKind,
    gpu_address: u64,
    bytes: Mutex<Vec<u8>>,
}

/// A linear allocation with a GPU virtual address.
///
/// Cloning shares the allocation.  Recorded command lists hold clones, so memory outlives any
/// work that references it.
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
            .field("gpu_address", &format_args!("{:#x}", self.inner.gpu_address))
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

    pub fn gpu_address(&self) -> u64 {
        self.inner.gpu_address
    }

    pub fn memory(&self) -> MemoryKind {
        self.inner.memory
    }

    pub fn label(&self) -> &str {
        &self.inner.label
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
}

/// A monotonically increasing GPU timeline value.
#[derive(Clone)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Debug for Fence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("label", &self.inner.label)
            .field("completed", &self.completed_value())
            .finish()
    }
}

impl Fence {
    /// The highest value the GPU has signaled.
    pub fn completed_value(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

/// A contiguous range of descriptor handles.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    label: String,
    capacity: u32,
    cpu_start: u64,
    gpu_start: u64,
}

impl DescriptorTable {
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn cpu_start(&self) -> u64 {
        self.cpu_start
    }

    pub fn gpu_start(&self) -> u64 {
        self.gpu_start
    }

    /// Distance in bytes between adjacent handles.
    pub fn increment(&self) -> u32 {
        DESCRIPTOR_INCREMENT
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug)]
enum Command {
    Copy {
        source: Buffer,
        source_offset: u64,
        destination: Buffer,
        destination_offset: u64,
        len: u64,
    },
    Signal {
        fence: Fence,
        value: u64,
    },
}

impl Command {
    fn execute(&self) {
        match self {
            Command::Copy {
                source,
                source_offset,
                destination,
                destination_offset,
                len,
            } => {
                let (so, d_o, len) = (
                    *source_offset as usize,
                    *destination_offset as usize,
                    *len as usize,
                );
                if source == destination {
                    let mut bytes = lock(&source.inner.bytes);
                    bytes.copy_within(so..so + len, d_o);
                } else {
                    let src = lock(&source.inner.bytes);
                    let mut dst = lock(&destination.inner.bytes);
                    dst[d_o..d_o + len].copy_from_slice(&src[so..so + len]);
                }
            }
            Command::Signal { fence, value } => {
                fence.inner.completed.fetch_max(*value, Ordering::AcqRel);
            }
        }
    }
}

/// A recorded list of copies and transitions.
pub struct CommandList {
    kind: CommandListKind,
    label: String,
    commands: Vec<Command>,
    transitions: Vec<Transition>,
}

impl Debug for CommandList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("commands", &self.commands.len())
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

    /// Records a buffer-to-buffer copy of `len` bytes.
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
        self.commands.push(Command::Copy {
            source: source.clone(),
            source_offset,
            destination: destination.clone(),
            destination_offset,
            len,
        });
        Ok(())
    }

    /// Records a resource transition.
    ///
    /// Callers check the list kind; see `StateTracker`.
    pub fn resource_barrier(&mut self, transition: Transition) {
        debug_assert_eq!(self.kind, CommandListKind::Direct);
        self.transitions.push(transition);
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn copy_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Copy { .. }))
            .count()
    }
}

struct Submission {
    index: SubmissionIndex,
    commands: Vec<Command>,
}

struct Queue {
    pending: VecDeque<Submission>,
    next_index: u64,
}

struct DeviceShared {
    config: SoftConfig,
    queue: Mutex<Queue>,
    next_address: AtomicU64,
    next_descriptor_offset: AtomicU64,
    removed: Mutex<Option<String>>,
}

/// The simulated GPU device and its single queue.
#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.shared.config)
            .field("pending_submissions", &self.pending_submissions())
            .field("removed", &self.removal_reason())
            .finish()
    }
}

impl Device {
    pub fn new() -> Result<Self, Error> {
        Ok(Self::with_config(SoftConfig::default()))
    }

    pub fn with_config(config: SoftConfig) -> Self {
        logwise::info_sync!(
            "soft::Device created with {execution} execution",
            execution = logwise::privacy::LogIt(&config.execution)
        );
        Device {
            shared: Arc::new(DeviceShared {
                config,
                queue: Mutex::new(Queue {
                    pending: VecDeque::new(),
                    next_index: 1,
                }),
                next_address: AtomicU64::new(ADDRESS_SPACE_BASE),
                next_descriptor_offset: AtomicU64::new(0),
                removed: Mutex::new(None),
            }),
        }
    }

    fn check_removed(&self) -> Result<(), Error> {
        match lock(&self.shared.removed).as_ref() {
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
        if size > self.shared.config.max_buffer_size {
            return Err(Error::OutOfMemory {
                label: label.to_string(),
                requested: size,
                limit: self.shared.config.max_buffer_size,
            });
        }
        let reserve = size.max(1).div_ceil(ADDRESS_GRANULARITY) * ADDRESS_GRANULARITY;
        let gpu_address = self.shared.next_address.fetch_add(reserve, Ordering::Relaxed);
        Ok(Buffer {
            inner: Arc::new(BufferInner {
                label: label.to_string(),
                size,
                memory,
                gpu_address,
                bytes: Mutex::new(vec![0; size as usize]),
            }),
        })
    }

    /// Writes `data` through the CPU mapping of an upload buffer.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), Error> {
        self.check_removed()?;
        if !buffer.memory().is_cpu_writable() {
            return Err(Error::NotCpuWritable {
                label: buffer.label().to_string(),
                memory: buffer.memory(),
            });
        }
        buffer.check_range(offset, data.len() as u64)?;
        let offset = offset as usize;
        lock(&buffer.inner.bytes)[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Reads back buffer contents after all submitted work has executed.
    pub fn read_buffer(&self, buffer: &Buffer, offset: u64, len: u64) -> Result<Vec<u8>, Error> {
        self.check_removed()?;
        buffer.check_range(offset, len)?;
        self.finish_gpu();
        let offset = offset as usize;
        Ok(lock(&buffer.inner.bytes)[offset..offset + len as usize].to_vec())
    }

    pub fn create_command_list(&self, kind: CommandListKind, label: &str) -> CommandList {
        CommandList {
            kind,
            label: label.to_string(),
            commands: Vec::new(),
            transitions: Vec::new(),
        }
    }

    fn enqueue(&self, commands: Vec<Command>) -> SubmissionIndex {
        let index = {
            let mut queue = lock(&self.shared.queue);
            let index = SubmissionIndex(queue.next_index);
            queue.next_index += 1;
            queue.pending.push_back(Submission { index, commands });
            index
        };
        if self.shared.config.execution == Execution::Immediate {
            self.finish_gpu();
        }
        index
    }

    pub fn submit(&self, list: CommandList) -> Result<SubmissionIndex, Error> {
        self.check_removed()?;
        logwise::trace_sync!(
            "soft::Device::submit {label} with {commands} commands",
            label = list.label.clone(),
            commands = list.commands.len()
        );
        Ok(self.enqueue(list.commands))
    }

    pub fn create_fence(&self, label: &str) -> Result<Fence, Error> {
        self.check_removed()?;
        Ok(Fence {
            inner: Arc::new(FenceInner {
                label: label.to_string(),
                completed: AtomicU64::new(0),
            }),
        })
    }

    /// Queues a signal of `value` on `fence` behind all previously submitted work.
    pub fn signal(&self, fence: &Fence, value: u64) -> Result<(), Error> {
        self.check_removed()?;
        self.enqueue(vec![Command::Signal {
            fence: fence.clone(),
            value,
        }]);
        Ok(())
    }

    /// Blocks until `fence` reaches `value`.
    ///
    /// Returns immediately once the device has been removed; no further progress is possible.
    pub fn wait(&self, fence: &Fence, value: u64) -> Result<(), Error> {
        while fence.completed_value() < value {
            if self.removal_reason().is_some() {
                return Ok(());
            }
            if !self.step_gpu() {
                return Err(Error::FenceNeverSignaled {
                    label: fence.label().to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn create_descriptor_table(
        &self,
        capacity: u32,
        label: &str,
    ) -> Result<DescriptorTable, Error> {
        self.check_removed()?;
        let span = capacity as u64 * DESCRIPTOR_INCREMENT as u64;
        let offset = self
            .shared
            .next_descriptor_offset
            .fetch_add(span, Ordering::Relaxed);
        Ok(DescriptorTable {
            label: label.to_string(),
            capacity,
            cpu_start: DESCRIPTOR_CPU_BASE + offset,
            gpu_start: DESCRIPTOR_GPU_BASE + offset,
        })
    }

    /// The reason the device was removed, if it has been.
    pub fn removal_reason(&self) -> Option<String> {
        lock(&self.shared.removed).clone()
    }

    /// Executes the oldest pending submission.  Returns false if the queue was empty.
    pub fn step_gpu(&self) -> bool {
        if self.removal_reason().is_some() {
            return false;
        }
        let submission = lock(&self.shared.queue).pending.pop_front();
        match submission {
            Some(submission) => {
                for command in &submission.commands {
                    command.execute();
                }
                logwise::trace_sync!(
                    "soft::Device executed submission {index}",
                    index = submission.index.0
                );
                true
            }
            None => false,
        }
    }

    /// Executes every pending submission.
    pub fn finish_gpu(&self) {
        while self.step_gpu() {}
    }

    pub fn pending_submissions(&self) -> usize {
        lock(&self.shared.queue).pending.len()
    }

    /// Simulates device loss.  Pending work is discarded.
    pub fn inject_device_removal(&self, reason: &str) {
        logwise::error_sync!(
            "soft::Device removed: {reason}",
            reason = reason.to_string()
        );
        *lock(&self.shared.removed) = Some(reason.to_string());
        lock(&self.shared.queue).pending.clear();
    }

    pub fn config(&self) -> &SoftConfig {
        &self.shared.config
    }
}
