// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend seam.
//!
//! Every backend exports the same names: `Device`, `Buffer`, `CommandList`, `Fence`,
//! `DescriptorTable`, `SubmissionIndex` and `Error`.  The software backend is used unless the
//! `backend_wgpu` feature is enabled.

/// Where a backing allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// CPU-writable, GPU-readable.  Dynamic and scratch regions and staging buffers.
    Upload,
    /// GPU-local; written only by copies recorded on a command list.
    DeviceLocal,
    /// GPU-writable, CPU-readable.
    Readback,
}

impl MemoryKind {
    pub fn is_cpu_writable(self) -> bool {
        matches!(self, MemoryKind::Upload)
    }
}

/// Which commands a command list may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListKind {
    /// Graphics/compute list.  Supports copies and resource barriers.
    Direct,
    /// Copy-only list.  Resource barriers are rejected.
    Copy,
}

//status codes carried by platform errors
pub(crate) const STATUS_FAIL: u32 = 0x8000_4005;
pub(crate) const STATUS_INVALID_ARG: u32 = 0x8007_0057;
pub(crate) const STATUS_OUT_OF_MEMORY: u32 = 0x8007_000E;
pub(crate) const STATUS_DEVICE_REMOVED: u32 = 0x887A_0005;

#[cfg(not(feature = "backend_wgpu"))]
mod soft;
#[cfg(not(feature = "backend_wgpu"))]
pub use soft::*;

#[cfg(feature = "backend_wgpu")]
mod wgpu;
#[cfg(feature = "backend_wgpu")]
pub use wgpu::*;
