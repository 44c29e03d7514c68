// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Bump allocation records.
//!
//! Every region of the uniform heap is a bump allocator: requests append a record at the
//! cursor, and the cursor only moves forward.  Nothing is freed individually; the whole region
//! lives as long as its heap.

use crate::bittricks::align_up;
use crate::error::{Error, violation};

/// Which region of the uniform heap an allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Upload memory, one copy per frame slot, rewritten by the CPU every frame.
    Dynamic,
    /// Device-local memory written through copies.
    Static,
    /// Upload memory handed out in fixed-size slots, one copy per frame slot.
    Scratch,
}

/// An address the GPU can read constant data from.
///
/// On the wgpu backend this is an offset within the bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuAddress(pub u64);

impl std::fmt::Display for GpuAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Placement of one allocation within its region's backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Offset of the first copy within the backing buffer.
    pub byte_offset: u64,
    /// Aligned size of one copy.  Updates may not exceed this.
    pub byte_size: u64,
    pub region: Region,
}

#[derive(Debug)]
pub(crate) struct BumpRegion {
    region: Region,
    alignment: u64,
    replicas: u64,
    cursor: u64,
    records: Vec<AllocationRecord>,
}

impl BumpRegion {
    /// `replicas` copies of every allocation are laid out back to back.
    pub(crate) fn new(region: Region, alignment: u64, replicas: usize) -> Self {
        BumpRegion {
            region,
            alignment,
            replicas: replicas as u64,
            cursor: 0,
            records: Vec::new(),
        }
    }

    /// Appends an allocation of at least `size` bytes.  Returns its index.
    #[track_caller]
    pub(crate) fn push(&mut self, size: u64, operation: &'static str) -> Result<u32, Error> {
        let Some(byte_size) = align_up(size.max(1), self.alignment) else {
            return violation!(UpdateTooLarge, operation, "{size} bytes cannot be aligned");
        };
        let Some(cursor) = byte_size
            .checked_mul(self.replicas)
            .and_then(|span| self.cursor.checked_add(span))
        else {
            return violation!(
                Exhausted,
                operation,
                "{region:?} region overflows the address space",
                region = self.region
            );
        };
        let index = self.records.len() as u32;
        self.records.push(AllocationRecord {
            byte_offset: self.cursor,
            byte_size,
            region: self.region,
        });
        self.cursor = cursor;
        Ok(index)
    }

    pub(crate) fn get(&self, index: u32) -> Option<&AllocationRecord> {
        self.records.get(index as usize)
    }

    /// Bytes needed to back every allocation so far.
    pub(crate) fn total_size(&self) -> u64 {
        self.cursor
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
