// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pending static-region uploads.
//!
//! Two paths write the static region:
//!
//! * **Staged**: each update gets its own upload buffer.  The copy is recorded at the next flush
//!   and the record is stamped with that flush's frame slot.  The next flush on the same slot
//!   (which follows a wait on that slot's fence) finds the record a second time and drops it,
//!   releasing the staging buffer.
//! * **Frequent**: the bytes are held on the CPU, one pending update per allocation, the latest
//!   winning.  At flush they are written to a per-slot mirror in upload memory and copied into
//!   the static region.

use crate::bindings::uniform_heap::StaticIndex;
use crate::imp::Buffer;
use crate::sync::FrameSlot;

#[derive(Debug)]
pub(crate) struct UploadRecord {
    pub(crate) staging: Buffer,
    pub(crate) destination_offset: u64,
    pub(crate) len: u64,
    pub(crate) queued_at: FrameSlot,
    pub(crate) committed: bool,
}

#[derive(Debug)]
pub(crate) struct FrequentRecord {
    pub(crate) index: StaticIndex,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct PendingUploads {
    staged: Vec<UploadRecord>,
    frequent: Vec<FrequentRecord>,
}

impl PendingUploads {
    pub(crate) fn push_staged(&mut self, staging: Buffer, destination_offset: u64, queued_at: FrameSlot) {
        let len = staging.size();
        self.staged.push(UploadRecord {
            staging,
            destination_offset,
            len,
            queued_at,
            committed: false,
        });
    }

    /// Replaces any pending frequent update for the same allocation.
    pub(crate) fn push_frequent(&mut self, index: StaticIndex, bytes: &[u8]) {
        match self.frequent.iter_mut().find(|r| r.index == index) {
            Some(record) => {
                record.bytes.clear();
                record.bytes.extend_from_slice(bytes);
            }
            None => self.frequent.push(FrequentRecord {
                index,
                bytes: bytes.to_vec(),
            }),
        }
    }

    /// Drops staged records committed on `slot` by an earlier flush.  Returns how many.
    pub(crate) fn release_committed(&mut self, slot: FrameSlot) -> usize {
        let before = self.staged.len();
        self.staged
            .retain(|r| !(r.committed && r.queued_at == slot));
        before - self.staged.len()
    }

    /// Uncommitted staged records, to be copied on `slot`.
    pub(crate) fn uncommitted(&mut self) -> impl Iterator<Item = &mut UploadRecord> {
        self.staged.iter_mut().filter(|r| !r.committed)
    }

    pub(crate) fn take_frequent(&mut self) -> Vec<FrequentRecord> {
        std::mem::take(&mut self.frequent)
    }

    /// Whether the next flush will record any copy.
    pub(crate) fn has_copies(&self) -> bool {
        !self.frequent.is_empty() || self.staged.iter().any(|r| !r.committed)
    }

    pub(crate) fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub(crate) fn frequent_len(&self) -> usize {
        self.frequent.len()
    }

    pub(crate) fn clear(&mut self) {
        self.staged.clear();
        self.frequent.clear();
    }
}
