// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Descriptor table allocation.
//!
//! Descriptor space is requested up front, then the table is created once with a fixed slack on
//! top.  After that handles are handed out linearly.  The table never grows; running out is a
//! contract violation.

use crate::error::{Error, violation};
use crate::imp::{DescriptorTable, Device};

/// A descriptor slot's CPU and GPU handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    pub cpu: u64,
    pub gpu: u64,
    /// Slots from the start of the table.
    pub offset_from_start: u32,
}

#[derive(Debug)]
pub struct DescriptorTableAllocator {
    requested: u32,
    slack: u32,
    table: Option<DescriptorTable>,
    next: u32,
}

impl DescriptorTableAllocator {
    pub fn new(slack: u32) -> Self {
        DescriptorTableAllocator {
            requested: 0,
            slack,
            table: None,
            next: 0,
        }
    }

    /// Reserves `count` more slots.  Only valid before [`finish`](Self::finish).
    #[track_caller]
    pub fn request_more_space(&mut self, count: u32) -> Result<(), Error> {
        const OPERATION: &str = "DescriptorTableAllocator::request_more_space";
        if self.table.is_some() {
            return violation!(AfterFinish, OPERATION, "the descriptor table is already created");
        }
        match self.requested.checked_add(count) {
            Some(requested) => {
                self.requested = requested;
                Ok(())
            }
            None => violation!(Exhausted, OPERATION, "descriptor request overflows"),
        }
    }

    /// Creates the table with room for every requested slot plus the slack.
    #[track_caller]
    pub fn finish(&mut self, device: &Device) -> Result<(), Error> {
        const OPERATION: &str = "DescriptorTableAllocator::finish";
        if self.table.is_some() {
            return violation!(AfterFinish, OPERATION, "the descriptor table is already created");
        }
        let Some(capacity) = self.requested.checked_add(self.slack) else {
            return violation!(Exhausted, OPERATION, "descriptor capacity overflows");
        };
        let table = device.create_descriptor_table(capacity, "descriptor table")?;
        logwise::info_sync!(
            "DescriptorTableAllocator created {capacity} slots ({requested} requested)",
            capacity = capacity,
            requested = self.requested
        );
        self.table = Some(table);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.table.is_some()
    }

    #[track_caller]
    fn table(&self, operation: &'static str) -> Result<&DescriptorTable, Error> {
        match &self.table {
            Some(table) => Ok(table),
            None => violation!(BeforeFinish, operation, "the descriptor table is not created yet"),
        }
    }

    fn handle_at(table: &DescriptorTable, offset: u32) -> DescriptorHandle {
        let bytes = offset as u64 * table.increment() as u64;
        DescriptorHandle {
            cpu: table.cpu_start() + bytes,
            gpu: table.gpu_start() + bytes,
            offset_from_start: offset,
        }
    }

    /// Hands out the next free slot.
    #[track_caller]
    pub fn next_handle(&mut self) -> Result<DescriptorHandle, Error> {
        const OPERATION: &str = "DescriptorTableAllocator::next_handle";
        let table = self.table(OPERATION)?;
        if self.next >= table.capacity() {
            return violation!(
                Exhausted,
                OPERATION,
                "all {capacity} descriptor slots are in use",
                capacity = table.capacity()
            );
        }
        let handle = Self::handle_at(table, self.next);
        self.next += 1;
        Ok(handle)
    }

    /// The handle of a slot already handed out.
    #[track_caller]
    pub fn handle(&self, offset_from_start: u32) -> Result<DescriptorHandle, Error> {
        const OPERATION: &str = "DescriptorTableAllocator::handle";
        let table = self.table(OPERATION)?;
        if offset_from_start >= self.next {
            return violation!(
                UnknownIndex,
                OPERATION,
                "slot {offset_from_start} has not been handed out"
            );
        }
        Ok(Self::handle_at(table, offset_from_start))
    }

    pub fn capacity(&self) -> Option<u32> {
        self.table.as_ref().map(|t| t.capacity())
    }

    pub fn used(&self) -> u32 {
        self.next
    }

    pub fn requested(&self) -> u32 {
        self.requested
    }
}
