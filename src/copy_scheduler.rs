// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Queued whole-buffer copies.
//!
//! Copies are queued at any time and recorded together on the frame's command list when the
//! frame flushes.  The source must stay unchanged until the flush; both buffers are kept alive
//! by the recorded list until it executes.

use crate::error::{Error, violation};
use crate::imp::{Buffer, CommandList};

#[derive(Debug)]
struct PendingCopy {
    source: Buffer,
    destination: Buffer,
}

#[derive(Debug, Default)]
pub struct CopyScheduler {
    pending: Vec<PendingCopy>,
}

impl CopyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a copy of all of `source` into the start of `destination`.
    #[track_caller]
    pub fn queue_copy(&mut self, destination: &Buffer, source: &Buffer) -> Result<(), Error> {
        const OPERATION: &str = "CopyScheduler::queue_copy";
        if destination == source {
            return violation!(
                SelfCopy,
                OPERATION,
                "{label} cannot be copied onto itself",
                label = source.label()
            );
        }
        if source.size() > destination.size() {
            return violation!(
                UpdateTooLarge,
                OPERATION,
                "{source} ({source_size} bytes) does not fit in {destination} ({destination_size} bytes)",
                source = source.label(),
                source_size = source.size(),
                destination = destination.label(),
                destination_size = destination.size()
            );
        }
        self.pending.push(PendingCopy {
            source: source.clone(),
            destination: destination.clone(),
        });
        Ok(())
    }

    /// Records every queued copy on `list` in queue order.  Returns how many.
    pub fn flush(&mut self, list: &mut CommandList) -> Result<usize, Error> {
        let count = self.pending.len();
        for copy in self.pending.drain(..) {
            list.copy_buffer(&copy.source, 0, &copy.destination, 0, copy.source.size())?;
        }
        if count > 0 {
            logwise::trace_sync!(
                "CopyScheduler recorded {count} copies on {list}",
                count = count,
                list = list.label().to_string()
            );
        }
        Ok(count)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
