// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Deferred reclamation of GPU-backed objects.
//!
//! An object dropped on the CPU may still be referenced by frames the GPU has not executed yet.
//! [`Reclaimer::retire`] takes ownership of such an object and keeps it alive until it is safe,
//! then drops it during [`Reclaimer::sweep`].
//!
//! Two policies decide when that is ([`ReclaimPolicy`]):
//!
//! * `FenceGeneration` stamps each object with the fence value the retiring frame will signal
//!   and drops it once the GPU has completed that value.
//! * `SlotCycle` stamps each object with the retiring frame slot.  The first sweep on that slot
//!   flags it; the second drops it.  This is correct only while every frame calls `sweep` and the
//!   slots rotate without skipping.

use crate::config::ReclaimPolicy;
use crate::sync::FrameSlot;
use std::any::Any;

struct Retired {
    owner: Box<dyn Any + Send>,
    label: String,
    retired_at_slot: FrameSlot,
    retired_at_generation: u64,
    second_visit: bool,
}

impl std::fmt::Debug for Retired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retired")
            .field("label", &self.label)
            .field("retired_at_slot", &self.retired_at_slot)
            .field("retired_at_generation", &self.retired_at_generation)
            .field("second_visit", &self.second_visit)
            .finish()
    }
}

#[derive(Debug)]
pub struct Reclaimer {
    policy: ReclaimPolicy,
    records: Vec<Retired>,
    reclaimed: u64,
}

impl Reclaimer {
    pub fn new(policy: ReclaimPolicy) -> Self {
        Reclaimer {
            policy,
            records: Vec::new(),
            reclaimed: 0,
        }
    }

    pub fn policy(&self) -> ReclaimPolicy {
        self.policy
    }

    /// Takes ownership of `owner` until it is safe to drop.
    ///
    /// `generation` is the fence value that the frame recording on `slot` will signal.
    pub fn retire<T: Send + 'static>(
        &mut self,
        owner: T,
        label: &str,
        slot: FrameSlot,
        generation: u64,
    ) {
        logwise::trace_sync!(
            "Reclaimer retired {label} on {slot} at generation {generation}",
            label = label.to_string(),
            slot = slot.index(),
            generation = generation
        );
        self.records.push(Retired {
            owner: Box::new(owner),
            label: label.to_string(),
            retired_at_slot: slot,
            retired_at_generation: generation,
            second_visit: false,
        });
    }

    /// Drops every record that is safe to drop on `slot`.  Returns how many were dropped.
    ///
    /// Called once per frame, after the frame's fence is signaled.
    pub fn sweep(&mut self, slot: FrameSlot, completed_generation: u64) -> usize {
        let policy = self.policy;
        let mut kept = Vec::with_capacity(self.records.len());
        let mut destroyed = Vec::new();
        for mut record in self.records.drain(..) {
            let free = match policy {
                ReclaimPolicy::FenceGeneration => {
                    completed_generation >= record.retired_at_generation
                }
                ReclaimPolicy::SlotCycle => {
                    if record.retired_at_slot != slot {
                        false
                    } else if record.second_visit {
                        true
                    } else {
                        record.second_visit = true;
                        false
                    }
                }
            };
            if free {
                destroyed.push(record);
            } else {
                kept.push(record);
            }
        }
        self.records = kept;
        let count = destroyed.len();
        for record in destroyed {
            let label = record.label;
            logwise::trace_sync!("Reclaimer destroying {label}", label = label.clone());
            drop(record.owner);
        }
        self.reclaimed += count as u64;
        count
    }

    /// Drops every record.  Only valid once the GPU is idle.
    pub fn drain(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        self.reclaimed += count as u64;
        count
    }

    /// Records awaiting a sweep.
    pub fn pending(&self) -> usize {
        self.records.len()
    }

    /// Total records dropped over the reclaimer's lifetime.
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed
    }
}
