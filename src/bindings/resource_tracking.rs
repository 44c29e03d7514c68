// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource state tracking.
//!
//! The tracker owns the authoritative *current* state of every registered resource, per
//! subresource, along with the *target* state the resource should be in when idle (e.g.
//! `ShaderResource` for a texture, `VertexAndConstantBuffer` for the static uniform region).
//!
//! Callers never record transition barriers directly.  They ask the tracker for a state, and the
//! tracker emits a barrier only when the recorded state differs:
//!
//! ```text
//! set_resource_state(list, id, CopyDest, All)   // barrier: VertexAndConstantBuffer -> CopyDest
//! set_resource_state(list, id, CopyDest, All)   // nothing
//! set_resource_to_target_state(list, id, All)   // barrier: CopyDest -> VertexAndConstantBuffer
//! ```
//!
//! Barriers may only be recorded on [`CommandListKind::Direct`] lists.  Asking for a transition
//! on a copy list is a contract violation.
//!
//! Resources are stored in an arena; a [`ResourceId`] is an index into it.

use crate::bindings::visible_to::{ResourceKind, ResourceState, Subresource};
use crate::error::{Error, violation};
use crate::imp::{CommandList, CommandListKind};

/// Names a resource registered with a [`StateTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single recorded state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub resource: ResourceId,
    pub subresource: Subresource,
    pub before: ResourceState,
    pub after: ResourceState,
}

#[derive(Debug)]
struct TrackedResource {
    label: String,
    kind: ResourceKind,
    current: Vec<ResourceState>,
    target: ResourceState,
}

impl TrackedResource {
    fn uniform_state(&self) -> Option<ResourceState> {
        let first = self.current[0];
        self.current.iter().all(|s| *s == first).then_some(first)
    }
}

#[derive(Debug, Default)]
pub struct StateTracker {
    resources: Vec<Option<TrackedResource>>,
    barriers_emitted: u64,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a resource.
    ///
    /// `initial` is the state the resource was created in; `target` is where
    /// [`set_resource_to_target_state`](Self::set_resource_to_target_state) returns it.
    #[track_caller]
    pub fn register(
        &mut self,
        kind: ResourceKind,
        initial: ResourceState,
        target: ResourceState,
        label: &str,
    ) -> Result<ResourceId, Error> {
        let count = kind.subresource_count();
        if count == 0 {
            return violation!(
                InvalidConfig,
                "StateTracker::register",
                "{label} has no mip levels"
            );
        }
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(Some(TrackedResource {
            label: label.to_string(),
            kind,
            current: vec![initial; count as usize],
            target,
        }));
        Ok(id)
    }

    /// Stops tracking a resource.  The id is not reused.
    #[track_caller]
    pub fn forget(&mut self, id: ResourceId) -> Result<(), Error> {
        match self.resources.get_mut(id.index()) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => violation!(
                UnknownIndex,
                "StateTracker::forget",
                "{id:?} is not tracked"
            ),
        }
    }

    #[track_caller]
    fn resource(&self, id: ResourceId, operation: &'static str) -> Result<&TrackedResource, Error> {
        match self.resources.get(id.index()) {
            Some(Some(r)) => Ok(r),
            _ => violation!(UnknownIndex, operation, "{id:?} is not tracked"),
        }
    }

    #[track_caller]
    fn resource_mut(
        &mut self,
        id: ResourceId,
        operation: &'static str,
    ) -> Result<&mut TrackedResource, Error> {
        match self.resources.get_mut(id.index()) {
            Some(Some(r)) => Ok(r),
            _ => violation!(UnknownIndex, operation, "{id:?} is not tracked"),
        }
    }

    /// The state of `subresource`, or `None` if `Subresource::All` spans mips in different
    /// states.
    #[track_caller]
    pub fn current_state(
        &self,
        id: ResourceId,
        subresource: Subresource,
    ) -> Result<Option<ResourceState>, Error> {
        const OPERATION: &str = "StateTracker::current_state";
        let resource = self.resource(id, OPERATION)?;
        match subresource {
            Subresource::All => Ok(resource.uniform_state()),
            Subresource::Mip(mip) => match resource.current.get(mip as usize) {
                Some(state) => Ok(Some(*state)),
                None => violation!(
                    UnknownIndex,
                    OPERATION,
                    "{label} has no mip {mip}",
                    label = resource.label
                ),
            },
        }
    }

    #[track_caller]
    pub fn target_state(&self, id: ResourceId) -> Result<ResourceState, Error> {
        Ok(self.resource(id, "StateTracker::target_state")?.target)
    }

    #[track_caller]
    pub fn set_target_state(&mut self, id: ResourceId, target: ResourceState) -> Result<(), Error> {
        self.resource_mut(id, "StateTracker::set_target_state")?.target = target;
        Ok(())
    }

    /// Records a transition of `subresource` to `state` on `list` if it is not already there.
    ///
    /// Returns the number of barriers emitted.  For a single mip or a resource whose mips agree
    /// this is 0 or 1.  For `Subresource::All` over mips in different states, one barrier is
    /// emitted per mip that differs.
    #[track_caller]
    pub fn set_resource_state(
        &mut self,
        list: &mut CommandList,
        id: ResourceId,
        state: ResourceState,
        subresource: Subresource,
    ) -> Result<usize, Error> {
        self.transition(list, id, Some(state), subresource, "StateTracker::set_resource_state")
    }

    /// Returns `subresource` to the resource's target state.
    #[track_caller]
    pub fn set_resource_to_target_state(
        &mut self,
        list: &mut CommandList,
        id: ResourceId,
        subresource: Subresource,
    ) -> Result<usize, Error> {
        self.transition(
            list,
            id,
            None,
            subresource,
            "StateTracker::set_resource_to_target_state",
        )
    }

    #[track_caller]
    fn transition(
        &mut self,
        list: &mut CommandList,
        id: ResourceId,
        state: Option<ResourceState>,
        subresource: Subresource,
        operation: &'static str,
    ) -> Result<usize, Error> {
        if list.kind() != CommandListKind::Direct {
            return violation!(
                WrongCommandList,
                operation,
                "resource barriers cannot be recorded on {label}, a {kind:?} list",
                label = list.label(),
                kind = list.kind()
            );
        }
        let resource = self.resource_mut(id, operation)?;
        let after = state.unwrap_or(resource.target);
        let emitted = match subresource {
            Subresource::All => match resource.uniform_state() {
                Some(before) if before == after => 0,
                Some(before) => {
                    list.resource_barrier(Transition {
                        resource: id,
                        subresource: Subresource::All,
                        before,
                        after,
                    });
                    resource.current.fill(after);
                    1
                }
                None => {
                    let mut emitted = 0;
                    for (mip, current) in resource.current.iter_mut().enumerate() {
                        if *current != after {
                            list.resource_barrier(Transition {
                                resource: id,
                                subresource: Subresource::Mip(mip as u32),
                                before: *current,
                                after,
                            });
                            *current = after;
                            emitted += 1;
                        }
                    }
                    emitted
                }
            },
            Subresource::Mip(mip) => {
                let label = &resource.label;
                let Some(current) = resource.current.get_mut(mip as usize) else {
                    return violation!(UnknownIndex, operation, "{label} has no mip {mip}");
                };
                if *current == after {
                    0
                } else {
                    list.resource_barrier(Transition {
                        resource: id,
                        subresource,
                        before: *current,
                        after,
                    });
                    *current = after;
                    1
                }
            }
        };
        if emitted > 0 {
            logwise::trace_sync!(
                "StateTracker emitted {emitted} barriers to {after} for {label}",
                emitted = emitted,
                after = logwise::privacy::LogIt(&after),
                label = resource.label.clone()
            );
        }
        self.barriers_emitted += emitted as u64;
        Ok(emitted)
    }

    /// Resources not in their target state on every subresource.
    pub fn divergent_resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources
            .iter()
            .enumerate()
            .filter_map(|(index, r)| {
                let r = r.as_ref()?;
                r.current
                    .iter()
                    .any(|s| *s != r.target)
                    .then_some(ResourceId(index as u32))
            })
    }

    pub fn label(&self, id: ResourceId) -> Option<&str> {
        self.resources.get(id.index())?.as_ref().map(|r| r.label.as_str())
    }

    pub fn kind(&self, id: ResourceId) -> Option<ResourceKind> {
        self.resources.get(id.index())?.as_ref().map(|r| r.kind)
    }

    /// Total barriers emitted over the tracker's lifetime.
    pub fn barriers_emitted(&self) -> u64 {
        self.barriers_emitted
    }
}

#[cfg(all(test, not(feature = "backend_wgpu")))]
mod tests {
    use super::*;
    use crate::error::ViolationKind;
    use crate::imp::Device;

    #[test]
    fn repeated_state_emits_once() {
        let device = Device::new().unwrap();
        let mut list = device.create_command_list(CommandListKind::Direct, "direct");
        let mut tracker = StateTracker::new();
        let id = tracker
            .register(
                ResourceKind::Buffer,
                ResourceState::Common,
                ResourceState::VertexAndConstantBuffer,
                "buffer",
            )
            .unwrap();
        assert_eq!(
            tracker
                .set_resource_state(&mut list, id, ResourceState::CopyDest, Subresource::All)
                .unwrap(),
            1
        );
        assert_eq!(
            tracker
                .set_resource_state(&mut list, id, ResourceState::CopyDest, Subresource::All)
                .unwrap(),
            0
        );
        assert_eq!(list.transitions().len(), 1);
        assert_eq!(list.transitions()[0].before, ResourceState::Common);
        assert_eq!(list.transitions()[0].after, ResourceState::CopyDest);
        assert_eq!(
            tracker
                .set_resource_to_target_state(&mut list, id, Subresource::All)
                .unwrap(),
            1
        );
        assert_eq!(
            tracker.current_state(id, Subresource::All).unwrap(),
            Some(ResourceState::VertexAndConstantBuffer)
        );
        assert_eq!(tracker.barriers_emitted(), 2);
        assert_eq!(tracker.divergent_resources().count(), 0);
    }

    #[test]
    fn copy_list_rejects_barriers() {
        let device = Device::new().unwrap();
        let mut list = device.create_command_list(CommandListKind::Copy, "copy");
        let mut tracker = StateTracker::new();
        let id = tracker
            .register(
                ResourceKind::Buffer,
                ResourceState::Common,
                ResourceState::Common,
                "buffer",
            )
            .unwrap();
        let err = tracker
            .set_resource_state(&mut list, id, ResourceState::CopyDest, Subresource::All)
            .unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::WrongCommandList));
        assert!(list.transitions().is_empty());
    }

    #[test]
    fn divergent_mips() {
        let device = Device::new().unwrap();
        let mut list = device.create_command_list(CommandListKind::Direct, "direct");
        let mut tracker = StateTracker::new();
        let id = tracker
            .register(
                ResourceKind::Texture { mip_levels: 3 },
                ResourceState::ShaderResource,
                ResourceState::ShaderResource,
                "texture",
            )
            .unwrap();
        tracker
            .set_resource_state(&mut list, id, ResourceState::RenderTarget, Subresource::Mip(1))
            .unwrap();
        assert_eq!(tracker.current_state(id, Subresource::All).unwrap(), None);
        assert_eq!(tracker.divergent_resources().collect::<Vec<_>>(), vec![id]);
        //only mip 1 differs from the target
        assert_eq!(
            tracker
                .set_resource_to_target_state(&mut list, id, Subresource::All)
                .unwrap(),
            1
        );
        assert_eq!(list.transitions()[1].subresource, Subresource::Mip(1));
        let err = tracker
            .set_resource_state(&mut list, id, ResourceState::CopyDest, Subresource::Mip(3))
            .unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::UnknownIndex));
    }

    #[test]
    fn forgotten_resources_are_unknown() {
        let mut tracker = StateTracker::new();
        let id = tracker
            .register(
                ResourceKind::Buffer,
                ResourceState::Common,
                ResourceState::Common,
                "buffer",
            )
            .unwrap();
        tracker.forget(id).unwrap();
        let err = tracker.target_state(id).unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::UnknownIndex));
        assert_eq!(
            tracker.forget(id).unwrap_err().violation_kind(),
            Some(ViolationKind::UnknownIndex)
        );
    }
}
