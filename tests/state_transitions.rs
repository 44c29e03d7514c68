#![cfg(not(feature = "backend_wgpu"))]
//! Barrier emission through the frame loop and the tracker.

use frames_and_fences::bindings::{
    ResourceKind, ResourceState, StateTracker, StaticUpdatePolicy, Subresource,
};
use frames_and_fences::gpu::{CommandListKind, Device};
use frames_and_fences::{FrameConfig, FrameLoop, Headless, ViolationKind};

#[test]
fn repeating_a_state_emits_one_barrier() {
    let mut frames = FrameLoop::new(Device::new().unwrap(), FrameConfig::default()).unwrap();
    frames.finish().unwrap();
    let target = frames
        .register_resource(
            ResourceKind::Texture { mip_levels: 1 },
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
            "shadow map",
        )
        .unwrap();
    let mut presenter = Headless::new(3);

    frames.begin_frame().unwrap();
    let mut emitted = 0;
    for _ in 0..4 {
        emitted += frames
            .set_resource_state(target, ResourceState::ShaderResource, Subresource::All)
            .unwrap();
    }
    assert_eq!(emitted, 1);
    let transitions = frames.command_list().unwrap().transitions().to_vec();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before, ResourceState::RenderTarget);
    assert_eq!(transitions[0].after, ResourceState::ShaderResource);
    assert_eq!(transitions[0].resource, target);
    frames.end_frame(&mut presenter).unwrap();
    assert_eq!(frames.stats().barriers_emitted, 1);
    frames.shutdown().unwrap();
}

#[test]
fn static_flush_brackets_copies_with_barriers() {
    let mut frames = FrameLoop::new(Device::new().unwrap(), FrameConfig::default()).unwrap();
    let index = frames
        .request_static_space(32, StaticUpdatePolicy::Staged)
        .unwrap();
    frames.finish().unwrap();
    let resource = frames.heap().static_resource().unwrap();
    let mut presenter = Headless::new(3);

    for value in 1..3 {
        frames.begin_frame().unwrap();
        frames.update_static(index, &[value; 32]).unwrap();
        frames.flush_copies().unwrap();
        let transitions = frames.command_list().unwrap().transitions().to_vec();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].after, ResourceState::CopyDest);
        assert_eq!(transitions[1].after, ResourceState::VertexAndConstantBuffer);
        frames.end_frame(&mut presenter).unwrap();
    }

    //no pending uploads, no barriers
    frames.begin_frame().unwrap();
    frames.flush_copies().unwrap();
    assert!(frames.command_list().unwrap().transitions().is_empty());
    frames.end_frame(&mut presenter).unwrap();

    assert_eq!(
        frames
            .tracker()
            .current_state(resource, Subresource::All)
            .unwrap(),
        Some(ResourceState::VertexAndConstantBuffer)
    );
    assert_eq!(frames.stats().barriers_emitted, 4);
    frames.shutdown().unwrap();
}

#[test]
fn static_region_is_readable_before_any_upload() {
    let mut frames = FrameLoop::new(Device::new().unwrap(), FrameConfig::default()).unwrap();
    frames
        .request_static_space(64, StaticUpdatePolicy::Staged)
        .unwrap();
    frames.finish().unwrap();
    let resource = frames.heap().static_resource().unwrap();
    let mut presenter = Headless::new(3);
    for _ in 0..3 {
        frames.begin_frame().unwrap();
        frames.flush_copies().unwrap();
        assert_eq!(frames.tracker().divergent_resources().count(), 0);
        frames.end_frame(&mut presenter).unwrap();
    }
    assert_eq!(
        frames
            .tracker()
            .current_state(resource, Subresource::All)
            .unwrap(),
        Some(ResourceState::VertexAndConstantBuffer)
    );
    assert_eq!(frames.stats().barriers_emitted, 0);
    frames.shutdown().unwrap();
}

#[test]
fn barriers_on_copy_lists_are_rejected() {
    let device = Device::new().unwrap();
    let mut tracker = StateTracker::new();
    let id = tracker
        .register(
            ResourceKind::Buffer,
            ResourceState::Common,
            ResourceState::Common,
            "vertices",
        )
        .unwrap();
    let mut list = device.create_command_list(CommandListKind::Copy, "upload queue");
    let err = tracker
        .set_resource_state(&mut list, id, ResourceState::CopyDest, Subresource::All)
        .unwrap_err();
    assert_eq!(err.violation_kind(), Some(ViolationKind::WrongCommandList));
    assert_eq!(
        tracker.current_state(id, Subresource::All).unwrap(),
        Some(ResourceState::Common)
    );
    assert_eq!(tracker.barriers_emitted(), 0);
}

#[test]
fn per_mip_transitions_converge_to_target() {
    let mut frames = FrameLoop::new(Device::new().unwrap(), FrameConfig::default()).unwrap();
    frames.finish().unwrap();
    let texture = frames
        .register_resource(
            ResourceKind::Texture { mip_levels: 4 },
            ResourceState::ShaderResource,
            ResourceState::ShaderResource,
            "mip chain",
        )
        .unwrap();
    let mut presenter = Headless::new(3);

    frames.begin_frame().unwrap();
    //generate mips: each level is written then read
    for mip in 1..4 {
        assert_eq!(
            frames
                .set_resource_state(texture, ResourceState::RenderTarget, Subresource::Mip(mip))
                .unwrap(),
            1
        );
    }
    assert_eq!(frames.tracker().divergent_resources().count(), 1);
    assert_eq!(
        frames
            .set_resource_to_target_state(texture, Subresource::All)
            .unwrap(),
        3
    );
    assert_eq!(frames.tracker().divergent_resources().count(), 0);
    assert_eq!(
        frames
            .set_resource_state(texture, ResourceState::CopySource, Subresource::All)
            .unwrap(),
        1
    );
    assert_eq!(
        frames
            .set_resource_state(texture, ResourceState::CopySource, Subresource::Mip(9))
            .unwrap_err()
            .violation_kind(),
        Some(ViolationKind::UnknownIndex)
    );
    frames
        .set_resource_to_target_state(texture, Subresource::All)
        .unwrap();
    frames.end_frame(&mut presenter).unwrap();
    frames.shutdown().unwrap();
}

#[test]
fn state_changes_need_an_open_frame() {
    let mut frames = FrameLoop::new(Device::new().unwrap(), FrameConfig::default()).unwrap();
    let id = frames
        .register_resource(
            ResourceKind::Buffer,
            ResourceState::Common,
            ResourceState::Common,
            "idle",
        )
        .unwrap();
    assert_eq!(
        frames
            .set_resource_state(id, ResourceState::CopyDest, Subresource::All)
            .unwrap_err()
            .violation_kind(),
        Some(ViolationKind::FrameOrder)
    );
    frames.forget_resource(id).unwrap();
    assert_eq!(
        frames.forget_resource(id).unwrap_err().violation_kind(),
        Some(ViolationKind::UnknownIndex)
    );
}
