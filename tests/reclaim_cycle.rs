#![cfg(not(feature = "backend_wgpu"))]
//! Deferred reclamation across frame slots.

use frames_and_fences::bindings::StaticUpdatePolicy;
use frames_and_fences::gpu::{Device, Execution, SoftConfig};
use frames_and_fences::{FrameConfig, FrameLoop, Headless, ReclaimPolicy};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Retires an object during frame 0 and returns the frame at whose end it was dropped.
fn frame_of_reclaim(device: Device, policy: ReclaimPolicy) -> Option<usize> {
    let mut frames = FrameLoop::new(
        device,
        FrameConfig::default()
            .with_frame_count(3)
            .with_reclaim_policy(policy),
    )
    .unwrap();
    frames.finish().unwrap();
    let mut presenter = Headless::new(3);
    let drops = Arc::new(AtomicUsize::new(0));
    let mut reclaimed_at = None;
    for frame in 0..8 {
        let slot = frames.begin_frame().unwrap();
        if frame == 0 {
            assert_eq!(slot.index(), 0);
            frames.retire(Tracked(drops.clone()), "tracked");
        }
        frames.flush_copies().unwrap();
        frames.end_frame(&mut presenter).unwrap();
        if reclaimed_at.is_none() && drops.load(Ordering::SeqCst) == 1 {
            reclaimed_at = Some(frame);
        }
    }
    frames.shutdown().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    reclaimed_at
}

#[test]
fn slot_cycle_reclaims_on_second_visit() {
    let reclaimed = frame_of_reclaim(Device::new().unwrap(), ReclaimPolicy::SlotCycle);
    //frame 0 is the first visit to slot 0, frame 3 the second
    assert_eq!(reclaimed, Some(3));
}

#[test]
fn fence_generation_matches_slot_cycle_when_gpu_lags() {
    let reclaimed = frame_of_reclaim(Device::new().unwrap(), ReclaimPolicy::FenceGeneration);
    assert_eq!(reclaimed, Some(3));
}

#[test]
fn fence_generation_reclaims_as_soon_as_gpu_is_done() {
    let device = Device::with_config(SoftConfig::default().with_execution(Execution::Immediate));
    let reclaimed = frame_of_reclaim(device, ReclaimPolicy::FenceGeneration);
    assert_eq!(reclaimed, Some(0));
}

#[test]
fn slot_cycle_ignores_gpu_progress() {
    let device = Device::with_config(SoftConfig::default().with_execution(Execution::Immediate));
    let reclaimed = frame_of_reclaim(device, ReclaimPolicy::SlotCycle);
    assert_eq!(reclaimed, Some(3));
}

#[test]
fn shutdown_releases_everything() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut frames = FrameLoop::new(Device::new().unwrap(), FrameConfig::default()).unwrap();
    frames.finish().unwrap();
    let mut presenter = Headless::new(3);
    frames.begin_frame().unwrap();
    frames.retire(Tracked(drops.clone()), "a");
    frames.retire(Tracked(drops.clone()), "b");
    frames.end_frame(&mut presenter).unwrap();
    assert_eq!(frames.stats().pending_reclaims, 2);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    frames.shutdown().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert_eq!(frames.stats().reclaimed, 2);
}

#[test]
fn staging_buffers_live_one_full_cycle() {
    let mut frames = FrameLoop::new(
        Device::new().unwrap(),
        FrameConfig::default().with_frame_count(3),
    )
    .unwrap();
    let index = frames
        .request_static_space(64, StaticUpdatePolicy::Staged)
        .unwrap();
    frames.finish().unwrap();
    let mut presenter = Headless::new(3);

    let mut in_flight = Vec::new();
    for frame in 0..5 {
        frames.begin_frame().unwrap();
        if frame == 0 {
            frames.update_static(index, &[1; 64]).unwrap();
        }
        frames.flush_copies().unwrap();
        frames.end_frame(&mut presenter).unwrap();
        in_flight.push(frames.stats().staged_uploads_in_flight);
    }
    //copied in frame 0, seen again and released in frame 3
    assert_eq!(in_flight, vec![1, 1, 1, 0, 0]);
    frames.shutdown().unwrap();
}
