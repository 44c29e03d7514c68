#![cfg(feature = "backend_wgpu")]
//! Frames on a real wgpu device.  Skipped when the machine has no adapter.

use frames_and_fences::bindings::StaticUpdatePolicy;
use frames_and_fences::gpu::{BackendError, Device};
use frames_and_fences::{Error, FrameConfig, FrameLoop, Headless};

fn device() -> Option<Device> {
    match Device::new() {
        Ok(device) => Some(device),
        Err(BackendError::RequestAdapter(e)) => {
            println!("skipping: no wgpu adapter ({e})");
            None
        }
        Err(e) => panic!("wgpu device request failed: {e}"),
    }
}

#[test]
fn fences_complete_in_order() {
    let Some(device) = device() else { return };
    let fence = device.create_fence("ordering").unwrap();
    assert_eq!(fence.completed_value(), 0);
    device.signal(&fence, 1).unwrap();
    device.signal(&fence, 2).unwrap();
    device.wait(&fence, 2).unwrap();
    assert_eq!(fence.completed_value(), 2);
    //already reached
    device.wait(&fence, 1).unwrap();
    let err = device.wait(&fence, 9).unwrap_err();
    assert!(matches!(err, BackendError::FenceNeverSignaled { value: 9, .. }));
    assert!(!err.is_device_removed());
}

#[test]
fn unaligned_writes_are_padded() {
    let Some(device) = device() else { return };
    let buffer = device
        .create_buffer(6, frames_and_fences::gpu::MemoryKind::Upload, "odd")
        .unwrap();
    device.write_buffer(&buffer, 0, &[1, 2, 3, 4, 5, 6]).unwrap();
    assert_eq!(device.read_buffer(&buffer, 0, 6).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    let err = device.write_buffer(&buffer, 4, &[0; 8]).unwrap_err();
    assert!(matches!(err, BackendError::OutOfBounds { .. }));
}

#[test]
fn static_round_trip_on_device() {
    let Some(device) = device() else { return };
    let mut frames = FrameLoop::new(device.clone(), FrameConfig::default()).unwrap();
    let staged = frames
        .request_static_space(6, StaticUpdatePolicy::Staged)
        .unwrap();
    let frequent = frames
        .request_static_space(8, StaticUpdatePolicy::Frequent)
        .unwrap();
    let dynamic = frames.request_dynamic_space(16).unwrap();
    frames.finish().unwrap();
    let mut presenter = Headless::new(3);

    for frame in 0..4u8 {
        frames.begin_frame().unwrap();
        if frame == 0 {
            frames.update_static(staged, &[9, 8, 7, 6, 5, 4]).unwrap();
        }
        frames
            .update_frequently_updated_static(frequent, &[frame; 8])
            .unwrap();
        frames.update_dynamic(dynamic, &[frame; 16]).unwrap();
        frames.flush_copies().unwrap();
        frames.end_frame(&mut presenter).unwrap();
    }
    frames.shutdown().unwrap();
    assert_eq!(
        frames.synchronizer().completed_generation(),
        frames.synchronizer().pending_generation() - 1
    );

    let heap = frames.heap();
    let static_buffer = heap.static_buffer().unwrap();
    let staged_at = heap.static_allocation(staged).unwrap().byte_offset;
    let frequent_at = heap.static_allocation(frequent).unwrap().byte_offset;
    assert_eq!(
        device.read_buffer(static_buffer, staged_at, 6).unwrap(),
        vec![9, 8, 7, 6, 5, 4]
    );
    assert_eq!(
        device.read_buffer(static_buffer, frequent_at, 8).unwrap(),
        vec![3; 8]
    );
    //frame 3 ran on slot 0
    let upload = heap.upload_buffer().unwrap();
    let dynamic_at = heap.dynamic_allocation(dynamic).unwrap().byte_offset;
    assert_eq!(device.read_buffer(upload, dynamic_at, 16).unwrap(), vec![3; 16]);
    assert_eq!(frames.stats().staged_uploads_in_flight, 0);
}

#[test]
fn backend_errors_surface_as_platform_errors() {
    let Some(device) = device() else { return };
    let buffer = device
        .create_buffer(16, frames_and_fences::gpu::MemoryKind::DeviceLocal, "gpu only")
        .unwrap();
    let err: Error = device.write_buffer(&buffer, 0, &[0; 4]).unwrap_err().into();
    assert_eq!(err.status(), Some(0x80070057));
    assert!(err.violation_kind().is_none());
}
