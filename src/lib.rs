/*! frames_and_fences is the resource-lifetime and frame-synchronization core of a GPU renderer.

A renderer that keeps several frames in flight has to answer the same questions every frame:
where does this frame's constant data live, when may the CPU overwrite it, which barriers does
the next draw need, and when is it safe to free a buffer the CPU no longer uses.  This crate
answers them with a small set of cooperating parts, all owned by a [`FrameLoop`]:

| Part | Type | Job |
|------|------|-----|
| Frame synchronizer | [`sync::FrameSynchronizer`] | one fence per frame slot; wait before reusing a slot |
| Uniform heap | [`bindings::UniformHeap`] | bump-allocated dynamic, static and scratch constant regions |
| Descriptor table | [`bindings::DescriptorTableAllocator`] | linear descriptor handles with fixed slack |
| State tracker | [`bindings::StateTracker`] | current/target state per subresource; no redundant barriers |
| Reclaimer | [`reclaim::Reclaimer`] | keeps retired objects alive until the GPU is done with them |
| Copy scheduler | [`copy_scheduler::CopyScheduler`] | whole-buffer copies recorded at the frame's flush |

# Frames in flight

With `N` frames in flight (2 to 4, default 3) there are `N` frame slots.  Per-frame data is
replicated once per slot, so the CPU writes slot `k` while the GPU may still read the other
slots.  Before slot `k` is reused, the CPU waits on slot `k`'s fence.

# Errors

Every fallible operation returns [`Error`].  A [`ContractViolation`] means the caller broke an
ordering or sizing rule; it carries the source location of the call.  A platform error carries
the backend status code.  Nothing is retried or recovered silently.

# Backends

The default backend is a deterministic software GPU (see [`gpu::SoftConfig`]).  It executes
submitted work lazily, which makes frames in flight observable in tests, and supports injected
failures.  Enable `backend_wgpu` to run on [wgpu](https://wgpu.rs) instead.

# Example

```
use frames_and_fences::{FrameConfig, FrameLoop, Headless, gpu::Device};

let mut frames = FrameLoop::new(Device::new()?, FrameConfig::default())?;
let camera = frames.request_dynamic_space(64)?;
frames.finish()?;

let mut presenter = Headless::new(3);
for _ in 0..6 {
    frames.begin_frame()?;
    frames.update_dynamic(camera, &[0u8; 64])?;
    frames.flush_copies()?;
    frames.end_frame(&mut presenter)?;
}
frames.shutdown()?;
# Ok::<(), frames_and_fences::Error>(())
```
*/

pub mod bindings;
mod bittricks;
pub mod config;
pub mod copy_scheduler;
mod error;
pub mod frame_loop;
mod imp;
mod multibuffer;
pub mod reclaim;
pub mod sync;

pub use config::{FrameConfig, HeapConfig, ReclaimPolicy};
pub use error::{ContractViolation, Error, ViolationKind};
pub use frame_loop::{FrameLoop, FrameStats, Headless, Present};
pub use sync::FrameSlot;

/// Backend types.
pub mod gpu {
    pub use crate::imp::{
        Buffer, CommandList, CommandListKind, DescriptorTable, Device, Error as BackendError,
        Fence, MemoryKind, SubmissionIndex,
    };
    #[cfg(not(feature = "backend_wgpu"))]
    pub use crate::imp::{Execution, SoftConfig};
}
