/*! Defines the GPU-visible allocators and the resource state model */

pub mod allocation;
pub mod descriptor_table;
pub mod resource_tracking;
pub mod scratch;
pub(crate) mod staging;
pub mod uniform_heap;
pub mod visible_to;

pub use allocation::{AllocationRecord, GpuAddress, Region};
pub use descriptor_table::{DescriptorHandle, DescriptorTableAllocator};
pub use resource_tracking::{ResourceId, StateTracker, Transition};
pub use scratch::ScratchIndex;
pub use uniform_heap::{DynamicIndex, StaticIndex, StaticUpdatePolicy, UniformHeap};
pub use visible_to::{ResourceKind, ResourceState, Subresource};
