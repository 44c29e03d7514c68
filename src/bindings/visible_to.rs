//! Resource states and subresource addressing.
//!
//! A GPU resource is always in exactly one *state* per subresource, which describes how the next
//! GPU work will access it.  Moving between states requires a transition barrier on a direct
//! command list; [`StateTracker`](crate::bindings::StateTracker) records the current state so
//! redundant barriers are never emitted.
//!
//! # Examples
//!
//! ```no_run
//! use frames_and_fences::bindings::visible_to::{ResourceKind, ResourceState, Subresource};
//!
//! // A mipmapped texture that will be sampled by shaders
//! let kind = ResourceKind::Texture { mip_levels: 4 };
//! let target = ResourceState::ShaderResource;
//!
//! // Transition only the top mip
//! let sub = Subresource::Mip(0);
//! ```

/// How the next GPU work accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// No particular access.  Also the state required for CPU-visible memory.
    Common,
    /// Bound as vertex data or constant buffer data.
    ///
    /// This is the target state of the static uniform region.
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    /// Read and written by shaders without ordering guarantees.
    UnorderedAccess,
    DepthWrite,
    DepthRead,
    /// Read by shaders through a view.
    ShaderResource,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    ///
    /// Copies into the static region require this state.
    CopyDest,
    /// Handed to the presentation engine.
    Present,
}

/// Which part of a resource a transition applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subresource {
    /// Every mip level.
    All,
    /// A single mip level.  Buffers only have mip 0.
    Mip(u32),
}

/// The shape of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    /// A texture with one tracked state per mip level.
    Texture { mip_levels: u32 },
}

impl ResourceKind {
    /// Number of independently tracked subresources.
    pub fn subresource_count(self) -> u32 {
        match self {
            ResourceKind::Buffer => 1,
            ResourceKind::Texture { mip_levels } => mip_levels,
        }
    }
}
