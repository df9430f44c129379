//! Resource states and barriers.

use bitflags::bitflags;

use super::{BufferHandle, ImageHandle};

/// Logical state of a GPU resource between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Contents are undefined, e.g. right after creation.
    #[default]
    Undefined,
    /// Color attachment write.
    RenderTarget,
    /// Depth/stencil attachment write.
    DepthWrite,
    /// Read from a shader.
    ShaderRead,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    CopyDestination,
    /// Bound as vertex or index data.
    VertexOrIndexBuffer,
    /// Ready for presentation.
    Present,
}

bitflags! {
    /// Pipeline stages a barrier synchronizes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStageFlags: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_INPUT = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const EARLY_FRAGMENT_TESTS = 1 << 4;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 5;
        const TRANSFER = 1 << 6;
        const BOTTOM_OF_PIPE = 1 << 7;
    }
}

/// The resource a barrier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierResource {
    Image(ImageHandle),
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
}

/// A state transition for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBarrier {
    pub resource: BarrierResource,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
}

impl ResourceBarrier {
    /// Transition an image between two states.
    pub fn image(image: ImageHandle, old_state: ResourceState, new_state: ResourceState) -> Self {
        Self {
            resource: BarrierResource::Image(image),
            old_state,
            new_state,
        }
    }

    /// Transition a whole buffer between two states.
    pub fn buffer(
        buffer: BufferHandle,
        size: u64,
        old_state: ResourceState,
        new_state: ResourceState,
    ) -> Self {
        Self {
            resource: BarrierResource::Buffer {
                buffer,
                offset: 0,
                size,
            },
            old_state,
            new_state,
        }
    }
}
