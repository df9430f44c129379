//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, opaque backend handles and
//! descriptor structs used throughout the graphics system.

mod barrier;
mod buffer;
mod common;
mod handles;
mod sampler;
mod texture;

pub use barrier::{BarrierResource, PipelineStageFlags, ResourceBarrier, ResourceState};
pub use buffer::{BufferDescriptor, BufferUsage, MemoryUsage};
pub use common::{Extent2d, PrimitiveTopology, QueueType};
pub use handles::{
    BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, DeviceMemoryHandle, FenceHandle,
    FramebufferHandle, ImageHandle, PipelineHandle, RenderpassHandle, SamplerHandle,
    SemaphoreHandle,
};
pub use sampler::{AddressMode, FilterMode, SamplerDescriptor};
pub use texture::{ImageDescriptor, TextureFormat, TextureUsage};
