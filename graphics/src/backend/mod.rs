//! GPU backend abstraction layer.
//!
//! This module defines the contract every GPU backend implements. The rest of
//! the crate only talks to the GPU through [`RenderDevice`] and
//! [`CommandList`], so backends are interchangeable.
//!
//! # Available Backends
//!
//! - [`DummyDevice`]: records every call without touching a GPU. Used by the
//!   tests and benches, and as a headless fallback.
//!
//! # Architecture
//!
//! A [`RenderDevice`] provides:
//! - Object creation and destruction (memory, buffers, images, samplers,
//!   renderpasses, framebuffers, pipelines, descriptor pools and sets)
//! - Synchronization primitives (fences, semaphores)
//! - Command list creation and queue submission
//! - The swapchain: image acquisition, per-image framebuffers, presentation
//!
//! Renderpasses and pipelines are immutable once created. There is no API to
//! patch them; a renderpack reload destroys and recreates them wholesale.
//!
//! Failures that are expected at runtime (out of memory, unsupported feature,
//! device lost) are returned as [`GraphicsError`] values, never panics.

pub mod dummy;

pub use dummy::{DeviceCall, DummyCommandList, DummyDevice, RecordedCommand, Submission};

use crate::error::GraphicsError;
use crate::memory::MemoryPlacement;
use crate::renderpack::{PipelineCreateInfo, RenderPassCreateInfo};
use crate::shader::PipelineResourceInterface;
use crate::types::{
    BufferDescriptor, BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, DeviceMemoryHandle,
    Extent2d, FenceHandle, FramebufferHandle, ImageDescriptor, ImageHandle, MemoryUsage,
    PipelineHandle, PipelineStageFlags, QueueType, RenderpassHandle, ResourceBarrier,
    SamplerDescriptor, SamplerHandle, SemaphoreHandle,
};

/// GPU vendor family, used for vendor-specific workarounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceArchitecture {
    Amd,
    Nvidia,
    Intel,
    #[default]
    Unknown,
}

/// Capabilities reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub architecture: DeviceArchitecture,
    /// Largest supported image dimension in pixels.
    pub max_texture_size: u32,
    /// Whether device memory is also host memory (integrated GPUs).
    pub is_uma: bool,
    pub supports_raytracing: bool,
    pub supports_mesh_shaders: bool,
    /// Offset alignment required for uniform buffer bindings.
    pub min_uniform_buffer_alignment: u64,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            architecture: DeviceArchitecture::Unknown,
            max_texture_size: 16384,
            is_uma: false,
            supports_raytracing: false,
            supports_mesh_shaders: false,
            min_uniform_buffer_alignment: 256,
        }
    }
}

/// Command list nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandListLevel {
    #[default]
    Primary,
    Secondary,
}

/// How many descriptors of each kind a pool can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DescriptorPoolSizes {
    pub max_sets: u32,
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub sampled_images: u32,
    pub samplers: u32,
}

impl DescriptorPoolSizes {
    /// Total descriptors of all kinds.
    pub fn total_descriptors(&self) -> u32 {
        self.uniform_buffers + self.storage_buffers + self.sampled_images + self.samplers
    }
}

impl std::ops::AddAssign for DescriptorPoolSizes {
    fn add_assign(&mut self, rhs: Self) {
        self.max_sets += rhs.max_sets;
        self.uniform_buffers += rhs.uniform_buffers;
        self.storage_buffers += rhs.storage_buffers;
        self.sampled_images += rhs.sampled_images;
        self.samplers += rhs.samplers;
    }
}

/// A concrete resource written into a descriptor binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    UniformBuffer(BufferHandle),
    StorageBuffer(BufferHandle),
    /// A sampled image, optionally combined with a sampler.
    SampledImage {
        image: ImageHandle,
        sampler: Option<SamplerHandle>,
    },
    Sampler(SamplerHandle),
}

/// One descriptor update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetWrite {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub resource: DescriptorResource,
}

/// Records GPU commands for later submission.
///
/// A command list belongs to one thread and one frame. It is consumed by
/// [`RenderDevice::submit_command_list`] and must not outlive the frame it was
/// created for.
pub trait CommandList {
    /// Record state transitions between pipeline stages.
    fn resource_barriers(
        &mut self,
        stages_before: PipelineStageFlags,
        stages_after: PipelineStageFlags,
        barriers: &[ResourceBarrier],
    );

    /// Copy `size` bytes between two buffers.
    fn copy_buffer(
        &mut self,
        destination: BufferHandle,
        destination_offset: u64,
        source: BufferHandle,
        source_offset: u64,
        size: u64,
    );

    fn begin_renderpass(&mut self, renderpass: RenderpassHandle, framebuffer: FramebufferHandle);

    fn end_renderpass(&mut self);

    fn bind_pipeline(&mut self, pipeline: PipelineHandle);

    /// Bind descriptor sets, set `i` of `sets` at set index `i` of `interface`.
    fn bind_descriptor_sets(
        &mut self,
        sets: &[DescriptorSetHandle],
        interface: &PipelineResourceInterface,
    );

    fn bind_vertex_buffers(&mut self, buffers: &[BufferHandle]);

    fn bind_index_buffer(&mut self, buffer: BufferHandle);

    /// Draw `num_instances` instances of the bound mesh.
    ///
    /// Instance `i` reads its model matrix from slot `first_instance + i` of
    /// the model matrix buffer, through the shader's instance index.
    fn draw_indexed_mesh(&mut self, num_indices: u32, num_instances: u32, first_instance: u32);

    /// Draw without vertex or index buffers, e.g. a fullscreen triangle.
    fn draw(&mut self, num_vertices: u32, num_instances: u32);
}

/// Backend-agnostic GPU device.
///
/// Implemented once per graphics API. All `create_*` calls return opaque
/// handles; every handle must be released with the matching `destroy_*` call.
pub trait RenderDevice {
    /// Command list type recorded by this backend.
    type CommandList: CommandList + 'static;

    /// Capabilities of the device.
    fn info(&self) -> &DeviceInfo;

    // ------------------------------------------------------------------
    // Renderpasses, framebuffers and pipelines
    // ------------------------------------------------------------------

    /// Create the backend renderpass object for a pass description.
    fn create_renderpass(
        &mut self,
        data: &RenderPassCreateInfo,
        framebuffer_size: Extent2d,
    ) -> Result<RenderpassHandle, GraphicsError>;

    fn create_framebuffer(
        &mut self,
        renderpass: RenderpassHandle,
        color_attachments: &[ImageHandle],
        depth_attachment: Option<ImageHandle>,
        size: Extent2d,
    ) -> Result<FramebufferHandle, GraphicsError>;

    /// Create a pipeline that draws geometry through material bindings.
    fn create_surface_pipeline(
        &mut self,
        data: &PipelineCreateInfo,
        renderpass: RenderpassHandle,
        interface: &PipelineResourceInterface,
    ) -> Result<PipelineHandle, GraphicsError>;

    /// Create a pipeline that runs without per-object geometry, e.g. a fullscreen pass.
    fn create_global_pipeline(
        &mut self,
        data: &PipelineCreateInfo,
        renderpass: RenderpassHandle,
        interface: &PipelineResourceInterface,
    ) -> Result<PipelineHandle, GraphicsError>;

    fn destroy_renderpass(&mut self, renderpass: RenderpassHandle);

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);

    // ------------------------------------------------------------------
    // Memory and resources
    // ------------------------------------------------------------------

    /// Allocate one block of device memory to be sub-allocated.
    fn allocate_device_memory(
        &mut self,
        size: u64,
        usage: MemoryUsage,
    ) -> Result<DeviceMemoryHandle, GraphicsError>;

    fn free_device_memory(&mut self, memory: DeviceMemoryHandle);

    /// Create a buffer bound to an existing memory placement.
    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        placement: MemoryPlacement,
    ) -> Result<BufferHandle, GraphicsError>;

    /// Overwrite the whole buffer starting at byte zero.
    ///
    /// `data` may be shorter than the buffer; the remaining bytes keep their
    /// previous contents. There is no partial write at an offset.
    fn write_data_to_buffer(
        &mut self,
        data: &[u8],
        buffer: BufferHandle,
    ) -> Result<(), GraphicsError>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_image(&mut self, descriptor: &ImageDescriptor) -> Result<ImageHandle, GraphicsError>;

    fn destroy_texture(&mut self, image: ImageHandle);

    fn create_sampler(
        &mut self,
        descriptor: &SamplerDescriptor,
    ) -> Result<SamplerHandle, GraphicsError>;

    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    fn create_descriptor_pool(
        &mut self,
        sizes: &DescriptorPoolSizes,
    ) -> Result<DescriptorPoolHandle, GraphicsError>;

    /// Allocate one descriptor set per set index of `interface`.
    ///
    /// Fails with [`GraphicsError::DescriptorPoolExhausted`] when the pool has
    /// no room left.
    fn create_descriptor_sets(
        &mut self,
        interface: &PipelineResourceInterface,
        pool: DescriptorPoolHandle,
    ) -> Result<Vec<DescriptorSetHandle>, GraphicsError>;

    fn update_descriptor_sets(&mut self, writes: &[DescriptorSetWrite]);

    /// Destroy a pool and every set allocated from it.
    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle);

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle, GraphicsError>;

    fn create_semaphores(&mut self, count: u32) -> Result<Vec<SemaphoreHandle>, GraphicsError> {
        (0..count).map(|_| self.create_semaphore()).collect()
    }

    fn destroy_semaphores(&mut self, semaphores: &[SemaphoreHandle]);

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle, GraphicsError>;

    fn create_fences(
        &mut self,
        count: u32,
        signaled: bool,
    ) -> Result<Vec<FenceHandle>, GraphicsError> {
        (0..count).map(|_| self.create_fence(signaled)).collect()
    }

    /// Block until every fence is signaled. There is no timeout.
    fn wait_for_fences(&mut self, fences: &[FenceHandle]) -> Result<(), GraphicsError>;

    fn reset_fences(&mut self, fences: &[FenceHandle]) -> Result<(), GraphicsError>;

    fn destroy_fences(&mut self, fences: &[FenceHandle]);

    // ------------------------------------------------------------------
    // Command submission
    // ------------------------------------------------------------------

    /// Create a command list for one recording thread and queue.
    ///
    /// Command pools are per thread and per swapchain image slot; they are
    /// reset when the slot is reused.
    fn create_command_list(
        &mut self,
        thread_index: u32,
        queue: QueueType,
        level: CommandListLevel,
    ) -> Result<Self::CommandList, GraphicsError>;

    /// Submit recorded work, optionally signaling `fence` on completion.
    fn submit_command_list(
        &mut self,
        commands: Self::CommandList,
        queue: QueueType,
        fence: Option<FenceHandle>,
        wait_semaphores: &[SemaphoreHandle],
        signal_semaphores: &[SemaphoreHandle],
    ) -> Result<(), GraphicsError>;

    /// Called once after a frame has been presented.
    fn end_frame(&mut self, frame_index: u32);

    // ------------------------------------------------------------------
    // Swapchain
    // ------------------------------------------------------------------

    fn swapchain_size(&self) -> Extent2d;

    fn swapchain_image_count(&self) -> u32;

    /// Acquire the next image to render into and return its index.
    fn acquire_next_swapchain_image(&mut self) -> Result<u32, GraphicsError>;

    fn swapchain_framebuffer(&self, index: u32) -> FramebufferHandle;

    fn swapchain_image(&self, index: u32) -> ImageHandle;

    fn present(&mut self, index: u32) -> Result<(), GraphicsError>;
}
