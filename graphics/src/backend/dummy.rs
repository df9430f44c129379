//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! handles, keeps a shadow copy of every object it created, and records every
//! command list it receives, so tests can assert on exactly what the renderer
//! asked the GPU to do.
//!
//! Failures can be injected to exercise the error paths:
//!
//! ```ignore
//! let device = DummyDevice::new(Extent2d::new(1280, 720))
//!     .with_failing_renderpass("Shadows")
//!     .with_descriptor_set_limit(4);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::GraphicsError;
use crate::memory::MemoryPlacement;
use crate::renderpack::{PipelineCreateInfo, PipelineKind, RenderPassCreateInfo};
use crate::shader::PipelineResourceInterface;
use crate::types::{
    BufferDescriptor, BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, DeviceMemoryHandle,
    Extent2d, FenceHandle, FramebufferHandle, ImageDescriptor, ImageHandle, MemoryUsage,
    PipelineHandle, PipelineStageFlags, QueueType, RenderpassHandle, ResourceBarrier,
    SamplerDescriptor, SamplerHandle, SemaphoreHandle, TextureFormat, TextureUsage,
};

use super::{
    CommandList, CommandListLevel, DescriptorPoolSizes, DescriptorResource, DescriptorSetWrite,
    DeviceInfo, RenderDevice,
};

/// A command recorded into a [`DummyCommandList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    ResourceBarriers {
        stages_before: PipelineStageFlags,
        stages_after: PipelineStageFlags,
        barriers: Vec<ResourceBarrier>,
    },
    CopyBuffer {
        destination: BufferHandle,
        destination_offset: u64,
        source: BufferHandle,
        source_offset: u64,
        size: u64,
    },
    BeginRenderpass {
        renderpass: RenderpassHandle,
        framebuffer: FramebufferHandle,
    },
    EndRenderpass,
    BindPipeline(PipelineHandle),
    BindDescriptorSets(Vec<DescriptorSetHandle>),
    BindVertexBuffers(Vec<BufferHandle>),
    BindIndexBuffer(BufferHandle),
    DrawIndexedMesh {
        num_indices: u32,
        num_instances: u32,
        first_instance: u32,
    },
    Draw {
        num_vertices: u32,
        num_instances: u32,
    },
}

/// Command list of the dummy backend.
#[derive(Debug, Clone, Default)]
pub struct DummyCommandList {
    pub thread_index: u32,
    pub queue: QueueType,
    pub level: CommandListLevel,
    pub commands: Vec<RecordedCommand>,
}

impl CommandList for DummyCommandList {
    fn resource_barriers(
        &mut self,
        stages_before: PipelineStageFlags,
        stages_after: PipelineStageFlags,
        barriers: &[ResourceBarrier],
    ) {
        self.commands.push(RecordedCommand::ResourceBarriers {
            stages_before,
            stages_after,
            barriers: barriers.to_vec(),
        });
    }

    fn copy_buffer(
        &mut self,
        destination: BufferHandle,
        destination_offset: u64,
        source: BufferHandle,
        source_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBuffer {
            destination,
            destination_offset,
            source,
            source_offset,
            size,
        });
    }

    fn begin_renderpass(&mut self, renderpass: RenderpassHandle, framebuffer: FramebufferHandle) {
        self.commands.push(RecordedCommand::BeginRenderpass {
            renderpass,
            framebuffer,
        });
    }

    fn end_renderpass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderpass);
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        sets: &[DescriptorSetHandle],
        _interface: &PipelineResourceInterface,
    ) {
        self.commands
            .push(RecordedCommand::BindDescriptorSets(sets.to_vec()));
    }

    fn bind_vertex_buffers(&mut self, buffers: &[BufferHandle]) {
        self.commands
            .push(RecordedCommand::BindVertexBuffers(buffers.to_vec()));
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(RecordedCommand::BindIndexBuffer(buffer));
    }

    fn draw_indexed_mesh(&mut self, num_indices: u32, num_instances: u32, first_instance: u32) {
        self.commands.push(RecordedCommand::DrawIndexedMesh {
            num_indices,
            num_instances,
            first_instance,
        });
    }

    fn draw(&mut self, num_vertices: u32, num_instances: u32) {
        self.commands.push(RecordedCommand::Draw {
            num_vertices,
            num_instances,
        });
    }
}

/// A command list handed to [`RenderDevice::submit_command_list`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub queue: QueueType,
    pub commands: Vec<RecordedCommand>,
    pub fence: Option<FenceHandle>,
    pub wait_semaphores: Vec<SemaphoreHandle>,
    pub signal_semaphores: Vec<SemaphoreHandle>,
}

/// Frame-protocol calls in the order the device received them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    AcquireImage(u32),
    ResetFences(Vec<FenceHandle>),
    Submit {
        queue: QueueType,
        fence: Option<FenceHandle>,
    },
    WaitForFences(Vec<FenceHandle>),
    Present(u32),
    EndFrame(u32),
}

/// Shadow copy of a buffer.
#[derive(Debug, Clone)]
pub struct DummyBuffer {
    pub descriptor: BufferDescriptor,
    pub placement: MemoryPlacement,
    pub contents: Vec<u8>,
}

/// Shadow copy of a renderpass.
#[derive(Debug, Clone)]
pub struct DummyRenderpass {
    pub name: String,
    pub framebuffer_size: Extent2d,
}

/// Shadow copy of a framebuffer.
#[derive(Debug, Clone)]
pub struct DummyFramebuffer {
    pub renderpass: Option<RenderpassHandle>,
    pub color_attachments: Vec<ImageHandle>,
    pub depth_attachment: Option<ImageHandle>,
    pub size: Extent2d,
}

/// Shadow copy of a pipeline.
#[derive(Debug, Clone)]
pub struct DummyPipeline {
    pub name: String,
    pub kind: PipelineKind,
    pub renderpass: RenderpassHandle,
}

#[derive(Debug, Clone)]
struct DummyDescriptorPool {
    sizes: DescriptorPoolSizes,
    sets: Vec<DescriptorSetHandle>,
}

/// Shadow copy of a descriptor set.
#[derive(Debug, Clone)]
pub struct DummyDescriptorSet {
    pub pool: DescriptorPoolHandle,
    pub set_index: u32,
    pub bindings: BTreeMap<u32, DescriptorResource>,
}

#[derive(Debug, Clone, Default)]
struct FailureInjection {
    renderpasses: HashSet<String>,
    acquire: Option<GraphicsError>,
    descriptor_set_limit: Option<u32>,
    device_memory_limit: Option<u64>,
}

/// Dummy GPU device.
#[derive(Debug)]
pub struct DummyDevice {
    info: DeviceInfo,
    next_id: u64,
    swapchain_size: Extent2d,
    swapchain_images: Vec<(ImageHandle, FramebufferHandle)>,
    next_swapchain_image: u32,
    memory: HashMap<DeviceMemoryHandle, (u64, MemoryUsage)>,
    buffers: HashMap<BufferHandle, DummyBuffer>,
    images: HashMap<ImageHandle, ImageDescriptor>,
    samplers: HashMap<SamplerHandle, SamplerDescriptor>,
    renderpasses: HashMap<RenderpassHandle, DummyRenderpass>,
    framebuffers: HashMap<FramebufferHandle, DummyFramebuffer>,
    pipelines: HashMap<PipelineHandle, DummyPipeline>,
    descriptor_pools: HashMap<DescriptorPoolHandle, DummyDescriptorPool>,
    descriptor_sets: HashMap<DescriptorSetHandle, DummyDescriptorSet>,
    fences: HashMap<FenceHandle, bool>,
    semaphores: HashSet<SemaphoreHandle>,
    submissions: Vec<Submission>,
    calls: Vec<DeviceCall>,
    command_pool_resets: u64,
    failures: FailureInjection,
}

impl DummyDevice {
    /// Default number of swapchain images.
    pub const DEFAULT_SWAPCHAIN_IMAGES: u32 = 3;

    /// Create a dummy device with a swapchain of the given size.
    pub fn new(swapchain_size: Extent2d) -> Self {
        let mut device = Self {
            info: DeviceInfo::default(),
            next_id: 1,
            swapchain_size,
            swapchain_images: Vec::new(),
            next_swapchain_image: 0,
            memory: HashMap::new(),
            buffers: HashMap::new(),
            images: HashMap::new(),
            samplers: HashMap::new(),
            renderpasses: HashMap::new(),
            framebuffers: HashMap::new(),
            pipelines: HashMap::new(),
            descriptor_pools: HashMap::new(),
            descriptor_sets: HashMap::new(),
            fences: HashMap::new(),
            semaphores: HashSet::new(),
            submissions: Vec::new(),
            calls: Vec::new(),
            command_pool_resets: 0,
            failures: FailureInjection::default(),
        };
        device.create_swapchain(Self::DEFAULT_SWAPCHAIN_IMAGES);
        device
    }

    /// Replace the swapchain with one of `count` images.
    pub fn with_swapchain_image_count(mut self, count: u32) -> Self {
        for (image, framebuffer) in std::mem::take(&mut self.swapchain_images) {
            self.images.remove(&image);
            self.framebuffers.remove(&framebuffer);
        }
        self.create_swapchain(count.max(1));
        self
    }

    /// Replace the reported device capabilities.
    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    /// Make `create_renderpass` fail for the pass with this name.
    pub fn with_failing_renderpass(mut self, name: impl Into<String>) -> Self {
        self.failures.renderpasses.insert(name.into());
        self
    }

    /// Limit the number of descriptor sets each pool can hold.
    pub fn with_descriptor_set_limit(mut self, limit: u32) -> Self {
        self.failures.descriptor_set_limit = Some(limit);
        self
    }

    /// Limit the total amount of device memory that can be allocated.
    pub fn with_device_memory_limit(mut self, limit: u64) -> Self {
        self.failures.device_memory_limit = Some(limit);
        self
    }

    /// Make every following swapchain acquisition fail with `error`.
    pub fn fail_next_acquire(&mut self, error: GraphicsError) {
        self.failures.acquire = Some(error);
    }

    fn create_swapchain(&mut self, count: u32) {
        for _ in 0..count {
            let image = ImageHandle::from_raw(self.allocate_id());
            self.images.insert(
                image,
                ImageDescriptor::new(
                    self.swapchain_size,
                    TextureFormat::Bgra8Unorm,
                    TextureUsage::RENDER_ATTACHMENT,
                )
                .with_label("swapchain"),
            );
            let framebuffer = FramebufferHandle::from_raw(self.allocate_id());
            self.framebuffers.insert(
                framebuffer,
                DummyFramebuffer {
                    renderpass: None,
                    color_attachments: vec![image],
                    depth_attachment: None,
                    size: self.swapchain_size,
                },
            );
            self.swapchain_images.push((image, framebuffer));
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Every command list submitted so far.
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Frame-protocol calls in order.
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Forget recorded submissions and calls.
    pub fn clear_recording(&mut self) {
        self.submissions.clear();
        self.calls.clear();
    }

    pub fn buffer(&self, buffer: BufferHandle) -> Option<&DummyBuffer> {
        self.buffers.get(&buffer)
    }

    pub fn buffer_placement(&self, buffer: BufferHandle) -> Option<MemoryPlacement> {
        self.buffers.get(&buffer).map(|b| b.placement)
    }

    /// Bytes last written to a buffer through `write_data_to_buffer`.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.contents.as_slice())
    }

    pub fn image(&self, image: ImageHandle) -> Option<&ImageDescriptor> {
        self.images.get(&image)
    }

    pub fn renderpass(&self, renderpass: RenderpassHandle) -> Option<&DummyRenderpass> {
        self.renderpasses.get(&renderpass)
    }

    pub fn framebuffer(&self, framebuffer: FramebufferHandle) -> Option<&DummyFramebuffer> {
        self.framebuffers.get(&framebuffer)
    }

    pub fn pipeline(&self, pipeline: PipelineHandle) -> Option<&DummyPipeline> {
        self.pipelines.get(&pipeline)
    }

    pub fn descriptor_set(&self, set: DescriptorSetHandle) -> Option<&DummyDescriptorSet> {
        self.descriptor_sets.get(&set)
    }

    pub fn is_fence_signaled(&self, fence: FenceHandle) -> Option<bool> {
        self.fences.get(&fence).copied()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Images alive, swapchain images excluded.
    pub fn live_image_count(&self) -> usize {
        self.images.len() - self.swapchain_images.len()
    }

    pub fn live_renderpass_count(&self) -> usize {
        self.renderpasses.len()
    }

    /// Framebuffers alive, swapchain framebuffers excluded.
    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len() - self.swapchain_images.len()
    }

    pub fn live_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_descriptor_pool_count(&self) -> usize {
        self.descriptor_pools.len()
    }

    pub fn live_device_memory_count(&self) -> usize {
        self.memory.len()
    }

    pub fn live_fence_count(&self) -> usize {
        self.fences.len()
    }

    /// How often a command pool slot was reset by image acquisition.
    pub fn command_pool_resets(&self) -> u64 {
        self.command_pool_resets
    }
}

impl RenderDevice for DummyDevice {
    type CommandList = DummyCommandList;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_renderpass(
        &mut self,
        data: &RenderPassCreateInfo,
        framebuffer_size: Extent2d,
    ) -> Result<RenderpassHandle, GraphicsError> {
        if self.failures.renderpasses.contains(&data.name) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "renderpass '{}' rejected by the device",
                data.name
            )));
        }
        let handle = RenderpassHandle::from_raw(self.allocate_id());
        log::trace!(
            "DummyDevice: creating renderpass '{}' ({framebuffer_size})",
            data.name
        );
        self.renderpasses.insert(
            handle,
            DummyRenderpass {
                name: data.name.clone(),
                framebuffer_size,
            },
        );
        Ok(handle)
    }

    fn create_framebuffer(
        &mut self,
        renderpass: RenderpassHandle,
        color_attachments: &[ImageHandle],
        depth_attachment: Option<ImageHandle>,
        size: Extent2d,
    ) -> Result<FramebufferHandle, GraphicsError> {
        if !self.renderpasses.contains_key(&renderpass) {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown renderpass {renderpass:?}"
            )));
        }
        let handle = FramebufferHandle::from_raw(self.allocate_id());
        self.framebuffers.insert(
            handle,
            DummyFramebuffer {
                renderpass: Some(renderpass),
                color_attachments: color_attachments.to_vec(),
                depth_attachment,
                size,
            },
        );
        Ok(handle)
    }

    fn create_surface_pipeline(
        &mut self,
        data: &PipelineCreateInfo,
        renderpass: RenderpassHandle,
        _interface: &PipelineResourceInterface,
    ) -> Result<PipelineHandle, GraphicsError> {
        let handle = PipelineHandle::from_raw(self.allocate_id());
        log::trace!("DummyDevice: creating surface pipeline '{}'", data.name);
        self.pipelines.insert(
            handle,
            DummyPipeline {
                name: data.name.clone(),
                kind: PipelineKind::Surface,
                renderpass,
            },
        );
        Ok(handle)
    }

    fn create_global_pipeline(
        &mut self,
        data: &PipelineCreateInfo,
        renderpass: RenderpassHandle,
        _interface: &PipelineResourceInterface,
    ) -> Result<PipelineHandle, GraphicsError> {
        let handle = PipelineHandle::from_raw(self.allocate_id());
        log::trace!("DummyDevice: creating global pipeline '{}'", data.name);
        self.pipelines.insert(
            handle,
            DummyPipeline {
                name: data.name.clone(),
                kind: PipelineKind::Global,
                renderpass,
            },
        );
        Ok(handle)
    }

    fn destroy_renderpass(&mut self, renderpass: RenderpassHandle) {
        self.renderpasses.remove(&renderpass);
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        self.pipelines.remove(&pipeline);
    }

    fn allocate_device_memory(
        &mut self,
        size: u64,
        usage: MemoryUsage,
    ) -> Result<DeviceMemoryHandle, GraphicsError> {
        if let Some(limit) = self.failures.device_memory_limit {
            let allocated: u64 = self.memory.values().map(|(size, _)| size).sum();
            if allocated + size > limit {
                return Err(GraphicsError::OutOfMemory);
            }
        }
        let handle = DeviceMemoryHandle::from_raw(self.allocate_id());
        self.memory.insert(handle, (size, usage));
        Ok(handle)
    }

    fn free_device_memory(&mut self, memory: DeviceMemoryHandle) {
        self.memory.remove(&memory);
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        placement: MemoryPlacement,
    ) -> Result<BufferHandle, GraphicsError> {
        let Some(&(memory_size, _)) = self.memory.get(&placement.memory) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown device memory {:?}",
                placement.memory
            )));
        };
        if placement.offset + descriptor.size > memory_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?} does not fit its placement",
                descriptor.label
            )));
        }
        let handle = BufferHandle::from_raw(self.allocate_id());
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        self.buffers.insert(
            handle,
            DummyBuffer {
                descriptor: descriptor.clone(),
                placement,
                contents: vec![0; descriptor.size as usize],
            },
        );
        Ok(handle)
    }

    fn write_data_to_buffer(
        &mut self,
        data: &[u8],
        buffer: BufferHandle,
    ) -> Result<(), GraphicsError> {
        let target = self.buffers.get_mut(&buffer).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown buffer {buffer:?}"))
        })?;
        if data.len() > target.contents.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes do not fit buffer {:?} of {} bytes",
                data.len(),
                target.descriptor.label,
                target.contents.len()
            )));
        }
        target.contents[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn create_image(&mut self, descriptor: &ImageDescriptor) -> Result<ImageHandle, GraphicsError> {
        let max = self.info.max_texture_size;
        if descriptor.size.width > max || descriptor.size.height > max {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "image of {} exceeds the maximum texture size {max}",
                descriptor.size
            )));
        }
        let handle = ImageHandle::from_raw(self.allocate_id());
        self.images.insert(handle, descriptor.clone());
        Ok(handle)
    }

    fn destroy_texture(&mut self, image: ImageHandle) {
        self.images.remove(&image);
    }

    fn create_sampler(
        &mut self,
        descriptor: &SamplerDescriptor,
    ) -> Result<SamplerHandle, GraphicsError> {
        let handle = SamplerHandle::from_raw(self.allocate_id());
        self.samplers.insert(handle, descriptor.clone());
        Ok(handle)
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler);
    }

    fn create_descriptor_pool(
        &mut self,
        sizes: &DescriptorPoolSizes,
    ) -> Result<DescriptorPoolHandle, GraphicsError> {
        let handle = DescriptorPoolHandle::from_raw(self.allocate_id());
        let mut sizes = *sizes;
        if let Some(limit) = self.failures.descriptor_set_limit {
            sizes.max_sets = sizes.max_sets.min(limit);
        }
        self.descriptor_pools.insert(
            handle,
            DummyDescriptorPool {
                sizes,
                sets: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn create_descriptor_sets(
        &mut self,
        interface: &PipelineResourceInterface,
        pool: DescriptorPoolHandle,
    ) -> Result<Vec<DescriptorSetHandle>, GraphicsError> {
        let set_count = interface.set_count();
        let Some(dummy_pool) = self.descriptor_pools.get(&pool) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown descriptor pool {pool:?}"
            )));
        };
        if dummy_pool.sets.len() as u32 + set_count > dummy_pool.sizes.max_sets {
            return Err(GraphicsError::DescriptorPoolExhausted);
        }

        let mut sets = Vec::with_capacity(set_count as usize);
        for set_index in 0..set_count {
            let handle = DescriptorSetHandle::from_raw(self.allocate_id());
            self.descriptor_sets.insert(
                handle,
                DummyDescriptorSet {
                    pool,
                    set_index,
                    bindings: BTreeMap::new(),
                },
            );
            sets.push(handle);
        }
        if let Some(dummy_pool) = self.descriptor_pools.get_mut(&pool) {
            dummy_pool.sets.extend_from_slice(&sets);
        }
        Ok(sets)
    }

    fn update_descriptor_sets(&mut self, writes: &[DescriptorSetWrite]) {
        for write in writes {
            match self.descriptor_sets.get_mut(&write.set) {
                Some(set) => {
                    set.bindings.insert(write.binding, write.resource);
                }
                None => log::warn!("DummyDevice: write to unknown descriptor set {:?}", write.set),
            }
        }
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) {
        if let Some(dummy_pool) = self.descriptor_pools.remove(&pool) {
            for set in dummy_pool.sets {
                self.descriptor_sets.remove(&set);
            }
        }
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle, GraphicsError> {
        let handle = SemaphoreHandle::from_raw(self.allocate_id());
        self.semaphores.insert(handle);
        Ok(handle)
    }

    fn destroy_semaphores(&mut self, semaphores: &[SemaphoreHandle]) {
        for semaphore in semaphores {
            self.semaphores.remove(semaphore);
        }
    }

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle, GraphicsError> {
        let handle = FenceHandle::from_raw(self.allocate_id());
        self.fences.insert(handle, signaled);
        Ok(handle)
    }

    fn wait_for_fences(&mut self, fences: &[FenceHandle]) -> Result<(), GraphicsError> {
        self.calls.push(DeviceCall::WaitForFences(fences.to_vec()));
        for fence in fences {
            match self.fences.get(fence) {
                Some(true) => {}
                // Nothing was submitted that could signal it, a real device would hang here.
                Some(false) => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "waiting on fence {fence:?} that is never signaled"
                    )))
                }
                None => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "unknown fence {fence:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    fn reset_fences(&mut self, fences: &[FenceHandle]) -> Result<(), GraphicsError> {
        self.calls.push(DeviceCall::ResetFences(fences.to_vec()));
        for fence in fences {
            let state = self.fences.get_mut(fence).ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("unknown fence {fence:?}"))
            })?;
            *state = false;
        }
        Ok(())
    }

    fn destroy_fences(&mut self, fences: &[FenceHandle]) {
        for fence in fences {
            self.fences.remove(fence);
        }
    }

    fn create_command_list(
        &mut self,
        thread_index: u32,
        queue: QueueType,
        level: CommandListLevel,
    ) -> Result<Self::CommandList, GraphicsError> {
        Ok(DummyCommandList {
            thread_index,
            queue,
            level,
            commands: Vec::new(),
        })
    }

    fn submit_command_list(
        &mut self,
        commands: Self::CommandList,
        queue: QueueType,
        fence: Option<FenceHandle>,
        wait_semaphores: &[SemaphoreHandle],
        signal_semaphores: &[SemaphoreHandle],
    ) -> Result<(), GraphicsError> {
        if let Some(fence) = fence {
            // Work completes immediately on the dummy device.
            let state = self.fences.get_mut(&fence).ok_or_else(|| {
                GraphicsError::SubmissionFailed(format!("unknown fence {fence:?}"))
            })?;
            *state = true;
        }
        self.calls.push(DeviceCall::Submit { queue, fence });
        self.submissions.push(Submission {
            queue,
            commands: commands.commands,
            fence,
            wait_semaphores: wait_semaphores.to_vec(),
            signal_semaphores: signal_semaphores.to_vec(),
        });
        Ok(())
    }

    fn end_frame(&mut self, frame_index: u32) {
        self.calls.push(DeviceCall::EndFrame(frame_index));
    }

    fn swapchain_size(&self) -> Extent2d {
        self.swapchain_size
    }

    fn swapchain_image_count(&self) -> u32 {
        self.swapchain_images.len() as u32
    }

    fn acquire_next_swapchain_image(&mut self) -> Result<u32, GraphicsError> {
        if let Some(error) = self.failures.acquire.clone() {
            return Err(error);
        }
        let index = self.next_swapchain_image;
        self.next_swapchain_image = (index + 1) % self.swapchain_image_count();
        self.command_pool_resets += 1;
        self.calls.push(DeviceCall::AcquireImage(index));
        Ok(index)
    }

    fn swapchain_framebuffer(&self, index: u32) -> FramebufferHandle {
        self.swapchain_images[index as usize].1
    }

    fn swapchain_image(&self, index: u32) -> ImageHandle {
        self.swapchain_images[index as usize].0
    }

    fn present(&mut self, index: u32) -> Result<(), GraphicsError> {
        if index >= self.swapchain_image_count() {
            return Err(GraphicsError::InvalidParameter(format!(
                "swapchain image {index} does not exist"
            )));
        }
        self.calls.push(DeviceCall::Present(index));
        Ok(())
    }
}

static_assertions::assert_impl_all!(DummyDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_swapchain_round_robin() {
        let mut device = DummyDevice::new(Extent2d::new(640, 480)).with_swapchain_image_count(2);
        assert_eq!(device.swapchain_image_count(), 2);
        assert_eq!(device.acquire_next_swapchain_image().unwrap(), 0);
        assert_eq!(device.acquire_next_swapchain_image().unwrap(), 1);
        assert_eq!(device.acquire_next_swapchain_image().unwrap(), 0);
        assert_eq!(device.live_image_count(), 0);
        assert_eq!(device.live_framebuffer_count(), 0);
    }

    #[test]
    fn test_fence_signaled_by_submit() {
        let mut device = DummyDevice::new(Extent2d::new(64, 64));
        let fence = device.create_fence(false).unwrap();
        assert!(device.wait_for_fences(&[fence]).is_err());

        let commands = device
            .create_command_list(0, QueueType::Graphics, CommandListLevel::Primary)
            .unwrap();
        device
            .submit_command_list(commands, QueueType::Graphics, Some(fence), &[], &[])
            .unwrap();
        assert_eq!(device.is_fence_signaled(fence), Some(true));
        assert!(device.wait_for_fences(&[fence]).is_ok());

        device.reset_fences(&[fence]).unwrap();
        assert_eq!(device.is_fence_signaled(fence), Some(false));
    }

    #[test]
    fn test_write_data_to_buffer_whole() {
        let mut device = DummyDevice::new(Extent2d::new(64, 64));
        let memory = device
            .allocate_device_memory(1024, MemoryUsage::LowFrequencyUpload)
            .unwrap();
        let placement = MemoryPlacement {
            memory,
            offset: 0,
            size: 16,
        };
        let buffer = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::UNIFORM), placement)
            .unwrap();

        device.write_data_to_buffer(&[1, 2, 3, 4], buffer).unwrap();
        assert_eq!(&device.buffer_contents(buffer).unwrap()[..4], &[1, 2, 3, 4]);
        assert!(device.write_data_to_buffer(&[0; 32], buffer).is_err());
    }

    #[test]
    fn test_memory_limit() {
        let mut device = DummyDevice::new(Extent2d::new(64, 64)).with_device_memory_limit(100);
        assert!(device
            .allocate_device_memory(64, MemoryUsage::DeviceOnly)
            .is_ok());
        assert_eq!(
            device.allocate_device_memory(64, MemoryUsage::DeviceOnly),
            Err(GraphicsError::OutOfMemory)
        );
    }
}
