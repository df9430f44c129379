//! The top-level rendering context.
//!
//! A [`Renderer`] is owned by the host application and passed by reference
//! to whatever needs it. It ties the components together:
//!
//! 1. Renderpack descriptions come in through a [`RenderpackLoader`] or
//!    [`Renderer::load_renderpack_data`].
//! 2. Pipelines are reflected into resource interfaces, passes are added to
//!    the [`Rendergraph`], material passes get their descriptor sets.
//! 3. [`Renderer::execute_frame`] records the passes in execution order,
//!    submits them and presents.
//!
//! Loading and unloading take `&mut self`, so they can never overlap with
//! frame execution.
//!
//! # Example
//!
//! ```ignore
//! let mut renderer = Renderer::new(device, RendererSettings::default())?;
//! renderer.create_ui_renderpass(Box::new(NullUiRenderpass))?;
//! renderer.load_renderpack_data(pack)?;
//!
//! let mesh = renderer.create_mesh(&cube)?;
//! let name = FullMaterialPassName::new("stone", "forward");
//! renderer.add_renderable_for_material(&name, &StaticMeshRenderableCreateInfo::new(mesh))?;
//!
//! loop {
//!     renderer.execute_frame()?;
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{CommandList, CommandListLevel, DescriptorPoolSizes, RenderDevice};
use crate::error::GraphicsError;
use crate::frame::{FrameContext, FrameSlot};
use crate::graph::{
    MaterialDrawExecutor, Renderpass, RenderpassExecutor, RenderpassKey, RenderpassMetadata,
    Rendergraph, ResourceStateTracker, RENDERPASS_STAGES, UI_RENDERPASS_NAME,
};
use crate::materials::{
    BindingResources, FullMaterialPassName, MaterialPass, MaterialPassKey, Pipeline,
    RenderCommand, RenderableId, StaticMeshRenderableCreateInfo, StaticMeshRenderableUpdateData,
};
use crate::memory::{
    BlockAllocationStrategy, BufferResource, BumpPointAllocationStrategy, DeviceMemoryResource,
};
use crate::renderpack::{
    RenderPassCreateInfo, RenderpackData, RenderpackLoader, TextureAttachmentInfo,
    TextureCreateInfo, TextureSize,
};
use crate::resources::{
    BuiltinBuffers, Mesh, MeshData, MeshEntry, MeshId, MeshStore, ModelMatrices,
    PerFrameUniforms, ProceduralMesh, TextureTable, BACKBUFFER_NAME, MODEL_MATRIX_BUFFER_NAME,
    PER_FRAME_DATA_NAME, POINT_SAMPLER_NAME, SCENE_OUTPUT_RT_NAME,
};
use crate::settings::RendererSettings;
use crate::shader::{build_pipeline_interface, PipelineResourceInterface};
use crate::types::{
    BufferDescriptor, BufferUsage, DescriptorPoolHandle, MemoryUsage, PipelineStageFlags,
    QueueType, ResourceBarrier, ResourceState, SamplerDescriptor, SamplerHandle, TextureFormat,
};
use lumen_core::profiling::{
    frame_mark, profile_function, profile_message, profile_plot, profile_scope,
};

const STAGING_ALIGNMENT: u64 = 16;

/// UI executor that records an empty pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUiRenderpass;

impl RenderpassExecutor for NullUiRenderpass {
    fn record_renderpass_contents(
        &self,
        _pass: &Renderpass,
        _cmds: &mut dyn CommandList,
        _ctx: &FrameContext<'_>,
    ) {
    }
}

#[derive(Debug, Clone, Copy)]
struct RenderableRecord {
    key: MaterialPassKey,
    mesh: MeshId,
    model_matrix_index: u32,
}

/// Explicitly owned rendering context over one device.
pub struct Renderer<D: RenderDevice> {
    device: D,
    settings: RendererSettings,

    mesh_memory: DeviceMemoryResource,
    uniform_memory: DeviceMemoryResource,
    staging_memory: DeviceMemoryResource,
    procedural_staging_memory: DeviceMemoryResource,

    textures: TextureTable,
    builtin_buffers: BuiltinBuffers,
    per_frame_data: BufferResource,
    model_matrix_buffer: BufferResource,
    model_matrices: ModelMatrices,
    point_sampler: SamplerHandle,

    rendergraph: Rendergraph,
    state_tracker: ResourceStateTracker,
    pipeline_locations: HashMap<String, (RenderpassKey, usize)>,
    material_pass_keys: HashMap<FullMaterialPassName, MaterialPassKey>,
    descriptor_pool: Option<DescriptorPoolHandle>,
    loader: Option<Box<dyn RenderpackLoader>>,
    loaded_renderpack: Option<String>,
    renderpack_generation: u64,

    meshes: MeshStore,
    renderables: HashMap<RenderableId, RenderableRecord>,
    next_renderable_id: AtomicU64,

    frame_slots: Vec<FrameSlot>,
    frame_count: u64,
}

impl<D: RenderDevice> Renderer<D> {
    /// Create the memory pools, builtin resources and frame slots.
    ///
    /// No renderpass exists afterwards, builtin ones included.
    pub fn new(mut device: D, settings: RendererSettings) -> Result<Self, GraphicsError> {
        profile_function!();

        let mesh_memory = DeviceMemoryResource::new(
            &mut device,
            "mesh memory",
            MemoryUsage::DeviceOnly,
            Box::new(BlockAllocationStrategy::new(settings.mesh_memory_size)),
        )?;
        let mut uniform_memory = DeviceMemoryResource::new(
            &mut device,
            "uniform memory",
            MemoryUsage::LowFrequencyUpload,
            Box::new(BumpPointAllocationStrategy::new(settings.uniform_memory_size)),
        )?;
        let staging_memory = DeviceMemoryResource::new(
            &mut device,
            "staging memory",
            MemoryUsage::StagingBuffer,
            Box::new(BumpPointAllocationStrategy::new(settings.staging_memory_size)),
        )?;
        let procedural_staging_memory = DeviceMemoryResource::new(
            &mut device,
            "procedural staging memory",
            MemoryUsage::StagingBuffer,
            Box::new(BlockAllocationStrategy::new(
                settings.procedural_staging_memory_size,
            )),
        )?;

        let uniform_alignment = settings
            .uniform_alignment
            .max(device.info().min_uniform_buffer_alignment)
            .next_power_of_two();
        let per_frame_data = uniform_memory.create_buffer(
            &mut device,
            &BufferDescriptor::new(
                std::mem::size_of::<PerFrameUniforms>() as u64,
                BufferUsage::UNIFORM,
            )
            .with_label(PER_FRAME_DATA_NAME),
            uniform_alignment,
        )?;
        let model_matrices = ModelMatrices::new(settings.model_matrix_capacity);
        let model_matrix_buffer = uniform_memory.create_buffer(
            &mut device,
            &BufferDescriptor::new(model_matrices.buffer_size().max(64), BufferUsage::UNIFORM)
                .with_label(MODEL_MATRIX_BUFFER_NAME),
            uniform_alignment,
        )?;
        let mut builtin_buffers = BuiltinBuffers::new();
        builtin_buffers.insert(PER_FRAME_DATA_NAME, per_frame_data);
        builtin_buffers.insert(MODEL_MATRIX_BUFFER_NAME, model_matrix_buffer);

        let screen_size = device.swapchain_size();
        let mut textures = TextureTable::new();
        textures.create_texture(
            &mut device,
            &TextureCreateInfo::render_target(
                SCENE_OUTPUT_RT_NAME,
                TextureFormat::Rgba8Unorm,
                TextureSize::ScreenRelative {
                    width: 1.0,
                    height: 1.0,
                },
            ),
            screen_size,
            true,
        )?;

        let point_sampler = device
            .create_sampler(&SamplerDescriptor::nearest().with_label(POINT_SAMPLER_NAME))?;

        let frame_slots = FrameSlot::create_all(&mut device)?;

        log::info!(
            "Renderer created ({screen_size}, {} frame slots)",
            frame_slots.len()
        );

        Ok(Self {
            device,
            settings,
            mesh_memory,
            uniform_memory,
            staging_memory,
            procedural_staging_memory,
            textures,
            builtin_buffers,
            per_frame_data,
            model_matrix_buffer,
            model_matrices,
            point_sampler,
            rendergraph: Rendergraph::new(),
            state_tracker: ResourceStateTracker::new(),
            pipeline_locations: HashMap::new(),
            material_pass_keys: HashMap::new(),
            descriptor_pool: None,
            loader: None,
            loaded_renderpack: None,
            renderpack_generation: 0,
            meshes: MeshStore::new(),
            renderables: HashMap::new(),
            next_renderable_id: AtomicU64::new(0),
            frame_slots,
            frame_count: 0,
        })
    }

    // ------------------------------------------------------------------
    // Renderpacks
    // ------------------------------------------------------------------

    /// Install the loader used by [`load_renderpack`](Self::load_renderpack).
    ///
    /// Loads the renderpack named in the settings if nothing is loaded yet.
    pub fn set_renderpack_loader(
        &mut self,
        loader: Box<dyn RenderpackLoader>,
    ) -> Result<(), GraphicsError> {
        self.loader = Some(loader);
        match (&self.loaded_renderpack, self.settings.renderpack.clone()) {
            (None, Some(name)) => self.load_renderpack(&name),
            _ => Ok(()),
        }
    }

    /// Load a renderpack by name through the installed loader.
    pub fn load_renderpack(&mut self, name: &str) -> Result<(), GraphicsError> {
        let loader = self.loader.as_mut().ok_or_else(|| {
            GraphicsError::InvalidParameter("no renderpack loader is installed".to_string())
        })?;
        let data = loader.load_renderpack(name)?;
        self.load_renderpack_data(data)
    }

    /// Replace the current renderpack with `data`.
    ///
    /// Invalid textures, pipelines, passes and material passes are logged and
    /// dropped; the rest of the pack loads. Resource exhaustion, backend
    /// failures and a cyclic pass graph unload the pack again and return the
    /// error.
    pub fn load_renderpack_data(&mut self, data: RenderpackData) -> Result<(), GraphicsError> {
        profile_function!();
        log::info!("Loading renderpack '{}'", data.name);

        self.wait_for_frames()?;
        self.unload_renderpack_objects();

        if let Err(err) = self.create_renderpack_objects(&data) {
            log::error!("Failed to load renderpack '{}': {err}", data.name);
            self.unload_renderpack_objects();
            return Err(err);
        }

        log::info!(
            "Loaded renderpack '{}': {} renderpasses, {} pipelines, {} material passes",
            data.name,
            self.rendergraph.len(),
            self.pipeline_locations.len(),
            self.material_pass_keys.len()
        );
        profile_message!("renderpack loaded");
        self.loaded_renderpack = Some(data.name);
        Ok(())
    }

    fn create_renderpack_objects(&mut self, data: &RenderpackData) -> Result<(), GraphicsError> {
        let screen_size = self.device.swapchain_size();

        for texture in &data.textures {
            match self
                .textures
                .create_texture(&mut self.device, texture, screen_size, false)
            {
                Ok(_) => {}
                Err(err) if err.is_configuration_error() => {
                    log::error!("Skipping texture '{}': {err}", texture.name);
                }
                Err(err) => return Err(err),
            }
        }

        let mut reflected: Vec<(usize, PipelineResourceInterface)> = Vec::new();
        {
            profile_scope!("reflect_pipelines");
            for (index, pipeline) in data.pipelines.iter().enumerate() {
                match build_pipeline_interface(pipeline, self.settings.array_bound_policy) {
                    Ok(interface) => reflected.push((index, interface)),
                    Err(err) => log::error!("Skipping pipeline '{}': {err}", pipeline.name),
                }
            }
        }

        let mut pool_sizes = DescriptorPoolSizes::default();
        for pass in data.materials.iter().flat_map(|material| &material.passes) {
            if let Some((_, interface)) = reflected
                .iter()
                .find(|(index, _)| data.pipelines[*index].name == pass.pipeline)
            {
                pool_sizes += interface.descriptor_counts();
            }
        }
        let pool = self.device.create_descriptor_pool(&pool_sizes)?;
        self.descriptor_pool = Some(pool);

        for pass in &data.passes {
            match self.rendergraph.add_renderpass(
                &mut self.device,
                pass.clone(),
                &self.textures,
                false,
                Box::new(MaterialDrawExecutor),
            ) {
                Ok(_) => {}
                Err(err) if err.is_configuration_error() => {
                    log::error!("Skipping renderpass '{}': {err}", pass.name);
                }
                Err(err) => return Err(err),
            }
        }

        for (index, interface) in reflected {
            let info = &data.pipelines[index];
            if self.pipeline_locations.contains_key(&info.name) {
                log::error!(
                    "Skipping pipeline '{}': {}",
                    info.name,
                    GraphicsError::DuplicateName(info.name.clone())
                );
                continue;
            }
            let Some(renderpass_key) = self.rendergraph.key_of(&info.pass) else {
                log::error!(
                    "Skipping pipeline '{}': renderpass '{}' does not exist",
                    info.name,
                    info.pass
                );
                continue;
            };
            let Some(renderpass) = self.rendergraph.get_mut(renderpass_key) else {
                continue;
            };
            let pipeline = Pipeline::create(&mut self.device, info.clone(), interface, renderpass)?;
            let pipeline_index = renderpass.add_pipeline(pipeline);
            self.pipeline_locations
                .insert(info.name.clone(), (renderpass_key, pipeline_index));
        }

        let resources = BindingResources {
            textures: &self.textures,
            buffers: &self.builtin_buffers,
            point_sampler: self.point_sampler,
        };
        for material in &data.materials {
            for pass_data in &material.passes {
                let name = FullMaterialPassName::new(&material.name, &pass_data.name);
                if self.material_pass_keys.contains_key(&name) {
                    log::error!("Skipping material pass '{name}': defined twice");
                    continue;
                }
                let Some(&(renderpass, pipeline_index)) =
                    self.pipeline_locations.get(&pass_data.pipeline)
                else {
                    log::error!(
                        "Skipping material pass '{name}': pipeline '{}' does not exist",
                        pass_data.pipeline
                    );
                    continue;
                };
                let Some(pipeline) = self
                    .rendergraph
                    .get_mut(renderpass)
                    .and_then(|pass| pass.pipelines_mut().get_mut(pipeline_index))
                else {
                    continue;
                };
                let material_pass = MaterialPass::create(
                    &mut self.device,
                    name.clone(),
                    pass_data,
                    pipeline.interface(),
                    pool,
                    &resources,
                )?;
                let material_pass_index = pipeline.add_material_pass(material_pass);
                self.material_pass_keys.insert(
                    name,
                    MaterialPassKey {
                        renderpass,
                        pipeline_index,
                        material_pass_index,
                        generation: self.renderpack_generation,
                    },
                );
            }
        }

        self.rendergraph.calculate_renderpass_execution_order()?;
        Ok(())
    }

    /// Release everything the current renderpack created.
    ///
    /// Renderables registered against the pack are forgotten.
    pub fn unload_renderpack(&mut self) -> Result<(), GraphicsError> {
        self.wait_for_frames()?;
        if let Some(name) = &self.loaded_renderpack {
            log::info!("Unloading renderpack '{name}'");
        }
        self.unload_renderpack_objects();
        Ok(())
    }

    fn unload_renderpack_objects(&mut self) {
        for record in self.renderables.values() {
            self.model_matrices.release(record.model_matrix_index);
        }
        self.renderables.clear();
        self.material_pass_keys.clear();
        self.pipeline_locations.clear();
        self.rendergraph.destroy_non_builtin(&mut self.device);
        if let Some(pool) = self.descriptor_pool.take() {
            self.device.destroy_descriptor_pool(pool);
        }
        self.textures.destroy_dynamic_textures(&mut self.device);
        self.state_tracker.clear();
        self.loaded_renderpack = None;
        self.renderpack_generation += 1;
    }

    fn wait_for_frames(&mut self) -> Result<(), GraphicsError> {
        let fences: Vec<_> = self.frame_slots.iter().map(|slot| slot.fence).collect();
        self.device.wait_for_fences(&fences)
    }

    // ------------------------------------------------------------------
    // Builtin renderpasses
    // ------------------------------------------------------------------

    /// Register a renderpass that survives renderpack reloads.
    pub fn add_builtin_renderpass(
        &mut self,
        data: RenderPassCreateInfo,
        executor: Box<dyn RenderpassExecutor>,
    ) -> Result<RenderpassKey, GraphicsError> {
        self.rendergraph
            .add_renderpass(&mut self.device, data, &self.textures, true, executor)
    }

    /// Register the UI pass, which reads the scene output and writes the backbuffer.
    pub fn create_ui_renderpass(
        &mut self,
        executor: Box<dyn RenderpassExecutor>,
    ) -> Result<RenderpassKey, GraphicsError> {
        let data = RenderPassCreateInfo::new(UI_RENDERPASS_NAME)
            .with_input(SCENE_OUTPUT_RT_NAME)
            .with_output(TextureAttachmentInfo::new(
                BACKBUFFER_NAME,
                TextureFormat::Bgra8Unorm,
            ));
        self.add_builtin_renderpass(data, executor)
    }

    // ------------------------------------------------------------------
    // Frame execution
    // ------------------------------------------------------------------

    /// Render and present one frame.
    ///
    /// Device loss and swapchain failures are returned unchanged; the renderer
    /// does not retry.
    pub fn execute_frame(&mut self) -> Result<(), GraphicsError> {
        profile_function!();

        if self.rendergraph.execution_order().is_none() {
            self.rendergraph.calculate_renderpass_execution_order()?;
        }

        self.frame_count += 1;
        let frame_index = self.device.acquire_next_swapchain_image()?;
        let slot_index = frame_index as usize % self.frame_slots.len();
        let fence = self.frame_slots[slot_index].fence;

        let mut cmds =
            self.device
                .create_command_list(0, QueueType::Graphics, CommandListLevel::Primary)?;

        let swapchain_size = self.device.swapchain_size();
        let uniforms = PerFrameUniforms {
            frame_count: self.frame_count as u32,
            frame_index,
            viewport_width: swapchain_size.width,
            viewport_height: swapchain_size.height,
        };
        self.device
            .write_data_to_buffer(bytemuck::bytes_of(&uniforms), self.per_frame_data.handle)?;
        self.model_matrices
            .upload(&mut self.device, self.model_matrix_buffer.handle)?;

        {
            profile_scope!("procedural_mesh_uploads");
            for (_, mesh) in self.meshes.procedural_meshes_mut() {
                mesh.record_upload(&mut self.device, &mut cmds, slot_index)?;
            }
        }

        let swapchain_image = self.device.swapchain_image(frame_index);
        {
            profile_scope!("record_renderpasses");
            let slot = &self.frame_slots[slot_index];
            let ctx = FrameContext {
                frame_count: self.frame_count,
                frame_index,
                swapchain_framebuffer: self.device.swapchain_framebuffer(frame_index),
                swapchain_image,
                swapchain_size,
                scratch: &slot.scratch,
                meshes: &self.meshes,
            };

            let order = bumpalo::collections::Vec::from_iter_in(
                self.rendergraph
                    .execution_order()
                    .unwrap_or_default()
                    .iter()
                    .copied(),
                ctx.scratch,
            );
            for key in order.iter() {
                let Some(pass) = self.rendergraph.get(*key) else {
                    continue;
                };
                let barriers = self
                    .state_tracker
                    .barriers_for_renderpass(pass, swapchain_image);
                if !barriers.is_empty() {
                    cmds.resource_barriers(RENDERPASS_STAGES, RENDERPASS_STAGES, &barriers);
                }
                log::trace!("Recording renderpass '{}'", pass.name());
                pass.render(&mut cmds, &ctx);
            }
        }

        if let Some(barrier) = self
            .state_tracker
            .transition(swapchain_image, ResourceState::Present)
        {
            cmds.resource_barriers(
                PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                PipelineStageFlags::BOTTOM_OF_PIPE,
                &[barrier],
            );
        }

        // Reset only once recording succeeded, so a failed frame leaves the
        // fence signaled for the next wait.
        self.device.reset_fences(&[fence])?;
        self.device
            .submit_command_list(cmds, QueueType::Graphics, Some(fence), &[], &[])?;
        self.device.wait_for_fences(&[fence])?;
        self.device.present(frame_index)?;

        self.frame_slots[slot_index].release_scratch();
        self.device.end_frame(frame_index);
        frame_mark!();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Meshes
    // ------------------------------------------------------------------

    /// Upload a static mesh through the staging pool.
    ///
    /// Blocks until the copy finished on the transfer queue.
    pub fn create_mesh(&mut self, data: &MeshData) -> Result<MeshId, GraphicsError> {
        profile_function!();

        if data.vertex_data.is_empty() || data.indices.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "a mesh needs at least one vertex and one index".to_string(),
            ));
        }

        let vertex_bytes = data.vertex_bytes();
        let index_bytes = data.index_bytes();
        let vertex_buffer = self.mesh_memory.create_buffer(
            &mut self.device,
            &BufferDescriptor::new(
                vertex_bytes.len() as u64,
                BufferUsage::VERTEX | BufferUsage::COPY_DST,
            )
            .with_label("mesh vertex buffer"),
            self.settings.mesh_alignment,
        )?;
        let index_buffer = match self.mesh_memory.create_buffer(
            &mut self.device,
            &BufferDescriptor::new(
                index_bytes.len() as u64,
                BufferUsage::INDEX | BufferUsage::COPY_DST,
            )
            .with_label("mesh index buffer"),
            self.settings.mesh_alignment,
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.mesh_memory
                    .destroy_buffer(&mut self.device, vertex_buffer);
                return Err(err);
            }
        };

        let mesh = Mesh {
            vertex_buffer,
            index_buffer,
            num_indices: data.indices.len() as u32,
        };
        if let Err(err) = self.upload_mesh(&mesh, vertex_bytes, index_bytes) {
            self.mesh_memory
                .destroy_buffer(&mut self.device, vertex_buffer);
            self.mesh_memory
                .destroy_buffer(&mut self.device, index_buffer);
            return Err(err);
        }

        let id = self.meshes.insert_static(mesh);
        log::debug!(
            "Created mesh {id:?} ({} vertices, {} indices)",
            data.vertex_data.len(),
            data.indices.len()
        );
        profile_plot!("mesh_memory_free", self.mesh_memory.free_space());
        Ok(id)
    }

    fn upload_mesh(
        &mut self,
        mesh: &Mesh,
        vertex_bytes: &[u8],
        index_bytes: &[u8],
    ) -> Result<(), GraphicsError> {
        let mut staging = Vec::with_capacity(2);
        let result = self.record_mesh_upload(mesh, vertex_bytes, index_bytes, &mut staging);
        for buffer in staging {
            self.staging_memory
                .destroy_buffer(&mut self.device, buffer);
        }
        self.staging_memory.reset();
        result
    }

    fn record_mesh_upload(
        &mut self,
        mesh: &Mesh,
        vertex_bytes: &[u8],
        index_bytes: &[u8],
        staging: &mut Vec<BufferResource>,
    ) -> Result<(), GraphicsError> {
        for bytes in [vertex_bytes, index_bytes] {
            let buffer = self.staging_memory.create_buffer(
                &mut self.device,
                &BufferDescriptor::new(bytes.len() as u64, BufferUsage::COPY_SRC)
                    .with_label("mesh staging buffer"),
                STAGING_ALIGNMENT,
            )?;
            staging.push(buffer);
            self.device.write_data_to_buffer(bytes, buffer.handle)?;
        }

        let mut cmds =
            self.device
                .create_command_list(0, QueueType::Transfer, CommandListLevel::Primary)?;
        let targets = [mesh.vertex_buffer, mesh.index_buffer];
        cmds.resource_barriers(
            PipelineStageFlags::TOP_OF_PIPE,
            PipelineStageFlags::TRANSFER,
            &targets.map(|buffer| {
                ResourceBarrier::buffer(
                    buffer.handle,
                    buffer.size,
                    ResourceState::Undefined,
                    ResourceState::CopyDestination,
                )
            }),
        );
        for (target, source) in targets.iter().zip(staging.iter()) {
            cmds.copy_buffer(target.handle, 0, source.handle, 0, target.size);
        }
        cmds.resource_barriers(
            PipelineStageFlags::TRANSFER,
            PipelineStageFlags::VERTEX_INPUT,
            &targets.map(|buffer| {
                ResourceBarrier::buffer(
                    buffer.handle,
                    buffer.size,
                    ResourceState::CopyDestination,
                    ResourceState::VertexOrIndexBuffer,
                )
            }),
        );

        let fence = self.device.create_fence(false)?;
        let result = self
            .device
            .submit_command_list(cmds, QueueType::Transfer, Some(fence), &[], &[])
            .and_then(|()| self.device.wait_for_fences(&[fence]));
        self.device.destroy_fences(&[fence]);
        result
    }

    /// Create a mesh whose geometry is rewritten from the CPU.
    ///
    /// `vertex_size` and `index_size` are the capacities in bytes.
    pub fn create_procedural_mesh(
        &mut self,
        vertex_size: u64,
        index_size: u64,
    ) -> Result<(MeshId, &mut ProceduralMesh), GraphicsError> {
        let mesh = ProceduralMesh::new(
            &mut self.device,
            &mut self.mesh_memory,
            &mut self.procedural_staging_memory,
            vertex_size,
            index_size,
            self.frame_slots.len(),
        )?;
        let id = self.meshes.insert_procedural(mesh);
        let mesh = self.meshes.get_procedural_mut(id).ok_or_else(|| {
            GraphicsError::Internal(format!("procedural mesh {id:?} vanished after insertion"))
        })?;
        Ok((id, mesh))
    }

    pub fn procedural_mesh_mut(&mut self, id: MeshId) -> Option<&mut ProceduralMesh> {
        self.meshes.get_procedural_mut(id)
    }

    pub fn get_mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get_static(id)
    }

    pub fn reserve_meshes(&mut self, additional: usize) {
        self.meshes.reserve(additional);
    }

    /// Free a mesh's buffers. Returns false for unknown ids.
    ///
    /// Renderables still drawing the mesh are removed.
    pub fn destroy_mesh(&mut self, id: MeshId) -> bool {
        let users: Vec<RenderableId> = self
            .renderables
            .iter()
            .filter(|(_, record)| record.mesh == id)
            .map(|(renderable, _)| *renderable)
            .collect();
        if !users.is_empty() {
            log::warn!(
                "Destroying mesh {id:?} still drawn by {} renderables",
                users.len()
            );
            for renderable in users {
                self.remove_renderable(renderable);
            }
        }

        match self.meshes.remove(id) {
            Some(MeshEntry::Static(mesh)) => {
                self.mesh_memory
                    .destroy_buffer(&mut self.device, mesh.vertex_buffer);
                self.mesh_memory
                    .destroy_buffer(&mut self.device, mesh.index_buffer);
                true
            }
            Some(MeshEntry::Procedural(mut mesh)) => {
                mesh.destroy(
                    &mut self.device,
                    &mut self.mesh_memory,
                    &mut self.procedural_staging_memory,
                );
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Renderables
    // ------------------------------------------------------------------

    /// Draw a mesh with a material pass from the next frame on.
    pub fn add_renderable_for_material(
        &mut self,
        material_pass: &FullMaterialPassName,
        info: &StaticMeshRenderableCreateInfo,
    ) -> Result<RenderableId, GraphicsError> {
        let key = *self.material_pass_keys.get(material_pass).ok_or_else(|| {
            log::error!("No material pass named '{material_pass}'");
            GraphicsError::UnknownMaterialPass(material_pass.to_string())
        })?;
        let mesh = self.meshes.get(info.mesh).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown mesh {:?}", info.mesh))
        })?;
        let Some(target) = material_pass_mut(&mut self.rendergraph, key) else {
            return Err(GraphicsError::Internal(format!(
                "material pass '{material_pass}' has a stale key"
            )));
        };
        let model_matrix_index = self.model_matrices.allocate(info.transform).ok_or_else(|| {
            log::warn!(
                "All {} model matrix slots are in use",
                self.settings.model_matrix_capacity
            );
            GraphicsError::OutOfMemory
        })?;

        let id = RenderableId::from_raw(self.next_renderable_id.fetch_add(1, Ordering::Relaxed));
        let command = RenderCommand {
            renderable_id: id,
            is_visible: info.is_visible,
            model_matrix_index,
        };
        match mesh {
            MeshEntry::Static(mesh) => target.add_static_draw(mesh, command),
            MeshEntry::Procedural(_) => target.add_procedural_draw(info.mesh, command),
        }

        self.renderables.insert(
            id,
            RenderableRecord {
                key,
                mesh: info.mesh,
                model_matrix_index,
            },
        );
        Ok(id)
    }

    /// Change a renderable's transform or visibility.
    pub fn update_renderable(
        &mut self,
        id: RenderableId,
        update: &StaticMeshRenderableUpdateData,
    ) -> Result<(), GraphicsError> {
        let record = *self
            .renderables
            .get(&id)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown {id}")))?;
        if let Some(transform) = update.transform {
            self.model_matrices
                .set(record.model_matrix_index, transform);
        }
        if let Some(is_visible) = update.is_visible {
            if let Some(command) = material_pass_mut(&mut self.rendergraph, record.key)
                .and_then(|pass| pass.command_mut(id))
            {
                command.is_visible = is_visible;
            }
        }
        Ok(())
    }

    /// Stop drawing a renderable. Returns false for unknown ids.
    pub fn remove_renderable(&mut self, id: RenderableId) -> bool {
        let Some(record) = self.renderables.remove(&id) else {
            return false;
        };
        if let Some(pass) = material_pass_mut(&mut self.rendergraph, record.key) {
            pass.remove_renderable(id);
        }
        self.model_matrices.release(record.model_matrix_index);
        true
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Material passes of a pipeline, empty for unknown pipelines.
    pub fn get_material_passes_for_pipeline(&self, pipeline: &str) -> &[MaterialPass] {
        self.find_pipeline(pipeline)
            .map(Pipeline::material_passes)
            .unwrap_or_default()
    }

    pub fn get_renderpass_metadata(&self, renderpass: &str) -> Option<&RenderpassMetadata> {
        self.rendergraph
            .get_by_name(renderpass)
            .map(Renderpass::metadata)
    }

    pub fn find_pipeline(&self, name: &str) -> Option<&Pipeline> {
        let &(renderpass, index) = self.pipeline_locations.get(name)?;
        self.rendergraph.get(renderpass)?.pipelines().get(index)
    }

    /// Names of the loaded pipelines, sorted.
    pub fn pipeline_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pipeline_locations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn material_pass_key(&self, name: &FullMaterialPassName) -> Option<MaterialPassKey> {
        self.material_pass_keys.get(name).copied()
    }

    /// The material pass `key` addresses, if it belongs to the loaded renderpack.
    pub fn material_pass(&self, key: MaterialPassKey) -> Option<&MaterialPass> {
        if key.generation != self.renderpack_generation {
            return None;
        }
        self.rendergraph
            .get(key.renderpass)?
            .pipelines()
            .get(key.pipeline_index)?
            .material_passes()
            .get(key.material_pass_index)
    }

    /// Descriptions of the renderpack's dynamic textures, sorted by name.
    pub fn dynamic_texture_infos(&self) -> Vec<&TextureCreateInfo> {
        self.textures.dynamic_texture_infos()
    }

    pub fn textures(&self) -> &TextureTable {
        &self.textures
    }

    pub fn builtin_buffers(&self) -> &BuiltinBuffers {
        &self.builtin_buffers
    }

    pub fn point_sampler(&self) -> SamplerHandle {
        self.point_sampler
    }

    pub fn rendergraph(&self) -> &Rendergraph {
        &self.rendergraph
    }

    pub fn loaded_renderpack(&self) -> Option<&str> {
        self.loaded_renderpack.as_deref()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Release every GPU object the renderer created and hand back the device.
    pub fn destroy(mut self) -> D {
        if let Err(err) = self.wait_for_frames() {
            log::warn!("Destroying renderer without waiting for the GPU: {err}");
        }
        self.unload_renderpack_objects();
        self.rendergraph.destroy_all(&mut self.device);

        let meshes: Vec<(MeshId, MeshEntry)> = self.meshes.drain().collect();
        log::debug!("Destroying {} meshes", meshes.len());
        for (_, entry) in meshes {
            match entry {
                MeshEntry::Static(mesh) => {
                    self.mesh_memory
                        .destroy_buffer(&mut self.device, mesh.vertex_buffer);
                    self.mesh_memory
                        .destroy_buffer(&mut self.device, mesh.index_buffer);
                }
                MeshEntry::Procedural(mut mesh) => mesh.destroy(
                    &mut self.device,
                    &mut self.mesh_memory,
                    &mut self.procedural_staging_memory,
                ),
            }
        }

        self.textures.destroy_all(&mut self.device);
        for (_, buffer) in self.builtin_buffers.drain() {
            self.uniform_memory
                .destroy_buffer(&mut self.device, buffer);
        }
        self.device.destroy_sampler(self.point_sampler);
        let fences: Vec<_> = self.frame_slots.drain(..).map(|slot| slot.fence).collect();
        self.device.destroy_fences(&fences);

        let Self {
            mut device,
            mesh_memory,
            uniform_memory,
            staging_memory,
            procedural_staging_memory,
            ..
        } = self;
        for memory in [
            mesh_memory,
            uniform_memory,
            staging_memory,
            procedural_staging_memory,
        ] {
            memory.destroy(&mut device);
        }
        log::info!("Renderer destroyed");
        device
    }
}

impl<D: RenderDevice> std::fmt::Debug for Renderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("loaded_renderpack", &self.loaded_renderpack)
            .field("rendergraph", &self.rendergraph)
            .field("meshes", &self.meshes.len())
            .field("renderables", &self.renderables.len())
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

fn material_pass_mut(
    rendergraph: &mut Rendergraph,
    key: MaterialPassKey,
) -> Option<&mut MaterialPass> {
    rendergraph
        .get_mut(key.renderpass)?
        .pipelines_mut()
        .get_mut(key.pipeline_index)?
        .material_passes_mut()
        .get_mut(key.material_pass_index)
}
