//! Material/pipeline binding system.
//!
//! Every pipeline of a renderpack is attached to the renderpass it names and
//! owns the material passes that target it:
//!
//! | Level | Type | Owns |
//! |-------|------|------|
//! | Renderpass | [`Renderpass`](crate::graph::Renderpass) | pipelines |
//! | Pipeline | [`Pipeline`] | backend pipeline, reflected [`PipelineResourceInterface`], material passes |
//! | Material pass | [`MaterialPass`] | descriptor sets, mesh batches |
//!
//! A [`MaterialPassKey`] addresses one material pass by position, so routing a
//! new renderable never resolves names on the hot path.
//!
//! Draws are grouped into batches sharing one vertex/index buffer pair.
//! Procedural meshes get their own batch list because their buffers change
//! with the frame slot.

mod bindings;
mod renderable;

pub use bindings::BindingResources;
pub use renderable::{
    RenderCommand, RenderableId, StaticMeshRenderableCreateInfo, StaticMeshRenderableUpdateData,
};

use std::fmt;

use crate::backend::{CommandList, DescriptorSetWrite, RenderDevice};
use crate::error::GraphicsError;
use crate::frame::FrameContext;
use crate::graph::{RenderpassKey, Renderpass};
use crate::renderpack::{MaterialPassData, PipelineCreateInfo, PipelineKind};
use crate::resources::{Mesh, MeshId};
use crate::shader::PipelineResourceInterface;
use crate::types::{BufferHandle, DescriptorPoolHandle, DescriptorSetHandle, PipelineHandle};

/// Vertices drawn by a global pipeline: one fullscreen triangle.
const FULLSCREEN_TRIANGLE_VERTICES: u32 = 3;

/// `{material name, pass name}`, the public name of a material pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullMaterialPassName {
    pub material_name: String,
    pub pass_name: String,
}

impl FullMaterialPassName {
    pub fn new(material_name: impl Into<String>, pass_name: impl Into<String>) -> Self {
        Self {
            material_name: material_name.into(),
            pass_name: pass_name.into(),
        }
    }
}

impl fmt::Display for FullMaterialPassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.material_name, self.pass_name)
    }
}

/// Position of a material pass: renderpass, pipeline index, material pass index.
///
/// `generation` counts renderpack loads. A key from an earlier load resolves
/// to nothing, even when its positions are taken again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialPassKey {
    pub renderpass: RenderpassKey,
    pub pipeline_index: usize,
    pub material_pass_index: usize,
    pub generation: u64,
}

/// Draws of static meshes sharing one vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshBatch {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub num_indices: u32,
    pub commands: Vec<RenderCommand>,
}

/// Draws of one procedural mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProceduralMeshBatch {
    pub mesh: MeshId,
    pub commands: Vec<RenderCommand>,
}

/// One material's binding of a pipeline's resources.
#[derive(Debug, Clone)]
pub struct MaterialPass {
    name: FullMaterialPassName,
    descriptor_sets: Vec<DescriptorSetHandle>,
    static_mesh_draws: Vec<MeshBatch>,
    procedural_mesh_draws: Vec<ProceduralMeshBatch>,
}

impl MaterialPass {
    /// Allocate descriptor sets for `interface` from `pool` and bind the
    /// material's resources.
    ///
    /// Bindings that do not resolve are logged and left unbound; only pool
    /// exhaustion and backend errors fail the material pass.
    pub fn create<D: RenderDevice>(
        device: &mut D,
        name: FullMaterialPassName,
        data: &MaterialPassData,
        interface: &PipelineResourceInterface,
        pool: DescriptorPoolHandle,
        resources: &BindingResources<'_>,
    ) -> Result<Self, GraphicsError> {
        let descriptor_sets = device.create_descriptor_sets(interface, pool)?;

        let mut writes = Vec::with_capacity(data.bindings.len());
        for (binding, resource) in &data.bindings {
            let Some(description) = interface.get(binding) else {
                log::error!(
                    "Material pass '{name}' binds '{binding}', which pipeline '{}' does not declare",
                    data.pipeline
                );
                continue;
            };
            let Some(&set) = descriptor_sets.get(description.set as usize) else {
                continue;
            };
            match resources.resolve(binding, description, resource) {
                Ok(resource) => writes.push(DescriptorSetWrite {
                    set,
                    binding: description.binding,
                    resource,
                }),
                Err(err) => log::error!("Material pass '{name}': {err}"),
            }
        }
        for (binding, _) in interface.iter() {
            if !data.bindings.contains_key(binding) {
                log::debug!("Material pass '{name}' leaves '{binding}' unbound");
            }
        }
        device.update_descriptor_sets(&writes);

        log::debug!(
            "Created material pass '{name}' ({} descriptor sets, {} bindings)",
            descriptor_sets.len(),
            writes.len()
        );
        Ok(Self {
            name,
            descriptor_sets,
            static_mesh_draws: Vec::new(),
            procedural_mesh_draws: Vec::new(),
        })
    }

    pub fn name(&self) -> &FullMaterialPassName {
        &self.name
    }

    pub fn descriptor_sets(&self) -> &[DescriptorSetHandle] {
        &self.descriptor_sets
    }

    pub fn static_mesh_draws(&self) -> &[MeshBatch] {
        &self.static_mesh_draws
    }

    pub fn procedural_mesh_draws(&self) -> &[ProceduralMeshBatch] {
        &self.procedural_mesh_draws
    }

    /// Append a draw to the batch sharing the mesh's vertex buffer, or start one.
    pub fn add_static_draw(&mut self, mesh: &Mesh, command: RenderCommand) {
        let vertex_buffer = mesh.vertex_buffer_handle();
        match self
            .static_mesh_draws
            .iter_mut()
            .find(|batch| batch.vertex_buffer == vertex_buffer)
        {
            Some(batch) => batch.commands.push(command),
            None => self.static_mesh_draws.push(MeshBatch {
                vertex_buffer,
                index_buffer: mesh.index_buffer_handle(),
                num_indices: mesh.num_indices,
                commands: vec![command],
            }),
        }
    }

    /// Append a draw to the batch of a procedural mesh, or start one.
    pub fn add_procedural_draw(&mut self, mesh: MeshId, command: RenderCommand) {
        match self
            .procedural_mesh_draws
            .iter_mut()
            .find(|batch| batch.mesh == mesh)
        {
            Some(batch) => batch.commands.push(command),
            None => self.procedural_mesh_draws.push(ProceduralMeshBatch {
                mesh,
                commands: vec![command],
            }),
        }
    }

    pub fn command_mut(&mut self, id: RenderableId) -> Option<&mut RenderCommand> {
        self.static_mesh_draws
            .iter_mut()
            .flat_map(|batch| batch.commands.iter_mut())
            .chain(
                self.procedural_mesh_draws
                    .iter_mut()
                    .flat_map(|batch| batch.commands.iter_mut()),
            )
            .find(|command| command.renderable_id == id)
    }

    /// Remove a renderable's draw. Batches left empty are dropped.
    pub fn remove_renderable(&mut self, id: RenderableId) -> bool {
        let mut removed = false;
        for batch in &mut self.static_mesh_draws {
            let before = batch.commands.len();
            batch.commands.retain(|command| command.renderable_id != id);
            removed |= batch.commands.len() != before;
        }
        for batch in &mut self.procedural_mesh_draws {
            let before = batch.commands.len();
            batch.commands.retain(|command| command.renderable_id != id);
            removed |= batch.commands.len() != before;
        }
        self.static_mesh_draws
            .retain(|batch| !batch.commands.is_empty());
        self.procedural_mesh_draws
            .retain(|batch| !batch.commands.is_empty());
        removed
    }

    pub fn draw_count(&self) -> usize {
        self.static_mesh_draws
            .iter()
            .map(|batch| batch.commands.len())
            .chain(
                self.procedural_mesh_draws
                    .iter()
                    .map(|batch| batch.commands.len()),
            )
            .sum()
    }
}

/// A backend pipeline attached to a renderpass.
#[derive(Debug, Clone)]
pub struct Pipeline {
    data: PipelineCreateInfo,
    handle: PipelineHandle,
    interface: PipelineResourceInterface,
    material_passes: Vec<MaterialPass>,
}

impl Pipeline {
    /// Create the backend pipeline for `renderpass`.
    pub fn create<D: RenderDevice>(
        device: &mut D,
        data: PipelineCreateInfo,
        interface: PipelineResourceInterface,
        renderpass: &Renderpass,
    ) -> Result<Self, GraphicsError> {
        let handle = match data.kind {
            PipelineKind::Surface => {
                device.create_surface_pipeline(&data, renderpass.handle(), &interface)?
            }
            PipelineKind::Global => {
                device.create_global_pipeline(&data, renderpass.handle(), &interface)?
            }
        };
        log::debug!(
            "Created {:?} pipeline '{}' for renderpass '{}'",
            data.kind,
            data.name,
            renderpass.name()
        );
        Ok(Self {
            data,
            handle,
            interface,
            material_passes: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn data(&self) -> &PipelineCreateInfo {
        &self.data
    }

    pub fn kind(&self) -> PipelineKind {
        self.data.kind
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn interface(&self) -> &PipelineResourceInterface {
        &self.interface
    }

    pub fn material_passes(&self) -> &[MaterialPass] {
        &self.material_passes
    }

    pub fn material_passes_mut(&mut self) -> &mut [MaterialPass] {
        &mut self.material_passes
    }

    /// Attach a material pass and return its index within the pipeline.
    pub fn add_material_pass(&mut self, material_pass: MaterialPass) -> usize {
        self.material_passes.push(material_pass);
        self.material_passes.len() - 1
    }
}

/// Record every pipeline of `pass` with the visible draws of its material passes.
///
/// Surface pipelines draw each visible command of each batch. Global
/// pipelines draw one fullscreen triangle per material pass.
pub fn draw_material_batches(
    pass: &Renderpass,
    cmds: &mut dyn CommandList,
    ctx: &FrameContext<'_>,
) {
    for pipeline in pass.pipelines() {
        if pipeline.material_passes.is_empty() {
            continue;
        }
        cmds.bind_pipeline(pipeline.handle);

        for material_pass in &pipeline.material_passes {
            if !material_pass.descriptor_sets.is_empty() {
                cmds.bind_descriptor_sets(&material_pass.descriptor_sets, &pipeline.interface);
            }

            if pipeline.kind() == PipelineKind::Global {
                cmds.draw(FULLSCREEN_TRIANGLE_VERTICES, 1);
                continue;
            }

            for batch in &material_pass.static_mesh_draws {
                draw_batch(
                    cmds,
                    batch.vertex_buffer,
                    batch.index_buffer,
                    batch.num_indices,
                    &batch.commands,
                );
            }

            for batch in &material_pass.procedural_mesh_draws {
                let Some(mesh) = ctx.meshes.get_procedural(batch.mesh) else {
                    log::warn!("Skipping draws of missing procedural mesh {:?}", batch.mesh);
                    continue;
                };
                let Some((vertex_buffer, index_buffer)) = mesh.buffers_for_frame(ctx.frame_slot())
                else {
                    continue;
                };
                draw_batch(
                    cmds,
                    vertex_buffer,
                    index_buffer,
                    mesh.num_indices(),
                    &batch.commands,
                );
            }
        }
    }
}

fn draw_batch(
    cmds: &mut dyn CommandList,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    num_indices: u32,
    commands: &[RenderCommand],
) {
    if num_indices == 0 || !commands.iter().any(|command| command.is_visible) {
        return;
    }
    cmds.bind_vertex_buffers(&[vertex_buffer]);
    cmds.bind_index_buffer(index_buffer);
    for (first_instance, num_instances) in instance_runs(commands) {
        cmds.draw_indexed_mesh(num_indices, num_instances, first_instance);
    }
}

/// Group visible commands into runs of consecutive model matrix slots.
///
/// Each run becomes one instanced draw starting at the run's first slot.
fn instance_runs(commands: &[RenderCommand]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for command in commands.iter().filter(|command| command.is_visible) {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == command.model_matrix_index => {
                *count += 1;
            }
            _ => runs.push((command.model_matrix_index, 1)),
        }
    }
    runs
}
