//! Meshes whose geometry is rewritten from the CPU every frame.

use bytemuck::Pod;

use crate::backend::{CommandList, RenderDevice};
use crate::error::GraphicsError;
use crate::memory::{BufferResource, DeviceMemoryResource};
use crate::types::{
    BufferDescriptor, BufferHandle, BufferUsage, PipelineStageFlags, ResourceBarrier,
    ResourceState,
};

const BUFFER_ALIGNMENT: u64 = 16;

/// Buffers backing one frame slot of a procedural mesh.
#[derive(Debug, Clone, Copy)]
struct FrameBuffers {
    vertex: BufferResource,
    index: BufferResource,
    staging_vertex: BufferResource,
    staging_index: BufferResource,
    uploaded_generation: Option<u64>,
}

/// A vertex/index buffer pair filled through a staging copy every frame.
///
/// Every frame slot gets its own device and staging buffers, so a slot can
/// be rewritten while the GPU still reads the previous one.
#[derive(Debug)]
pub struct ProceduralMesh {
    vertex_size: u64,
    index_size: u64,
    vertex_data: Vec<u8>,
    index_data: Vec<u32>,
    generation: u64,
    frames: Vec<FrameBuffers>,
}

impl ProceduralMesh {
    /// Create buffers for `slot_count` frame slots.
    ///
    /// Device buffers come from `mesh_memory`, staging buffers from
    /// `staging_memory`. Everything allocated so far is released again if
    /// one of the allocations fails.
    pub fn new<D: RenderDevice>(
        device: &mut D,
        mesh_memory: &mut DeviceMemoryResource,
        staging_memory: &mut DeviceMemoryResource,
        vertex_size: u64,
        index_size: u64,
        slot_count: usize,
    ) -> Result<Self, GraphicsError> {
        if vertex_size == 0 || index_size == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "procedural mesh needs non-zero buffer sizes, got {vertex_size} and {index_size}"
            )));
        }

        let mut mesh = Self {
            vertex_size,
            index_size,
            vertex_data: Vec::new(),
            index_data: Vec::new(),
            generation: 0,
            frames: Vec::with_capacity(slot_count),
        };
        for slot in 0..slot_count {
            match Self::create_frame_buffers(
                device,
                mesh_memory,
                staging_memory,
                vertex_size,
                index_size,
                slot,
            ) {
                Ok(buffers) => mesh.frames.push(buffers),
                Err(err) => {
                    mesh.destroy(device, mesh_memory, staging_memory);
                    return Err(err);
                }
            }
        }
        Ok(mesh)
    }

    fn create_frame_buffers<D: RenderDevice>(
        device: &mut D,
        mesh_memory: &mut DeviceMemoryResource,
        staging_memory: &mut DeviceMemoryResource,
        vertex_size: u64,
        index_size: u64,
        slot: usize,
    ) -> Result<FrameBuffers, GraphicsError> {
        let mut created: Vec<(bool, BufferResource)> = Vec::with_capacity(4);
        let requests = [
            (false, vertex_size, BufferUsage::VERTEX | BufferUsage::COPY_DST, "vertex"),
            (false, index_size, BufferUsage::INDEX | BufferUsage::COPY_DST, "index"),
            (true, vertex_size, BufferUsage::COPY_SRC, "staging vertex"),
            (true, index_size, BufferUsage::COPY_SRC, "staging index"),
        ];
        for (is_staging, size, usage, label) in requests {
            let descriptor = BufferDescriptor::new(size, usage)
                .with_label(format!("procedural {label} buffer {slot}"));
            let memory = if is_staging {
                &mut *staging_memory
            } else {
                &mut *mesh_memory
            };
            match memory.create_buffer(device, &descriptor, BUFFER_ALIGNMENT) {
                Ok(buffer) => created.push((is_staging, buffer)),
                Err(err) => {
                    for (is_staging, buffer) in created {
                        if is_staging {
                            staging_memory.destroy_buffer(device, buffer);
                        } else {
                            mesh_memory.destroy_buffer(device, buffer);
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok(FrameBuffers {
            vertex: created[0].1,
            index: created[1].1,
            staging_vertex: created[2].1,
            staging_index: created[3].1,
            uploaded_generation: None,
        })
    }

    /// Replace the vertex data uploaded from the next frame on.
    pub fn set_vertex_data<T: Pod>(&mut self, vertices: &[T]) -> Result<(), GraphicsError> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        if bytes.len() as u64 > self.vertex_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes of vertex data exceed the procedural mesh size of {}",
                bytes.len(),
                self.vertex_size
            )));
        }
        self.vertex_data.clear();
        self.vertex_data.extend_from_slice(bytes);
        self.generation += 1;
        Ok(())
    }

    /// Replace the index data uploaded from the next frame on.
    pub fn set_index_data(&mut self, indices: &[u32]) -> Result<(), GraphicsError> {
        let size = std::mem::size_of_val(indices) as u64;
        if size > self.index_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "{size} bytes of index data exceed the procedural mesh size of {}",
                self.index_size
            )));
        }
        self.index_data.clear();
        self.index_data.extend_from_slice(indices);
        self.generation += 1;
        Ok(())
    }

    pub fn num_indices(&self) -> u32 {
        self.index_data.len() as u32
    }

    pub fn vertex_size(&self) -> u64 {
        self.vertex_size
    }

    pub fn index_size(&self) -> u64 {
        self.index_size
    }

    /// Vertex and index buffer to draw from in the given frame slot.
    pub fn buffers_for_frame(&self, slot: usize) -> Option<(BufferHandle, BufferHandle)> {
        self.frames
            .get(slot)
            .map(|frame| (frame.vertex.handle, frame.index.handle))
    }

    /// Whether the slot still has to receive the current CPU data.
    pub fn needs_upload(&self, slot: usize) -> bool {
        self.frames
            .get(slot)
            .is_some_and(|frame| frame.uploaded_generation != Some(self.generation))
    }

    /// Write the CPU data to the slot's staging buffers and record the copies
    /// into the slot's device buffers.
    ///
    /// Slots that already hold the current data record nothing.
    pub fn record_upload<D: RenderDevice, C: CommandList + ?Sized>(
        &mut self,
        device: &mut D,
        cmds: &mut C,
        slot: usize,
    ) -> Result<(), GraphicsError> {
        if !self.needs_upload(slot) {
            return Ok(());
        }
        let generation = self.generation;
        let Some(frame) = self.frames.get_mut(slot) else {
            return Ok(());
        };

        let index_bytes: &[u8] = bytemuck::cast_slice(&self.index_data);
        device.write_data_to_buffer(&self.vertex_data, frame.staging_vertex.handle)?;
        device.write_data_to_buffer(index_bytes, frame.staging_index.handle)?;

        let to_copy = [
            ResourceBarrier::buffer(
                frame.vertex.handle,
                frame.vertex.size,
                ResourceState::VertexOrIndexBuffer,
                ResourceState::CopyDestination,
            ),
            ResourceBarrier::buffer(
                frame.index.handle,
                frame.index.size,
                ResourceState::VertexOrIndexBuffer,
                ResourceState::CopyDestination,
            ),
        ];
        cmds.resource_barriers(
            PipelineStageFlags::VERTEX_INPUT,
            PipelineStageFlags::TRANSFER,
            &to_copy,
        );

        if !self.vertex_data.is_empty() {
            cmds.copy_buffer(
                frame.vertex.handle,
                0,
                frame.staging_vertex.handle,
                0,
                self.vertex_data.len() as u64,
            );
        }
        if !index_bytes.is_empty() {
            cmds.copy_buffer(
                frame.index.handle,
                0,
                frame.staging_index.handle,
                0,
                index_bytes.len() as u64,
            );
        }

        let to_draw = to_copy.map(|barrier| ResourceBarrier {
            old_state: barrier.new_state,
            new_state: barrier.old_state,
            ..barrier
        });
        cmds.resource_barriers(
            PipelineStageFlags::TRANSFER,
            PipelineStageFlags::VERTEX_INPUT,
            &to_draw,
        );

        frame.uploaded_generation = Some(generation);
        Ok(())
    }

    /// Release every buffer of every slot.
    pub fn destroy<D: RenderDevice>(
        &mut self,
        device: &mut D,
        mesh_memory: &mut DeviceMemoryResource,
        staging_memory: &mut DeviceMemoryResource,
    ) {
        for frame in self.frames.drain(..) {
            mesh_memory.destroy_buffer(device, frame.vertex);
            mesh_memory.destroy_buffer(device, frame.index);
            staging_memory.destroy_buffer(device, frame.staging_vertex);
            staging_memory.destroy_buffer(device, frame.staging_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyCommandList, DummyDevice, RecordedCommand};
    use crate::memory::BlockAllocationStrategy;
    use crate::types::{Extent2d, MemoryUsage};

    struct Fixture {
        device: DummyDevice,
        mesh_memory: DeviceMemoryResource,
        staging_memory: DeviceMemoryResource,
    }

    fn fixture() -> Fixture {
        let mut device = DummyDevice::new(Extent2d::new(64, 64));
        let mesh_memory = DeviceMemoryResource::new(
            &mut device,
            "mesh",
            MemoryUsage::DeviceOnly,
            Box::new(BlockAllocationStrategy::new(64 * 1024)),
        )
        .unwrap();
        let staging_memory = DeviceMemoryResource::new(
            &mut device,
            "staging",
            MemoryUsage::StagingBuffer,
            Box::new(BlockAllocationStrategy::new(64 * 1024)),
        )
        .unwrap();
        Fixture {
            device,
            mesh_memory,
            staging_memory,
        }
    }

    #[test]
    fn test_oversized_data_is_rejected() {
        let mut f = fixture();
        let mut mesh = ProceduralMesh::new(
            &mut f.device,
            &mut f.mesh_memory,
            &mut f.staging_memory,
            16,
            8,
            2,
        )
        .unwrap();

        assert!(mesh.set_vertex_data(&[0.0f32; 4]).is_ok());
        assert!(matches!(
            mesh.set_vertex_data(&[0.0f32; 5]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(mesh.set_index_data(&[0, 1]).is_ok());
        assert!(mesh.set_index_data(&[0, 1, 2]).is_err());
        assert_eq!(mesh.num_indices(), 2);
    }

    #[test]
    fn test_upload_records_copies_once_per_slot() {
        let mut f = fixture();
        let mut mesh = ProceduralMesh::new(
            &mut f.device,
            &mut f.mesh_memory,
            &mut f.staging_memory,
            64,
            64,
            2,
        )
        .unwrap();
        mesh.set_vertex_data(&[1.0f32, 2.0, 3.0]).unwrap();
        mesh.set_index_data(&[0, 1, 2]).unwrap();

        let mut cmds = DummyCommandList::default();
        mesh.record_upload(&mut f.device, &mut cmds, 0).unwrap();
        let copies = cmds
            .commands
            .iter()
            .filter(|command| matches!(command, RecordedCommand::CopyBuffer { .. }))
            .count();
        assert_eq!(copies, 2);
        assert!(!mesh.needs_upload(0));
        assert!(mesh.needs_upload(1));

        let recorded = cmds.commands.len();
        mesh.record_upload(&mut f.device, &mut cmds, 0).unwrap();
        assert_eq!(cmds.commands.len(), recorded);

        let (vertex, _) = mesh.buffers_for_frame(0).unwrap();
        assert_ne!(Some(vertex), mesh.buffers_for_frame(1).map(|(v, _)| v));
    }

    #[test]
    fn test_staging_contents_match_cpu_data() {
        let mut f = fixture();
        let mut mesh = ProceduralMesh::new(
            &mut f.device,
            &mut f.mesh_memory,
            &mut f.staging_memory,
            16,
            16,
            1,
        )
        .unwrap();
        mesh.set_index_data(&[7, 8]).unwrap();
        let mut cmds = DummyCommandList::default();
        mesh.record_upload(&mut f.device, &mut cmds, 0).unwrap();

        let staging = mesh.frames[0].staging_index.handle;
        let contents = f.device.buffer_contents(staging).unwrap();
        assert_eq!(&contents[..8], bytemuck::cast_slice::<u32, u8>(&[7, 8]));
    }

    #[test]
    fn test_destroy_releases_every_buffer() {
        let mut f = fixture();
        let mut mesh = ProceduralMesh::new(
            &mut f.device,
            &mut f.mesh_memory,
            &mut f.staging_memory,
            32,
            32,
            3,
        )
        .unwrap();
        assert_eq!(f.device.live_buffer_count(), 12);
        mesh.destroy(&mut f.device, &mut f.mesh_memory, &mut f.staging_memory);
        assert_eq!(f.device.live_buffer_count(), 0);
        assert_eq!(f.mesh_memory.free_space(), f.mesh_memory.capacity());
    }
}
