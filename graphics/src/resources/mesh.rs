//! Static and procedural mesh storage.

use bytemuck::{Pod, Zeroable};
use slotmap::SlotMap;

use crate::memory::BufferResource;
use crate::types::BufferHandle;

use super::ProceduralMesh;

slotmap::new_key_type! {
    /// Id of a mesh in a [`MeshStore`]. Static and procedural meshes share one id space.
    pub struct MeshId;
}

/// The vertex layout every static mesh uses.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FullVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub main_uv: [f32; 2],
    pub secondary_uv: [f32; 2],
    pub virtual_texture_id: u32,
    pub additional_stuff: [f32; 4],
}

impl FullVertex {
    /// A vertex with only a position set.
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// CPU-side geometry of a static mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertex_data: Vec<FullVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertex_data: Vec<FullVertex>, indices: Vec<u32>) -> Self {
        Self {
            vertex_data,
            indices,
        }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertex_data)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// An uploaded, immutable mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    pub vertex_buffer: BufferResource,
    pub index_buffer: BufferResource,
    pub num_indices: u32,
}

impl Mesh {
    pub fn vertex_buffer_handle(&self) -> BufferHandle {
        self.vertex_buffer.handle
    }

    pub fn index_buffer_handle(&self) -> BufferHandle {
        self.index_buffer.handle
    }
}

/// Either kind of mesh.
#[derive(Debug)]
pub enum MeshEntry {
    Static(Mesh),
    Procedural(ProceduralMesh),
}

/// Arena of every mesh the renderer owns.
#[derive(Debug, Default)]
pub struct MeshStore {
    meshes: SlotMap<MeshId, MeshEntry>,
}

impl MeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_static(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.insert(MeshEntry::Static(mesh))
    }

    pub fn insert_procedural(&mut self, mesh: ProceduralMesh) -> MeshId {
        self.meshes.insert(MeshEntry::Procedural(mesh))
    }

    pub fn get(&self, id: MeshId) -> Option<&MeshEntry> {
        self.meshes.get(id)
    }

    pub fn get_static(&self, id: MeshId) -> Option<&Mesh> {
        match self.meshes.get(id) {
            Some(MeshEntry::Static(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn get_procedural(&self, id: MeshId) -> Option<&ProceduralMesh> {
        match self.meshes.get(id) {
            Some(MeshEntry::Procedural(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn get_procedural_mut(&mut self, id: MeshId) -> Option<&mut ProceduralMesh> {
        match self.meshes.get_mut(id) {
            Some(MeshEntry::Procedural(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn procedural_meshes_mut(&mut self) -> impl Iterator<Item = (MeshId, &mut ProceduralMesh)> {
        self.meshes.iter_mut().filter_map(|(id, entry)| match entry {
            MeshEntry::Procedural(mesh) => Some((id, mesh)),
            MeshEntry::Static(_) => None,
        })
    }

    pub fn remove(&mut self, id: MeshId) -> Option<MeshEntry> {
        self.meshes.remove(id)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (MeshId, MeshEntry)> + '_ {
        self.meshes.drain()
    }

    /// Reserve room for `additional` more meshes.
    pub fn reserve(&mut self, additional: usize) {
        self.meshes.reserve(additional);
    }

    pub fn capacity(&self) -> usize {
        self.meshes.capacity()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
