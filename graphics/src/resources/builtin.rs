//! Builtin buffers the renderer owns for its whole lifetime.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::backend::RenderDevice;
use crate::error::GraphicsError;
use crate::memory::BufferResource;
use crate::types::BufferHandle;

/// Column-major 4x4 object-to-world matrix.
pub type ModelMatrix = [[f32; 4]; 4];

pub const IDENTITY_MATRIX: ModelMatrix = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Contents of the builtin per-frame uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct PerFrameUniforms {
    pub frame_count: u32,
    pub frame_index: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Buffers materials can bind by name.
#[derive(Debug, Default)]
pub struct BuiltinBuffers {
    buffers: HashMap<String, BufferResource>,
}

impl BuiltinBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, buffer: BufferResource) {
        self.buffers.insert(name.into(), buffer);
    }

    pub fn get(&self, name: &str) -> Option<&BufferResource> {
        self.buffers.get(name)
    }

    pub fn handle(&self, name: &str) -> Option<BufferHandle> {
        self.buffers.get(name).map(|buffer| buffer.handle)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (String, BufferResource)> + '_ {
        self.buffers.drain()
    }
}

/// CPU copy of the model matrix buffer with slot recycling.
///
/// The whole used range is rewritten when any slot changed.
#[derive(Debug)]
pub struct ModelMatrices {
    matrices: Vec<ModelMatrix>,
    free_slots: Vec<u32>,
    capacity: u32,
    dirty: bool,
}

impl ModelMatrices {
    pub fn new(capacity: u32) -> Self {
        Self {
            matrices: Vec::new(),
            free_slots: Vec::new(),
            capacity,
            dirty: false,
        }
    }

    /// Byte size of the GPU buffer holding every slot.
    pub fn buffer_size(&self) -> u64 {
        self.capacity as u64 * std::mem::size_of::<ModelMatrix>() as u64
    }

    /// Store a matrix in a free slot. Returns `None` when every slot is taken.
    pub fn allocate(&mut self, matrix: ModelMatrix) -> Option<u32> {
        let index = match self.free_slots.pop() {
            Some(index) => index,
            None if (self.matrices.len() as u32) < self.capacity => {
                self.matrices.push(IDENTITY_MATRIX);
                self.matrices.len() as u32 - 1
            }
            None => return None,
        };
        self.matrices[index as usize] = matrix;
        self.dirty = true;
        Some(index)
    }

    pub fn set(&mut self, index: u32, matrix: ModelMatrix) {
        if let Some(slot) = self.matrices.get_mut(index as usize) {
            *slot = matrix;
            self.dirty = true;
        }
    }

    pub fn get(&self, index: u32) -> Option<&ModelMatrix> {
        self.matrices.get(index as usize)
    }

    pub fn release(&mut self, index: u32) {
        if (index as usize) < self.matrices.len() && !self.free_slots.contains(&index) {
            self.free_slots.push(index);
        }
    }

    /// Forget every slot.
    pub fn clear(&mut self) {
        self.matrices.clear();
        self.free_slots.clear();
        self.dirty = false;
    }

    pub fn live_count(&self) -> usize {
        self.matrices.len() - self.free_slots.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the used slots to `buffer` if anything changed since the last upload.
    pub fn upload<D: RenderDevice>(
        &mut self,
        device: &mut D,
        buffer: BufferHandle,
    ) -> Result<(), GraphicsError> {
        if !self.dirty {
            return Ok(());
        }
        device.write_data_to_buffer(bytemuck::cast_slice(&self.matrices), buffer)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation(x: f32) -> ModelMatrix {
        let mut matrix = IDENTITY_MATRIX;
        matrix[3][0] = x;
        matrix
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut matrices = ModelMatrices::new(2);
        let a = matrices.allocate(translation(1.0)).unwrap();
        let b = matrices.allocate(translation(2.0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(matrices.allocate(IDENTITY_MATRIX), None);

        matrices.release(a);
        matrices.release(a);
        assert_eq!(matrices.live_count(), 1);
        assert_eq!(matrices.allocate(translation(3.0)), Some(a));
        assert_eq!(matrices.get(a).map(|m| m[3][0]), Some(3.0));
    }

    #[test]
    fn test_per_frame_uniforms_layout() {
        assert_eq!(std::mem::size_of::<PerFrameUniforms>(), 16);
        assert_eq!(ModelMatrices::new(4).buffer_size(), 256);
    }
}
