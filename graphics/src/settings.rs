//! Renderer configuration.

use crate::shader::ArrayBoundPolicy;

const MIB: u64 = 1024 * 1024;

/// Settings fixed at renderer creation.
///
/// ```ignore
/// let settings = RendererSettings::default()
///     .with_mesh_memory_size(64 * 1024 * 1024)
///     .with_renderpack("forward");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Device-local memory for static and procedural mesh buffers (block strategy).
    pub mesh_memory_size: u64,
    pub mesh_alignment: u64,
    /// Host-visible memory for builtin uniform buffers (bump strategy).
    pub uniform_memory_size: u64,
    /// Alignment of uniform buffers, one 4x4 float matrix.
    pub uniform_alignment: u64,
    /// Staging memory for static mesh uploads (bump strategy, reset after each upload).
    pub staging_memory_size: u64,
    /// Staging memory for procedural mesh uploads (block strategy).
    pub procedural_staging_memory_size: u64,
    /// Number of renderables that can hold a model matrix.
    pub model_matrix_capacity: u32,
    pub array_bound_policy: ArrayBoundPolicy,
    /// Renderpack loaded once a loader is installed with
    /// [`Renderer::set_renderpack_loader`](crate::Renderer::set_renderpack_loader).
    pub renderpack: Option<String>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            mesh_memory_size: 512 * MIB,
            mesh_alignment: 64,
            uniform_memory_size: 8 * MIB,
            uniform_alignment: 64,
            staging_memory_size: 256 * 1024,
            procedural_staging_memory_size: 16 * MIB,
            model_matrix_capacity: 0xFFFF,
            array_bound_policy: ArrayBoundPolicy::default(),
            renderpack: None,
        }
    }
}

impl RendererSettings {
    pub fn with_mesh_memory_size(mut self, size: u64) -> Self {
        self.mesh_memory_size = size;
        self
    }

    pub fn with_uniform_memory_size(mut self, size: u64) -> Self {
        self.uniform_memory_size = size;
        self
    }

    pub fn with_staging_memory_size(mut self, size: u64) -> Self {
        self.staging_memory_size = size;
        self
    }

    pub fn with_procedural_staging_memory_size(mut self, size: u64) -> Self {
        self.procedural_staging_memory_size = size;
        self
    }

    pub fn with_model_matrix_capacity(mut self, capacity: u32) -> Self {
        self.model_matrix_capacity = capacity;
        self
    }

    pub fn with_array_bound_policy(mut self, policy: ArrayBoundPolicy) -> Self {
        self.array_bound_policy = policy;
        self
    }

    pub fn with_renderpack(mut self, name: impl Into<String>) -> Self {
        self.renderpack = Some(name.into());
        self
    }

    /// Settings small enough for tests and tools without a real GPU.
    pub fn small() -> Self {
        Self {
            mesh_memory_size: 4 * MIB,
            uniform_memory_size: MIB,
            staging_memory_size: 256 * 1024,
            procedural_staging_memory_size: MIB,
            model_matrix_capacity: 1024,
            ..Self::default()
        }
    }
}
