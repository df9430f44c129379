//! Renderables and the per-draw data batches store.

use crate::resources::{MeshId, ModelMatrix, IDENTITY_MATRIX};

/// Id handed to the host for a registered renderable.
///
/// Used only to find the renderable again, never for draw ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(u64);

impl RenderableId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RenderableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "renderable #{}", self.0)
    }
}

/// Parameters of a new static mesh renderable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticMeshRenderableCreateInfo {
    pub mesh: MeshId,
    pub transform: ModelMatrix,
    pub is_visible: bool,
}

impl StaticMeshRenderableCreateInfo {
    /// A visible renderable at the origin.
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            transform: IDENTITY_MATRIX,
            is_visible: true,
        }
    }

    pub fn with_transform(mut self, transform: ModelMatrix) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_visibility(mut self, is_visible: bool) -> Self {
        self.is_visible = is_visible;
        self
    }
}

/// Changes to apply to a renderable. `None` fields are left as they are.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StaticMeshRenderableUpdateData {
    pub transform: Option<ModelMatrix>,
    pub is_visible: Option<bool>,
}

/// Per-draw data stored in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCommand {
    pub renderable_id: RenderableId,
    pub is_visible: bool,
    /// Slot of the model matrix buffer holding the transform.
    pub model_matrix_index: u32,
}
