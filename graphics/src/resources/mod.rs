//! Renderer-owned GPU resources.
//!
//! This module contains the resource tables the renderer resolves names
//! against:
//! - [`TextureTable`] - dynamic textures of the loaded renderpack plus builtin images
//! - [`BuiltinBuffers`] - uniform buffers the renderer fills every frame
//! - [`MeshStore`] - static and procedural meshes behind one [`MeshId`] space
//!
//! Tables are arenas keyed by generation-checked ids; a stale id fails the
//! lookup instead of aliasing a newer resource.

mod builtin;
mod mesh;
mod procedural_mesh;
mod textures;

pub use builtin::{BuiltinBuffers, ModelMatrices, ModelMatrix, PerFrameUniforms, IDENTITY_MATRIX};
pub use mesh::{FullVertex, Mesh, MeshData, MeshEntry, MeshId, MeshStore};
pub use procedural_mesh::ProceduralMesh;
pub use textures::{DynamicTexture, TextureId, TextureTable};

/// Name of the presented surface in renderpass outputs.
pub const BACKBUFFER_NAME: &str = "Backbuffer";

/// Builtin render target the 3D passes render into and the UI pass reads.
pub const SCENE_OUTPUT_RT_NAME: &str = "SceneOutput";

/// Builtin uniform buffer holding [`PerFrameUniforms`].
pub const PER_FRAME_DATA_NAME: &str = "PerFrameData";

/// Builtin uniform buffer holding one model matrix per renderable.
pub const MODEL_MATRIX_BUFFER_NAME: &str = "ModelMatrixBuffer";

/// Builtin nearest-neighbour sampler.
pub const POINT_SAMPLER_NAME: &str = "PointSampler";
