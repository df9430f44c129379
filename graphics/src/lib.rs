//! # Lumen Graphics
//!
//! Hardware-abstracted real-time rendering core.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`memory`] - Device memory sub-allocation with block and bump strategies
//! - [`backend`] - The [`RenderDevice`] contract backends implement, plus a recording [`DummyDevice`]
//! - [`shader`] - Binding reflection of SPIR-V, WGSL and GLSL stages
//! - [`graph`] - The [`Rendergraph`] of renderpasses and its execution order
//! - [`materials`] - Pipelines, material passes and draw batches
//! - [`Renderer`] - Renderpack loading and frame execution
//!
//! ## Example
//!
//! ```ignore
//! use lumen_graphics::{DummyDevice, Renderer, RendererSettings};
//! use lumen_graphics::types::Extent2d;
//!
//! let device = DummyDevice::new(Extent2d::new(1280, 720));
//! let mut renderer = Renderer::new(device, RendererSettings::default())?;
//! renderer.load_renderpack_data(pack)?;
//! renderer.execute_frame()?;
//! ```

pub mod backend;
pub mod error;
pub mod frame;
pub mod graph;
pub mod materials;
pub mod memory;
pub mod profiling;
pub mod renderer;
pub mod renderpack;
pub mod resources;
pub mod settings;
pub mod shader;
pub mod types;

// Re-export main types for convenience
pub use backend::{CommandList, DummyDevice, RenderDevice};
pub use error::GraphicsError;
pub use frame::FrameContext;
pub use graph::{Renderpass, RenderpassExecutor, RenderpassKey, Rendergraph};
pub use materials::{
    FullMaterialPassName, MaterialPass, Pipeline, RenderableId, StaticMeshRenderableCreateInfo,
    StaticMeshRenderableUpdateData,
};
pub use renderer::{NullUiRenderpass, Renderer};
pub use renderpack::{
    InMemoryRenderpackLoader, MaterialData, MaterialPassData, PipelineCreateInfo,
    RenderPassCreateInfo, RenderpackData, RenderpackLoader, ShaderSource, TextureAttachmentInfo,
    TextureCreateInfo,
};
pub use resources::{FullVertex, MeshData, MeshId};
pub use settings::RendererSettings;

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
