//! Shader stages and binding reflection.
//!
//! Pipelines never carry hand-written binding layouts. Instead every stage
//! binary is reflected with naga and the per-stage bindings are merged into a
//! [`PipelineResourceInterface`]:
//!
//! ```ignore
//! use lumen_graphics::shader::{build_pipeline_interface, ArrayBoundPolicy};
//!
//! let interface = build_pipeline_interface(&pipeline_info, ArrayBoundPolicy::default())?;
//! let globals = interface.get("Globals").expect("declared by the fragment shader");
//! assert_eq!((globals.set, globals.binding), (0, 0));
//! ```

mod reflection;

pub use reflection::{
    build_pipeline_interface, reflect_shader, ArrayBoundPolicy, PipelineResourceInterface,
    ResourceBindingDescription, ResourceKind,
};

/// Shader stage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// The stage flag for this stage.
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::TessellationControl => ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessellationEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
            Self::Fragment => ShaderStageFlags::FRAGMENT,
            Self::Compute => ShaderStageFlags::COMPUTE,
        }
    }
}

bitflags::bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Tessellation control shader stage.
        const TESSELLATION_CONTROL = 1 << 1;
        /// Tessellation evaluation shader stage.
        const TESSELLATION_EVALUATION = 1 << 2;
        /// Geometry shader stage.
        const GEOMETRY = 1 << 3;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 4;
        /// Compute shader stage.
        const COMPUTE = 1 << 5;
    }
}
