//! Renderpack description consumed by the renderer.
//!
//! A renderpack is the declarative bundle of passes, pipelines, materials and
//! dynamic textures that describes one complete rendering configuration.
//! Parsing renderpack files is the loader's job; the renderer only consumes
//! the fully parsed [`RenderpackData`] snapshot produced by a
//! [`RenderpackLoader`].
//!
//! # Example
//!
//! ```ignore
//! let pack = RenderpackData::new("default")
//!     .with_texture(TextureCreateInfo::render_target(
//!         "sceneColor",
//!         TextureFormat::Rgba8Unorm,
//!         TextureSize::Absolute { width: 512, height: 512 },
//!     ))
//!     .with_pass(
//!         RenderPassCreateInfo::new("Forward")
//!             .with_output(TextureAttachmentInfo::new("sceneColor", TextureFormat::Rgba8Unorm)),
//!     );
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::error::GraphicsError;
use crate::resources::BACKBUFFER_NAME;
use crate::shader::ShaderStage;
use crate::types::{Extent2d, PrimitiveTopology, TextureFormat};

/// One complete rendering configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderpackData {
    pub name: String,
    /// Renderpasses in declaration order.
    pub passes: Vec<RenderPassCreateInfo>,
    pub pipelines: Vec<PipelineCreateInfo>,
    pub materials: Vec<MaterialData>,
    pub textures: Vec<TextureCreateInfo>,
}

impl RenderpackData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_pass(mut self, pass: RenderPassCreateInfo) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineCreateInfo) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn with_material(mut self, material: MaterialData) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_texture(mut self, texture: TextureCreateInfo) -> Self {
        self.textures.push(texture);
        self
    }
}

// ============================================================================
// Renderpasses
// ============================================================================

/// A color or depth attachment written by a renderpass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureAttachmentInfo {
    /// Name of the dynamic texture, builtin image or [`BACKBUFFER_NAME`].
    pub name: String,
    pub pixel_format: TextureFormat,
    /// Clear the attachment when the pass begins.
    pub clear: bool,
}

impl TextureAttachmentInfo {
    pub fn new(name: impl Into<String>, pixel_format: TextureFormat) -> Self {
        Self {
            name: name.into(),
            pixel_format,
            clear: false,
        }
    }

    pub fn with_clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }
}

/// Declarative description of one renderpass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassCreateInfo {
    /// Unique name of the pass.
    pub name: String,
    /// Textures sampled by the pass, in declaration order.
    pub texture_inputs: Vec<String>,
    /// Color attachments, in declaration order.
    pub texture_outputs: Vec<TextureAttachmentInfo>,
    pub depth_texture: Option<TextureAttachmentInfo>,
}

impl RenderPassCreateInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, texture: impl Into<String>) -> Self {
        self.texture_inputs.push(texture.into());
        self
    }

    pub fn with_output(mut self, attachment: TextureAttachmentInfo) -> Self {
        self.texture_outputs.push(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: TextureAttachmentInfo) -> Self {
        self.depth_texture = Some(attachment);
        self
    }

    /// Returns true if any color output is the presented surface.
    pub fn writes_to_backbuffer(&self) -> bool {
        self.texture_outputs
            .iter()
            .any(|output| output.name == BACKBUFFER_NAME)
    }

    /// Names of every texture this pass writes, depth included.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.texture_outputs
            .iter()
            .chain(self.depth_texture.iter())
            .map(|attachment| attachment.name.as_str())
    }
}

// ============================================================================
// Pipelines
// ============================================================================

/// Whether a pipeline draws renderables or runs once per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineKind {
    /// Draws the mesh batches of its material passes.
    #[default]
    Surface,
    /// Draws without per-object geometry, e.g. fullscreen post processing.
    Global,
}

/// A compiled or source shader as delivered by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderBinary {
    /// SPIR-V words.
    SpirV(Vec<u32>),
    /// WGSL source.
    Wgsl(String),
    /// GLSL source.
    Glsl(String),
}

/// A shader stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// Path the loader read the shader from, used in diagnostics.
    pub filename: String,
    pub binary: ShaderBinary,
}

impl ShaderSource {
    pub fn spirv(filename: impl Into<String>, words: Vec<u32>) -> Self {
        Self {
            filename: filename.into(),
            binary: ShaderBinary::SpirV(words),
        }
    }

    pub fn wgsl(filename: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            binary: ShaderBinary::Wgsl(source.into()),
        }
    }

    pub fn glsl(filename: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            binary: ShaderBinary::Glsl(source.into()),
        }
    }
}

/// Declarative description of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineCreateInfo {
    pub name: String,
    /// Name of the renderpass this pipeline renders in.
    pub pass: String,
    pub kind: PipelineKind,
    pub vertex_shader: ShaderSource,
    pub tessellation_control_shader: Option<ShaderSource>,
    pub tessellation_evaluation_shader: Option<ShaderSource>,
    pub geometry_shader: Option<ShaderSource>,
    pub fragment_shader: Option<ShaderSource>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub topology: PrimitiveTopology,
}

impl PipelineCreateInfo {
    pub fn new(
        name: impl Into<String>,
        pass: impl Into<String>,
        vertex_shader: ShaderSource,
    ) -> Self {
        Self {
            name: name.into(),
            pass: pass.into(),
            kind: PipelineKind::Surface,
            vertex_shader,
            tessellation_control_shader: None,
            tessellation_evaluation_shader: None,
            geometry_shader: None,
            fragment_shader: None,
            depth_test: true,
            depth_write: true,
            topology: PrimitiveTopology::Triangles,
        }
    }

    pub fn with_kind(mut self, kind: PipelineKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_fragment_shader(mut self, shader: ShaderSource) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn with_geometry_shader(mut self, shader: ShaderSource) -> Self {
        self.geometry_shader = Some(shader);
        self
    }

    pub fn with_tessellation_shaders(
        mut self,
        control: ShaderSource,
        evaluation: ShaderSource,
    ) -> Self {
        self.tessellation_control_shader = Some(control);
        self.tessellation_evaluation_shader = Some(evaluation);
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    /// Every present stage in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, &ShaderSource)> {
        [
            (ShaderStage::Vertex, Some(&self.vertex_shader)),
            (
                ShaderStage::TessellationControl,
                self.tessellation_control_shader.as_ref(),
            ),
            (
                ShaderStage::TessellationEvaluation,
                self.tessellation_evaluation_shader.as_ref(),
            ),
            (ShaderStage::Geometry, self.geometry_shader.as_ref()),
            (ShaderStage::Fragment, self.fragment_shader.as_ref()),
        ]
        .into_iter()
        .filter_map(|(stage, source)| source.map(|source| (stage, source)))
    }
}

// ============================================================================
// Materials
// ============================================================================

/// One pass of a material: a pipeline plus the resources bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MaterialPassData {
    pub name: String,
    pub material_name: String,
    /// Name of the pipeline this pass binds resources for.
    pub pipeline: String,
    /// Shader binding name to resource name.
    pub bindings: BTreeMap<String, String>,
}

impl MaterialPassData {
    pub fn new(
        material_name: impl Into<String>,
        name: impl Into<String>,
        pipeline: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            material_name: material_name.into(),
            pipeline: pipeline.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn with_binding(mut self, binding: impl Into<String>, resource: impl Into<String>) -> Self {
        self.bindings.insert(binding.into(), resource.into());
        self
    }
}

/// A named set of material passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MaterialData {
    pub name: String,
    pub passes: Vec<MaterialPassData>,
}

impl MaterialData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passes: Vec::new(),
        }
    }

    pub fn with_pass(mut self, pass: MaterialPassData) -> Self {
        self.passes.push(pass);
        self
    }
}

// ============================================================================
// Dynamic textures
// ============================================================================

/// How the size of a dynamic texture is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Fixed size in pixels.
    Absolute { width: u32, height: u32 },
    /// Fraction of the swapchain size.
    ScreenRelative { width: f32, height: f32 },
}

impl TextureSize {
    /// Resolve the size against the current swapchain size.
    pub fn get_size_in_pixels(&self, screen_size: Extent2d) -> Extent2d {
        match *self {
            Self::Absolute { width, height } => Extent2d::new(width, height),
            Self::ScreenRelative { width, height } => screen_size.scaled(width, height),
        }
    }
}

/// What a dynamic texture is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageUsage {
    #[default]
    RenderTarget,
    SampledImage,
}

/// Format and size policy of a dynamic texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureFormatDesc {
    pub pixel_format: TextureFormat,
    pub size: TextureSize,
}

/// Declarative description of a dynamic texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureCreateInfo {
    pub name: String,
    pub usage: ImageUsage,
    pub format: TextureFormatDesc,
}

impl TextureCreateInfo {
    /// A render target that later passes may sample.
    pub fn render_target(
        name: impl Into<String>,
        pixel_format: TextureFormat,
        size: TextureSize,
    ) -> Self {
        Self {
            name: name.into(),
            usage: ImageUsage::RenderTarget,
            format: TextureFormatDesc { pixel_format, size },
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Source of parsed renderpacks.
pub trait RenderpackLoader {
    /// Produce the renderpack with the given name.
    fn load_renderpack(&mut self, name: &str) -> Result<RenderpackData, GraphicsError>;
}

/// Serves renderpacks that were built in code.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRenderpackLoader {
    packs: HashMap<String, RenderpackData>,
}

impl InMemoryRenderpackLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pack under its own name, replacing any previous one.
    pub fn insert(&mut self, pack: RenderpackData) {
        self.packs.insert(pack.name.clone(), pack);
    }

    pub fn with_pack(mut self, pack: RenderpackData) -> Self {
        self.insert(pack);
        self
    }
}

impl RenderpackLoader for InMemoryRenderpackLoader {
    fn load_renderpack(&mut self, name: &str) -> Result<RenderpackData, GraphicsError> {
        self.packs
            .get(name)
            .cloned()
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("no renderpack named '{name}'")))
    }
}
