//! Common utilities for renderer integration tests.
//!
//! Every test drives the renderer through the recording [`DummyDevice`], so
//! the assertions look at exactly what would have reached a GPU.

#![allow(dead_code)]

use lumen_graphics::backend::{DescriptorResource, RecordedCommand, Submission};
use lumen_graphics::renderpack::{MaterialData, MaterialPassData, PipelineKind, TextureSize};
use lumen_graphics::types::{Extent2d, QueueType, TextureFormat};
use lumen_graphics::{
    DummyDevice, FullVertex, MeshData, PipelineCreateInfo, RenderPassCreateInfo, Renderer,
    RendererSettings, RenderpackData, ShaderSource, TextureAttachmentInfo, TextureCreateInfo,
};

pub const SCREEN: Extent2d = Extent2d::new(1280, 720);

// ============================================================================
// Shaders
// ============================================================================

/// Vertex stage without resource bindings.
pub const PLAIN_VERTEX_WGSL: &str = r#"
@vertex
fn main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}
"#;

/// Fragment stage reading the per-frame uniforms at set 0 binding 0.
pub const GLOBALS_FRAGMENT_WGSL: &str = r#"
struct PerFrame {
    frame_count: u32,
    frame_index: u32,
    viewport_width: u32,
    viewport_height: u32,
}

@group(0) @binding(0) var<uniform> Globals: PerFrame;

@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(f32(Globals.frame_count), 0.0, 0.0, 1.0);
}
"#;

/// Fragment stage sampling one texture with a separate sampler.
pub const TEXTURED_FRAGMENT_WGSL: &str = r#"
@group(0) @binding(0) var Albedo: texture_2d<f32>;
@group(0) @binding(1) var Point: sampler;

@fragment
fn main() -> @location(0) vec4<f32> {
    return textureSample(Albedo, Point, vec2<f32>(0.5, 0.5));
}
"#;

/// Vertex stage that declares `Globals` as a storage buffer, clashing with
/// [`GLOBALS_FRAGMENT_WGSL`].
pub const CONFLICTING_VERTEX_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> Globals: array<vec4<f32>>;

@vertex
fn main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return Globals[index];
}
"#;

// ============================================================================
// Renderpack builders
// ============================================================================

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn absolute_texture(name: &str, width: u32, height: u32) -> TextureCreateInfo {
    TextureCreateInfo::render_target(
        name,
        TextureFormat::Rgba8Unorm,
        TextureSize::Absolute { width, height },
    )
}

pub fn depth_texture(name: &str) -> TextureCreateInfo {
    TextureCreateInfo::render_target(
        name,
        TextureFormat::Depth32Float,
        TextureSize::ScreenRelative {
            width: 1.0,
            height: 1.0,
        },
    )
}

pub fn color_output(name: &str) -> TextureAttachmentInfo {
    TextureAttachmentInfo::new(name, TextureFormat::Rgba8Unorm)
}

/// Surface pipeline whose fragment stage reads `Globals`.
pub fn globals_pipeline(name: &str, pass: &str) -> PipelineCreateInfo {
    PipelineCreateInfo::new(
        name,
        pass,
        ShaderSource::wgsl(format!("{name}.vert.wgsl"), PLAIN_VERTEX_WGSL),
    )
    .with_fragment_shader(ShaderSource::wgsl(
        format!("{name}.frag.wgsl"),
        GLOBALS_FRAGMENT_WGSL,
    ))
}

/// Global (fullscreen) pipeline sampling `Albedo`.
pub fn textured_global_pipeline(name: &str, pass: &str) -> PipelineCreateInfo {
    PipelineCreateInfo::new(
        name,
        pass,
        ShaderSource::wgsl(format!("{name}.vert.wgsl"), PLAIN_VERTEX_WGSL),
    )
    .with_kind(PipelineKind::Global)
    .with_fragment_shader(ShaderSource::wgsl(
        format!("{name}.frag.wgsl"),
        TEXTURED_FRAGMENT_WGSL,
    ))
}

/// A material with one pass binding `Globals` to the per-frame buffer.
pub fn globals_material(material: &str, pass: &str, pipeline: &str) -> MaterialData {
    MaterialData::new(material).with_pass(
        MaterialPassData::new(material, pass, pipeline).with_binding("Globals", "PerFrameData"),
    )
}

/// One pass `P` writing the 512x512 `sceneColor` with one `Globals` pipeline.
pub fn single_pass_pack() -> RenderpackData {
    RenderpackData::new("single")
        .with_texture(absolute_texture("sceneColor", 512, 512))
        .with_pass(RenderPassCreateInfo::new("P").with_output(color_output("sceneColor")))
        .with_pipeline(globals_pipeline("forward", "P"))
        .with_material(globals_material("stone", "main", "forward"))
}

/// Pass A writes `depthBuffer`, pass B reads it. B is declared first.
pub fn depth_prepass_pack() -> RenderpackData {
    RenderpackData::new("depth")
        .with_texture(depth_texture("depthBuffer"))
        .with_texture(absolute_texture("lit", 1280, 720))
        .with_pass(
            RenderPassCreateInfo::new("B")
                .with_input("depthBuffer")
                .with_output(color_output("lit")),
        )
        .with_pass(
            RenderPassCreateInfo::new("A")
                .with_depth(TextureAttachmentInfo::new("depthBuffer", TextureFormat::Depth32Float)),
        )
}

/// A different pack used to check that reloading restores state.
pub fn post_process_pack() -> RenderpackData {
    RenderpackData::new("post")
        .with_texture(absolute_texture("hdr", 640, 360))
        .with_texture(absolute_texture("bloom", 320, 180))
        .with_pass(RenderPassCreateInfo::new("hdr").with_output(color_output("hdr")))
        .with_pass(
            RenderPassCreateInfo::new("bloom")
                .with_input("hdr")
                .with_output(color_output("bloom")),
        )
        .with_pipeline(globals_pipeline("tonemap", "hdr"))
        .with_pipeline(textured_global_pipeline("blur", "bloom"))
        .with_material(globals_material("post", "tonemap", "tonemap"))
        .with_material(
            MaterialData::new("bloom").with_pass(
                MaterialPassData::new("bloom", "blur", "blur").with_binding("Albedo", "hdr"),
            ),
        )
}

// ============================================================================
// Renderer setup
// ============================================================================

pub fn create_renderer() -> Renderer<DummyDevice> {
    create_renderer_with(DummyDevice::new(SCREEN), RendererSettings::small())
}

pub fn create_renderer_with(
    device: DummyDevice,
    settings: RendererSettings,
) -> Renderer<DummyDevice> {
    init_logging();
    Renderer::new(device, settings).expect("renderer creation on the dummy device")
}

pub fn triangle() -> MeshData {
    MeshData::new(
        vec![
            FullVertex::at([0.0, 0.5, 0.0]),
            FullVertex::at([-0.5, -0.5, 0.0]),
            FullVertex::at([0.5, -0.5, 0.0]),
        ],
        vec![0, 1, 2],
    )
}

// ============================================================================
// Recording helpers
// ============================================================================

/// The last command list submitted to the graphics queue.
pub fn last_graphics_submission(device: &DummyDevice) -> &Submission {
    device
        .submissions()
        .iter()
        .rev()
        .find(|submission| submission.queue == QueueType::Graphics)
        .expect("a graphics submission")
}

pub fn count_commands(
    commands: &[RecordedCommand],
    predicate: impl Fn(&RecordedCommand) -> bool,
) -> usize {
    commands.iter().filter(|command| predicate(command)).count()
}

pub fn is_uniform_buffer(resource: &DescriptorResource) -> bool {
    matches!(resource, DescriptorResource::UniformBuffer(_))
}
