//! Runtime renderpasses and their render callbacks.

use crate::backend::CommandList;
use crate::frame::FrameContext;
use crate::materials::{draw_material_batches, Pipeline};
use crate::renderpack::RenderPassCreateInfo;
use crate::types::{Extent2d, FramebufferHandle, ImageHandle, RenderpassHandle};

/// Description a renderpass was created from, kept for host inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderpassMetadata {
    pub data: RenderPassCreateInfo,
}

/// Per-pass render callback invoked by the frame executor.
///
/// The default implementation begins the pass, draws the batches of every
/// material pass of every pipeline attached to it and ends the pass. Builtin
/// passes such as the UI override [`record_renderpass_contents`].
///
/// [`record_renderpass_contents`]: RenderpassExecutor::record_renderpass_contents
pub trait RenderpassExecutor: Send + Sync {
    /// Record barriers needed before the renderpass begins.
    fn record_pre_renderpass_barriers(
        &self,
        _pass: &Renderpass,
        _cmds: &mut dyn CommandList,
        _ctx: &FrameContext<'_>,
    ) {
    }

    /// Record the commands between begin and end of the renderpass.
    fn record_renderpass_contents(
        &self,
        pass: &Renderpass,
        cmds: &mut dyn CommandList,
        ctx: &FrameContext<'_>,
    ) {
        draw_material_batches(pass, cmds, ctx);
    }

    /// Record barriers needed after the renderpass ended.
    fn record_post_renderpass_barriers(
        &self,
        _pass: &Renderpass,
        _cmds: &mut dyn CommandList,
        _ctx: &FrameContext<'_>,
    ) {
    }

    /// Record the whole pass.
    fn render(&self, pass: &Renderpass, cmds: &mut dyn CommandList, ctx: &FrameContext<'_>) {
        self.record_pre_renderpass_barriers(pass, cmds, ctx);
        let framebuffer = pass.framebuffer().unwrap_or(ctx.swapchain_framebuffer);
        cmds.begin_renderpass(pass.handle(), framebuffer);
        self.record_renderpass_contents(pass, cmds, ctx);
        cmds.end_renderpass();
        self.record_post_renderpass_barriers(pass, cmds, ctx);
    }
}

/// Executor of every renderpass loaded from a renderpack.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialDrawExecutor;

impl RenderpassExecutor for MaterialDrawExecutor {}

/// A renderpass with live backend objects.
pub struct Renderpass {
    pub(super) id: u32,
    pub(super) metadata: RenderpassMetadata,
    pub(super) handle: RenderpassHandle,
    /// `None` when the pass renders into the swapchain.
    pub(super) framebuffer: Option<FramebufferHandle>,
    pub(super) framebuffer_size: Extent2d,
    pub(super) input_images: Vec<ImageHandle>,
    pub(super) color_images: Vec<ImageHandle>,
    pub(super) depth_image: Option<ImageHandle>,
    pub(super) writes_to_backbuffer: bool,
    pub(super) is_builtin: bool,
    pub(super) pipelines: Vec<Pipeline>,
    pub(super) executor: Box<dyn RenderpassExecutor>,
}

impl Renderpass {
    /// Dense id, the declaration position among live passes.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.metadata.data.name
    }

    pub fn metadata(&self) -> &RenderpassMetadata {
        &self.metadata
    }

    pub fn handle(&self) -> RenderpassHandle {
        self.handle
    }

    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    pub fn framebuffer_size(&self) -> Extent2d {
        self.framebuffer_size
    }

    pub fn input_images(&self) -> &[ImageHandle] {
        &self.input_images
    }

    pub fn color_images(&self) -> &[ImageHandle] {
        &self.color_images
    }

    pub fn depth_image(&self) -> Option<ImageHandle> {
        self.depth_image
    }

    pub fn writes_to_backbuffer(&self) -> bool {
        self.writes_to_backbuffer
    }

    pub fn is_builtin(&self) -> bool {
        self.is_builtin
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut [Pipeline] {
        &mut self.pipelines
    }

    /// Attach a pipeline and return its index within the pass.
    pub fn add_pipeline(&mut self, pipeline: Pipeline) -> usize {
        self.pipelines.push(pipeline);
        self.pipelines.len() - 1
    }

    pub fn executor(&self) -> &dyn RenderpassExecutor {
        self.executor.as_ref()
    }

    /// Record this pass through its executor.
    pub fn render(&self, cmds: &mut dyn CommandList, ctx: &FrameContext<'_>) {
        self.executor.render(self, cmds, ctx);
    }
}

impl std::fmt::Debug for Renderpass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderpass")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("handle", &self.handle)
            .field("framebuffer", &self.framebuffer)
            .field("framebuffer_size", &self.framebuffer_size)
            .field("writes_to_backbuffer", &self.writes_to_backbuffer)
            .field("is_builtin", &self.is_builtin)
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}
