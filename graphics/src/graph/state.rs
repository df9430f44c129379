//! Image state tracking between renderpasses.

use std::collections::HashMap;

use crate::types::{ImageHandle, PipelineStageFlags, ResourceBarrier, ResourceState};

use super::Renderpass;

/// Stages a renderpass reads or writes its attachments in.
pub const RENDERPASS_STAGES: PipelineStageFlags = PipelineStageFlags::FRAGMENT_SHADER
    .union(PipelineStageFlags::EARLY_FRAGMENT_TESTS)
    .union(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);

/// Remembers the last state of every image and emits the barriers a
/// renderpass needs before it runs.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    states: HashMap<ImageHandle, ResourceState>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, image: ImageHandle) -> ResourceState {
        self.states
            .get(&image)
            .copied()
            .unwrap_or(ResourceState::Undefined)
    }

    /// Move an image to `new_state`, returning the barrier when the state changes.
    pub fn transition(
        &mut self,
        image: ImageHandle,
        new_state: ResourceState,
    ) -> Option<ResourceBarrier> {
        let old_state = self.states.insert(image, new_state).unwrap_or_default();
        (old_state != new_state).then(|| ResourceBarrier::image(image, old_state, new_state))
    }

    /// Barriers for every attachment of `pass`.
    ///
    /// Inputs become shader-readable, color outputs render targets and the
    /// depth output depth-writable. A pass writing the backbuffer targets
    /// `swapchain_image`.
    pub fn barriers_for_renderpass(
        &mut self,
        pass: &Renderpass,
        swapchain_image: ImageHandle,
    ) -> Vec<ResourceBarrier> {
        let mut barriers = Vec::new();
        for &image in pass.input_images() {
            barriers.extend(self.transition(image, ResourceState::ShaderRead));
        }
        if pass.writes_to_backbuffer() {
            barriers.extend(self.transition(swapchain_image, ResourceState::RenderTarget));
        }
        for &image in pass.color_images() {
            barriers.extend(self.transition(image, ResourceState::RenderTarget));
        }
        if let Some(depth) = pass.depth_image() {
            barriers.extend(self.transition(depth, ResourceState::DepthWrite));
        }
        barriers
    }

    pub fn forget(&mut self, image: ImageHandle) {
        self.states.remove(&image);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
