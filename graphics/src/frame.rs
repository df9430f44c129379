//! Per-frame state of the frame executor.
//!
//! A [`FrameContext`] is built once per presented frame and handed to every
//! renderpass callback. It borrows the scratch arena of the frame slot that
//! renders the frame, so nothing allocated from it can outlive the frame.

use bumpalo::Bump;

use crate::backend::RenderDevice;
use crate::error::GraphicsError;
use crate::resources::MeshStore;
use crate::types::{Extent2d, FenceHandle, FramebufferHandle, ImageHandle};

/// Snapshot of the current frame, valid for exactly one frame.
pub struct FrameContext<'a> {
    /// Frames started since the renderer was created, including this one.
    pub frame_count: u64,
    /// Swapchain image slot this frame renders into.
    pub frame_index: u32,
    pub swapchain_framebuffer: FramebufferHandle,
    pub swapchain_image: ImageHandle,
    pub swapchain_size: Extent2d,
    /// Scratch memory released after the frame is presented.
    pub scratch: &'a Bump,
    pub meshes: &'a MeshStore,
}

impl FrameContext<'_> {
    pub fn frame_slot(&self) -> usize {
        self.frame_index as usize
    }
}

impl std::fmt::Debug for FrameContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameContext")
            .field("frame_count", &self.frame_count)
            .field("frame_index", &self.frame_index)
            .field("swapchain_framebuffer", &self.swapchain_framebuffer)
            .field("swapchain_image", &self.swapchain_image)
            .field("swapchain_size", &self.swapchain_size)
            .field("scratch_bytes", &self.scratch.allocated_bytes())
            .finish()
    }
}

/// Resources owned by one swapchain image slot.
#[derive(Debug)]
pub struct FrameSlot {
    /// Signaled when the slot's last submission finished on the GPU.
    pub fence: FenceHandle,
    pub scratch: Bump,
}

impl FrameSlot {
    /// Create one slot per swapchain image, each with a signaled fence.
    pub fn create_all<D: RenderDevice>(device: &mut D) -> Result<Vec<Self>, GraphicsError> {
        let count = device.swapchain_image_count().max(1);
        let fences = device.create_fences(count, true)?;
        Ok(fences
            .into_iter()
            .map(|fence| Self {
                fence,
                scratch: Bump::new(),
            })
            .collect())
    }

    /// Drop everything allocated from the scratch arena during the last frame.
    pub fn release_scratch(&mut self) {
        self.scratch.reset();
    }
}
