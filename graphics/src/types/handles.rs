//! Opaque handles to backend objects.
//!
//! Handles are plain integers chosen by the backend. They carry no ownership:
//! every object is destroyed explicitly through the device that created it.

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw backend id.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw backend id.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

define_handle!(
    /// Handle to a GPU buffer.
    BufferHandle
);
define_handle!(
    /// Handle to a GPU image.
    ImageHandle
);
define_handle!(
    /// Handle to a sampler.
    SamplerHandle
);
define_handle!(
    /// Handle to a backend renderpass object.
    RenderpassHandle
);
define_handle!(
    /// Handle to a framebuffer.
    FramebufferHandle
);
define_handle!(
    /// Handle to a graphics pipeline state object.
    PipelineHandle
);
define_handle!(
    /// Handle to a block of device memory.
    DeviceMemoryHandle
);
define_handle!(
    /// Handle to a descriptor pool.
    DescriptorPoolHandle
);
define_handle!(
    /// Handle to a descriptor set.
    DescriptorSetHandle
);
define_handle!(
    /// Handle to a CPU-visible fence.
    FenceHandle
);
define_handle!(
    /// Handle to a GPU semaphore.
    SemaphoreHandle
);

static_assertions::assert_impl_all!(BufferHandle: Send, Sync);
static_assertions::assert_impl_all!(ImageHandle: Send, Sync);
static_assertions::assert_impl_all!(DescriptorSetHandle: Send, Sync);
