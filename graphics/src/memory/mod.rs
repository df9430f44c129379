//! Device memory sub-allocation.
//!
//! A [`DeviceMemoryResource`] owns one large block of device memory for its
//! whole lifetime and hands out placements inside it through an
//! [`AllocationStrategy`]. Buffers created against a resource are never
//! independently owned: destroying the buffer returns its range to the
//! strategy, destroying the resource releases the memory block.
//!
//! Two strategies are provided:
//!
//! | Strategy | Free | Typical use |
//! |----------|------|-------------|
//! | [`BlockAllocationStrategy`] | per allocation, with coalescing | mesh storage, long-lived resources |
//! | [`BumpPointAllocationStrategy`] | whole region via `reset` | uniform data, staging uploads |
//!
//! Strategies report exhaustion with `None`. [`DeviceMemoryResource`] turns
//! that into [`GraphicsError::OutOfMemory`]; there is no implicit fallback to
//! another block.

mod block;
mod bump;

pub use block::BlockAllocationStrategy;
pub use bump::BumpPointAllocationStrategy;

use crate::backend::RenderDevice;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferHandle, DeviceMemoryHandle, MemoryUsage};

/// A range handed out by an allocation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationInfo {
    /// Byte offset from the start of the memory block.
    pub offset: u64,
    /// Size of the allocation in bytes.
    pub size: u64,
}

impl AllocationInfo {
    /// Create a new allocation record.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset (offset + size).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Returns true if the two ranges share at least one byte.
    pub fn overlaps(&self, other: &AllocationInfo) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Algorithm partitioning one memory block into placements.
pub trait AllocationStrategy: Send + Sync {
    /// Reserve `size` bytes aligned to `alignment`.
    ///
    /// `alignment` must be a power of two. Returns `None` when no free range
    /// can hold the request or when `size` is zero.
    fn allocate(&mut self, size: u64, alignment: u64) -> Option<AllocationInfo>;

    /// Return a previously allocated range.
    fn free(&mut self, allocation: &AllocationInfo);

    /// Release every allocation at once.
    fn reset(&mut self);

    /// Total size of the managed block.
    fn capacity(&self) -> u64;

    /// Bytes not currently handed out.
    fn free_space(&self) -> u64;
}

/// Where a buffer lives inside device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryPlacement {
    pub memory: DeviceMemoryHandle,
    pub offset: u64,
    pub size: u64,
}

/// A buffer sub-allocated from a [`DeviceMemoryResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferResource {
    pub handle: BufferHandle,
    pub size: u64,
    pub allocation: AllocationInfo,
}

/// One block of device memory plus the strategy partitioning it.
pub struct DeviceMemoryResource {
    label: String,
    memory: DeviceMemoryHandle,
    usage: MemoryUsage,
    strategy: Box<dyn AllocationStrategy>,
}

impl DeviceMemoryResource {
    /// Allocate a memory block of the strategy's capacity from the device.
    pub fn new<D: RenderDevice>(
        device: &mut D,
        label: impl Into<String>,
        usage: MemoryUsage,
        strategy: Box<dyn AllocationStrategy>,
    ) -> Result<Self, GraphicsError> {
        let label = label.into();
        let memory = device.allocate_device_memory(strategy.capacity(), usage)?;
        log::debug!(
            "Allocated {} bytes of {usage:?} device memory for '{label}'",
            strategy.capacity()
        );
        Ok(Self {
            label,
            memory,
            usage,
            strategy,
        })
    }

    /// Create a buffer placed inside this memory block.
    ///
    /// The placement is returned to the strategy if the backend fails to
    /// create the buffer.
    pub fn create_buffer<D: RenderDevice>(
        &mut self,
        device: &mut D,
        descriptor: &BufferDescriptor,
        alignment: u64,
    ) -> Result<BufferResource, GraphicsError> {
        let allocation = self
            .strategy
            .allocate(descriptor.size, alignment)
            .ok_or_else(|| {
                log::warn!(
                    "'{}' cannot fit {} bytes ({} free)",
                    self.label,
                    descriptor.size,
                    self.strategy.free_space()
                );
                GraphicsError::OutOfMemory
            })?;

        let placement = MemoryPlacement {
            memory: self.memory,
            offset: allocation.offset,
            size: allocation.size,
        };
        match device.create_buffer(descriptor, placement) {
            Ok(handle) => Ok(BufferResource {
                handle,
                size: descriptor.size,
                allocation,
            }),
            Err(err) => {
                self.strategy.free(&allocation);
                Err(err)
            }
        }
    }

    /// Destroy a buffer and return its range to the strategy.
    pub fn destroy_buffer<D: RenderDevice>(&mut self, device: &mut D, buffer: BufferResource) {
        device.destroy_buffer(buffer.handle);
        self.strategy.free(&buffer.allocation);
    }

    /// Forget every placement. Buffers still alive must not be used afterwards.
    pub fn reset(&mut self) {
        self.strategy.reset();
    }

    /// Release the memory block itself.
    pub fn destroy<D: RenderDevice>(self, device: &mut D) {
        log::debug!("Freeing device memory for '{}'", self.label);
        device.free_device_memory(self.memory);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn memory(&self) -> DeviceMemoryHandle {
        self.memory
    }

    pub fn usage(&self) -> MemoryUsage {
        self.usage
    }

    pub fn capacity(&self) -> u64 {
        self.strategy.capacity()
    }

    pub fn free_space(&self) -> u64 {
        self.strategy.free_space()
    }
}

impl std::fmt::Debug for DeviceMemoryResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMemoryResource")
            .field("label", &self.label)
            .field("memory", &self.memory)
            .field("usage", &self.usage)
            .field("capacity", &self.strategy.capacity())
            .field("free_space", &self.strategy.free_space())
            .finish()
    }
}

/// Align a value up to the given alignment.
#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
