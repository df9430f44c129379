//! Linear allocator with a single reset point.

use super::{align_up, AllocationInfo, AllocationStrategy};

/// Bump-pointer allocator.
///
/// Allocation advances one offset; individual frees are ignored and the whole
/// region is reclaimed by [`AllocationStrategy::reset`]. Make sure the GPU has
/// finished with every placement before resetting, typically by waiting for
/// the fence of the frame or upload that used them.
#[derive(Debug, Clone)]
pub struct BumpPointAllocationStrategy {
    capacity: u64,
    offset: u64,
    high_water_mark: u64,
}

impl BumpPointAllocationStrategy {
    /// Create a strategy managing `capacity` bytes.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            offset: 0,
            high_water_mark: 0,
        }
    }

    /// Current end of the allocated region.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Largest offset reached since creation.
    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }
}

impl AllocationStrategy for BumpPointAllocationStrategy {
    fn allocate(&mut self, size: u64, alignment: u64) -> Option<AllocationInfo> {
        debug_assert!(alignment.is_power_of_two(), "alignment must be power of 2");
        if size == 0 {
            return None;
        }

        let aligned_offset = align_up(self.offset, alignment);
        if aligned_offset.checked_add(size)? > self.capacity {
            return None;
        }

        self.offset = aligned_offset + size;
        self.high_water_mark = self.high_water_mark.max(self.offset);
        Some(AllocationInfo::new(aligned_offset, size))
    }

    fn free(&mut self, allocation: &AllocationInfo) {
        log::trace!(
            "Bump allocation at {} is released on the next reset",
            allocation.offset
        );
    }

    fn reset(&mut self) {
        self.offset = 0;
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn free_space(&self) -> u64 {
        self.capacity - self.offset
    }
}
