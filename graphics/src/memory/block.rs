//! First-fit free-list strategy with coalescing.

use std::collections::BTreeMap;

use super::{align_up, AllocationInfo, AllocationStrategy};

/// A free range inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeRange {
    offset: u64,
    size: u64,
}

impl FreeRange {
    fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Free-list allocator over one fixed-size block.
///
/// The free list is kept sorted by offset. Allocation takes the first range
/// that can hold the aligned request and splits it; the alignment padding in
/// front and the tail behind the allocation both stay on the free list.
/// Freeing reinserts the range and merges it with adjacent free ranges, so
/// the list never holds two touching ranges.
#[derive(Debug, Clone)]
pub struct BlockAllocationStrategy {
    capacity: u64,
    free_ranges: Vec<FreeRange>,
    live: BTreeMap<u64, u64>,
    free_space: u64,
}

impl BlockAllocationStrategy {
    /// Create a strategy managing `capacity` bytes.
    pub fn new(capacity: u64) -> Self {
        let free_ranges = if capacity > 0 {
            vec![FreeRange {
                offset: 0,
                size: capacity,
            }]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            free_ranges,
            live: BTreeMap::new(),
            free_space: capacity,
        }
    }

    /// Number of disjoint free ranges. One means no fragmentation.
    pub fn free_range_count(&self) -> usize {
        self.free_ranges.len()
    }

    /// Number of allocations currently handed out.
    pub fn live_allocation_count(&self) -> usize {
        self.live.len()
    }

    /// Size of the largest single allocation that could currently succeed
    /// with an alignment of one.
    pub fn largest_free_range(&self) -> u64 {
        self.free_ranges.iter().map(|r| r.size).max().unwrap_or(0)
    }

    fn insert_free_range(&mut self, range: FreeRange) {
        let index = self
            .free_ranges
            .partition_point(|existing| existing.offset < range.offset);
        self.free_ranges.insert(index, range);

        // Merge with the next range first so `index` stays valid.
        if index + 1 < self.free_ranges.len()
            && self.free_ranges[index].end() == self.free_ranges[index + 1].offset
        {
            self.free_ranges[index].size += self.free_ranges[index + 1].size;
            self.free_ranges.remove(index + 1);
        }
        if index > 0 && self.free_ranges[index - 1].end() == self.free_ranges[index].offset {
            self.free_ranges[index - 1].size += self.free_ranges[index].size;
            self.free_ranges.remove(index);
        }
    }
}

impl AllocationStrategy for BlockAllocationStrategy {
    fn allocate(&mut self, size: u64, alignment: u64) -> Option<AllocationInfo> {
        debug_assert!(alignment.is_power_of_two(), "alignment must be power of 2");
        if size == 0 || size > self.free_space {
            return None;
        }

        let (index, aligned_offset) =
            self.free_ranges.iter().enumerate().find_map(|(index, range)| {
                let aligned = align_up(range.offset, alignment);
                (aligned + size <= range.end()).then_some((index, aligned))
            })?;

        let range = self.free_ranges.remove(index);
        let allocation = AllocationInfo::new(aligned_offset, size);

        let tail = FreeRange {
            offset: allocation.end(),
            size: range.end() - allocation.end(),
        };
        if tail.size > 0 {
            self.free_ranges.insert(index, tail);
        }
        let padding = FreeRange {
            offset: range.offset,
            size: aligned_offset - range.offset,
        };
        if padding.size > 0 {
            self.free_ranges.insert(index, padding);
        }

        self.free_space -= size;
        self.live.insert(allocation.offset, allocation.size);
        Some(allocation)
    }

    fn free(&mut self, allocation: &AllocationInfo) {
        match self.live.get(&allocation.offset) {
            Some(&size) if size == allocation.size => {
                self.live.remove(&allocation.offset);
            }
            _ => {
                log::warn!(
                    "Ignoring free of unknown allocation at offset {} ({} bytes)",
                    allocation.offset,
                    allocation.size
                );
                return;
            }
        }

        self.free_space += allocation.size;
        self.insert_free_range(FreeRange {
            offset: allocation.offset,
            size: allocation.size,
        });
    }

    fn reset(&mut self) {
        *self = Self::new(self.capacity);
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn free_space(&self) -> u64 {
        self.free_space
    }
}
