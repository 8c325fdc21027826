//! Fixed-block allocator: the handle space is partitioned into 256 blocks of
//! 256 handles each. Block 0 is permanently reserved for the gateway's own
//! simulated device (`DeviceId::BEETLE`); every other block is owned by
//! exactly one device id or by nobody.

use std::collections::HashSet;

use super::{HandleAllocationTable, HandleRange};
use crate::device::DeviceId;

const MAX_HANDLE: u32 = 0xFFFF;

pub struct BlockAllocator {
    block_size: u16,
    /// `blocks[i]` is the owner of block `i`, or `None` if unowned.
    blocks: Vec<Option<DeviceId>>,
}

impl BlockAllocator {
    /// `block_size` must evenly divide the handle space (`0x10000`); the
    /// canonical gateway configuration uses 256 blocks of 256 handles.
    pub fn new(block_size: u16) -> Self {
        assert!(
            (MAX_HANDLE + 1) % block_size as u32 == 0,
            "block_size must evenly divide the handle space"
        );
        let num_blocks = (0x10000u32 / block_size as u32) as usize;
        let mut blocks = vec![None; num_blocks];
        blocks[0] = Some(DeviceId::BEETLE);
        BlockAllocator { block_size, blocks }
    }

    fn block_index(&self, h: u16) -> usize {
        (h as u32 / self.block_size as u32) as usize
    }

    fn range_of_block(&self, i: usize) -> HandleRange {
        let start = i as u32 * self.block_size as u32;
        let end = start + self.block_size as u32 - 1;
        HandleRange {
            start: start as u16,
            end: end as u16,
        }
    }
}

impl HandleAllocationTable for BlockAllocator {
    fn devices(&self) -> HashSet<DeviceId> {
        self.blocks.iter().filter_map(|b| *b).collect()
    }

    fn device_range(&self, d: DeviceId) -> HandleRange {
        for (i, owner) in self.blocks.iter().enumerate() {
            if *owner == Some(d) {
                return self.range_of_block(i);
            }
        }
        HandleRange::NULL
    }

    fn device_for_handle(&self, h: u16) -> Option<DeviceId> {
        self.blocks[self.block_index(h)]
    }

    fn handle_range(&self, h: u16) -> HandleRange {
        self.range_of_block(self.block_index(h))
    }

    fn reserve(&mut self, d: DeviceId) -> HandleRange {
        // Block 0 is never handed out; start the scan at block 1.
        for i in 1..self.blocks.len() {
            if self.blocks[i].is_none() {
                self.blocks[i] = Some(d);
                return self.range_of_block(i);
            }
        }
        HandleRange::NULL
    }

    fn free(&mut self, d: DeviceId) -> HandleRange {
        let mut freed: Option<HandleRange> = None;
        for i in 1..self.blocks.len() {
            if self.blocks[i] == Some(d) {
                self.blocks[i] = None;
                let r = self.range_of_block(i);
                freed = Some(match freed {
                    None => r,
                    Some(prev) => HandleRange {
                        start: prev.start.min(r.start),
                        end: prev.end.max(r.end),
                    },
                });
            }
        }
        freed.unwrap_or(HandleRange::NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_zero_is_reserved_for_beetle() {
        let hat = BlockAllocator::new(256);
        assert_eq!(hat.device_for_handle(0), Some(DeviceId::BEETLE));
        assert!(hat.devices().contains(&DeviceId::BEETLE));
    }

    #[test]
    fn reserve_never_allocates_block_zero() {
        let mut hat = BlockAllocator::new(256);
        for _ in 0..300 {
            // Exhaust every free block; none of the ranges handed out may
            // ever include handle 0.
            let r = hat.reserve(DeviceId::new(42));
            if r.is_null() {
                break;
            }
            assert!(r.start > 0);
        }
    }

    #[test]
    fn reserve_then_lookup_round_trips() {
        let mut hat = BlockAllocator::new(256);
        let d = DeviceId::new(5);
        let r = hat.reserve(d);
        assert!(!r.is_null());
        assert_eq!(hat.device_range(d), r);
        assert_eq!(hat.device_for_handle(r.start), Some(d));
    }

    #[test]
    fn free_releases_all_blocks_owned_by_device() {
        let mut hat = BlockAllocator::new(256);
        let d = DeviceId::new(9);
        let first = hat.reserve(d);
        assert!(!first.is_null());
        let freed = hat.free(d);
        assert_eq!(freed, first);
        assert!(hat.device_range(d).is_null());
    }

    #[test]
    fn exhausted_allocator_returns_null_range() {
        let mut hat = BlockAllocator::new(256);
        let total_blocks = 0x10000 / 256;
        for i in 0..(total_blocks - 1) {
            let r = hat.reserve(DeviceId::new(100 + i as i32));
            assert!(!r.is_null());
        }
        assert!(hat.reserve(DeviceId::new(999)).is_null());
    }
}
