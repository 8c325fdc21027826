//! A HAT that proxies exactly one device across the entire handle space.
//! Used by `TcpServerProxy`/`TcpClientProxy`-style devices that don't need
//! (and can't meaningfully support) block-granular sharing, and by the
//! Beetle-internal device (constructed with no proxied device at all).

use std::collections::HashSet;

use super::{HandleAllocationTable, HandleRange};
use crate::device::DeviceId;

pub struct SingleAllocator {
    id: Option<DeviceId>,
}

impl SingleAllocator {
    pub fn new(id: Option<DeviceId>) -> Self {
        SingleAllocator { id }
    }
}

impl HandleAllocationTable for SingleAllocator {
    fn devices(&self) -> HashSet<DeviceId> {
        self.id.into_iter().collect()
    }

    fn device_range(&self, d: DeviceId) -> HandleRange {
        if self.id == Some(d) {
            HandleRange {
                start: 0,
                end: 0xFFFF,
            }
        } else {
            HandleRange::NULL
        }
    }

    fn device_for_handle(&self, _h: u16) -> Option<DeviceId> {
        self.id
    }

    fn handle_range(&self, _h: u16) -> HandleRange {
        HandleRange {
            start: 0,
            end: 0xFFFF,
        }
    }

    /// Immutable after construction: reserving into a single-allocator is a
    /// no-op, matching the original's proxy semantics.
    fn reserve(&mut self, _d: DeviceId) -> HandleRange {
        HandleRange::NULL
    }

    fn free(&mut self, d: DeviceId) -> HandleRange {
        if self.id == Some(d) {
            self.id = None;
        }
        HandleRange::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_for_handle_ignores_the_handle() {
        let hat = SingleAllocator::new(Some(DeviceId::new(3)));
        assert_eq!(hat.device_for_handle(0), Some(DeviceId::new(3)));
        assert_eq!(hat.device_for_handle(0xFFFF), Some(DeviceId::new(3)));
    }

    #[test]
    fn reserve_is_a_no_op() {
        let mut hat = SingleAllocator::new(Some(DeviceId::new(3)));
        assert!(hat.reserve(DeviceId::new(7)).is_null());
        assert_eq!(hat.device_for_handle(1), Some(DeviceId::new(3)));
    }

    #[test]
    fn free_only_clears_matching_id() {
        let mut hat = SingleAllocator::new(Some(DeviceId::new(3)));
        hat.free(DeviceId::new(7));
        assert_eq!(hat.device_for_handle(1), Some(DeviceId::new(3)));
        hat.free(DeviceId::new(3));
        assert_eq!(hat.device_for_handle(1), None);
    }
}
