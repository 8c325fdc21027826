//! The per-attribute `Handle` model: a generic handle plus the four variants
//! the router treats specially (primary service, characteristic,
//! characteristic value, client characteristic configuration), each carrying
//! a cache slot and, for characteristic values, a subscriber set.

use std::collections::HashSet;
use std::time::Instant;

use crate::att::AttHandle;
use crate::device::DeviceId;
use crate::uuid::Uuid;

/// Which of the four specially-handled roles a handle plays, or `Generic` for
/// everything else (most descriptors, most plain attributes).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandleVariant {
    Generic,
    PrimaryService,
    Characteristic,
    CharacteristicValue,
    ClientCharCfg,
}

/// The cache slot on a handle: a value, when it was last refreshed, and the
/// set of requesters who have already been served this exact value.
#[derive(Debug, Default)]
pub struct Cache {
    value: Option<Vec<u8>>,
    refreshed_at: Option<Instant>,
    cached_set: HashSet<DeviceId>,
    infinite: bool,
}

impl Cache {
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    pub fn set_infinite(&mut self, infinite: bool) {
        self.infinite = infinite;
    }

    /// Replaces the cached value and clears the per-requester freshness set,
    /// matching "writes that modify an attribute MUST clear cached_set".
    pub fn set(&mut self, value: Vec<u8>) {
        self.value = Some(value);
        self.refreshed_at = Some(Instant::now());
        self.cached_set.clear();
    }

    pub fn clear(&mut self) {
        self.value = None;
        self.cached_set.clear();
    }

    /// True if `requester` may still be served this cached value without a
    /// fresh round trip: there is a value, and either the cache never expires
    /// or `requester` hasn't already seen it.
    pub fn is_fresh_for(&self, requester: DeviceId) -> bool {
        self.value.is_some() && (self.infinite || !self.cached_set.contains(&requester))
    }

    pub fn mark_served(&mut self, requester: DeviceId) {
        self.cached_set.insert(requester);
    }
}

/// One attribute on a server device.
#[derive(Debug)]
pub struct Handle {
    pub handle: AttHandle,
    pub uuid: Uuid,
    pub variant: HandleVariant,
    pub service_handle: Option<AttHandle>,
    pub char_handle: Option<AttHandle>,
    pub end_group_handle: Option<AttHandle>,
    pub cache: Cache,
    pub subscribers: HashSet<DeviceId>,
}

impl Handle {
    pub fn new(handle: AttHandle, uuid: Uuid, variant: HandleVariant) -> Self {
        Handle {
            handle,
            uuid,
            variant,
            service_handle: None,
            char_handle: None,
            end_group_handle: None,
            cache: Cache::default(),
            subscribers: HashSet::new(),
        }
    }

    /// For a `PrimaryService` handle, the cached bytes *are* the service
    /// UUID in wire form.
    pub fn service_uuid(&self) -> Option<Uuid> {
        if self.variant != HandleVariant::PrimaryService {
            return None;
        }
        self.cache.value().and_then(Uuid::from_wire)
    }

    /// For a `Characteristic` handle, the cached bytes are
    /// `[properties(1) | value_handle(2) | char_uuid(2|16)]`.
    pub fn char_properties(&self) -> Option<u8> {
        if self.variant != HandleVariant::Characteristic {
            return None;
        }
        self.cache.value().and_then(|v| v.first().copied())
    }

    pub fn char_value_handle(&self) -> Option<AttHandle> {
        if self.variant != HandleVariant::Characteristic {
            return None;
        }
        let v = self.cache.value()?;
        if v.len() < 3 {
            return None;
        }
        Some(AttHandle::new(u16::from_le_bytes([v[1], v[2]])))
    }

    pub fn char_uuid(&self) -> Option<Uuid> {
        if self.variant != HandleVariant::Characteristic {
            return None;
        }
        let v = self.cache.value()?;
        Uuid::from_wire(v.get(3..)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_infinite_never_expires_per_requester() {
        let mut c = Cache::default();
        c.set_infinite(true);
        c.set(vec![1, 2, 3]);
        let who = DeviceId::new(7);
        assert!(c.is_fresh_for(who));
        c.mark_served(who);
        assert!(c.is_fresh_for(who), "infinite cache must stay fresh for every requester");
    }

    #[test]
    fn cache_noninfinite_expires_per_requester_once_served() {
        let mut c = Cache::default();
        c.set(vec![1, 2, 3]);
        let who = DeviceId::new(7);
        assert!(c.is_fresh_for(who));
        c.mark_served(who);
        assert!(!c.is_fresh_for(who));
        // A different requester still gets to see the cached value once.
        assert!(c.is_fresh_for(DeviceId::new(8)));
    }

    #[test]
    fn set_clears_cached_set() {
        let mut c = Cache::default();
        c.set(vec![1]);
        let who = DeviceId::new(1);
        c.mark_served(who);
        assert!(!c.is_fresh_for(who));
        c.set(vec![2]);
        assert!(c.is_fresh_for(who), "a fresh write must clear prior cached_set");
    }

    #[test]
    fn characteristic_decodes_value_handle_and_uuid() {
        let mut h = Handle::new(
            AttHandle::new(2),
            crate::uuid::well_known::CHARACTERISTIC,
            HandleVariant::Characteristic,
        );
        let mut v = vec![0x02, 0x03, 0x00];
        v.extend_from_slice(&crate::uuid::well_known::GAP_DEVICE_NAME.to_wire());
        h.cache.set(v);
        assert_eq!(h.char_properties(), Some(0x02));
        assert_eq!(h.char_value_handle(), Some(AttHandle::new(3)));
        assert_eq!(h.char_uuid(), Some(crate::uuid::well_known::GAP_DEVICE_NAME));
    }
}
