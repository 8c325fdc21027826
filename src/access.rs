//! The access-control seam: pluggable policy for which devices may be mapped
//! together and which attributes each pair may see. `TcpClientProxy` devices
//! are trusted to have already enforced their own policy and short-circuit
//! to "always allowed".

use crate::att::{AttHandle, ErrorCode};
use crate::device::{Device, DeviceType};
use crate::uuid::Uuid;

pub trait AccessControl: Send + Sync {
    /// Whether `source` may access `handle` on `dest` at all. Returning
    /// `Err` supplies the exact ATT error code the router should reply with.
    fn can_access_handle(&self, source: &Device, dest: &Device, handle: AttHandle) -> Result<(), ErrorCode>;

    /// Short-circuit consulted before forwarding a `READ_BY_TYPE_REQ`.
    fn can_read_type(&self, source: &Device, dest: &Device, att_type: Uuid) -> bool;

    /// Whether `from` may be mapped into `to`'s handle space.
    fn can_map(&self, from: &Device, to: &Device) -> bool;

    /// The characteristic properties byte `source` is allowed to see for a
    /// cached characteristic declaration on `dest` -- used to mask advertised
    /// properties per-caller on a cache hit.
    fn char_access_properties(
        &self,
        source: &Device,
        dest: &Device,
        declared: u8,
    ) -> Result<u8, ErrorCode>;
}

/// Permits everything. Used in tests and anywhere no policy has been wired
/// up; also the effective behavior for a `TcpClientProxy` client regardless
/// of which `AccessControl` is installed.
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn can_access_handle(&self, _source: &Device, _dest: &Device, _handle: AttHandle) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn can_read_type(&self, _source: &Device, _dest: &Device, _att_type: Uuid) -> bool {
        true
    }

    fn can_map(&self, _from: &Device, _to: &Device) -> bool {
        true
    }

    fn char_access_properties(&self, _source: &Device, _dest: &Device, declared: u8) -> Result<u8, ErrorCode> {
        Ok(declared)
    }
}

/// True for a device type the router always trusts: a `TcpClientProxy` has
/// already enforced its own access control.
pub fn is_trusted_proxy(device_type: DeviceType) -> bool {
    device_type == DeviceType::TcpClientProxy
}
