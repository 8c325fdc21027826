//! ATT opcodes, error codes, and PDU pack/parse helpers.
//!
//! PDUs are modeled as plain `&[u8]`/`Vec<u8>` rather than the zero-copy
//! borrowed types this crate's no_std teacher lineage favors: PDUs here must
//! cross thread boundaries, sit in transaction queues, and be cached, so an
//! owned buffer is the natural representation.

use crate::att::handle::AttHandle;
use crate::uuid::Uuid;
use byteorder::{ByteOrder, LittleEndian};

enum_with_unknown! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum ErrorCode(u8) {
        InvalidHandle = 0x01,
        ReadNotPermitted = 0x02,
        WriteNotPermitted = 0x03,
        InvalidPdu = 0x04,
        InsufficientAuthentication = 0x05,
        RequestNotSupported = 0x06,
        InvalidOffset = 0x07,
        InsufficientAuthorization = 0x08,
        PrepareQueueFull = 0x09,
        AttributeNotFound = 0x0A,
        AttributeNotLong = 0x0B,
        InsufficientEncryptionKeySize = 0x0C,
        InvalidAttributeValueLength = 0x0D,
        UnlikelyError = 0x0E,
        InsufficientEncryption = 0x0F,
        UnsupportedGroupType = 0x10,
        InsufficientResources = 0x11,
        /// Application-error range (0x80-0x9F): malformed input the core ATT
        /// codes above don't have a dedicated code for, e.g. a CCCD write
        /// whose value isn't exactly 2 bytes.
        IO = 0x80,
    }
}

enum_with_unknown! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum Opcode(u8) {
        ErrorRsp = 0x01,
        ExchangeMtuReq = 0x02,
        ExchangeMtuRsp = 0x03,
        FindInformationReq = 0x04,
        FindInformationRsp = 0x05,
        FindByTypeValueReq = 0x06,
        FindByTypeValueRsp = 0x07,
        ReadByTypeReq = 0x08,
        ReadByTypeRsp = 0x09,
        ReadReq = 0x0A,
        ReadRsp = 0x0B,
        ReadBlobReq = 0x0C,
        ReadBlobRsp = 0x0D,
        ReadMultipleReq = 0x0E,
        ReadMultipleRsp = 0x0F,
        ReadByGroupTypeReq = 0x10,
        ReadByGroupTypeRsp = 0x11,
        WriteReq = 0x12,
        WriteRsp = 0x13,
        WriteCommand = 0x52,
        SignedWriteCommand = 0xD2,
        PrepareWriteReq = 0x16,
        PrepareWriteRsp = 0x17,
        ExecuteWriteReq = 0x18,
        ExecuteWriteRsp = 0x19,
        HandleValueNotification = 0x1B,
        HandleValueIndication = 0x1D,
        HandleValueConfirmation = 0x1E,
    }
}

impl Opcode {
    /// True for opcodes whose 6th bit marks "command" (no response expected).
    pub fn is_command(self) -> bool {
        (u8::from(self) & 0x40) != 0
    }

    /// True for opcodes that carry an authentication signature trailer.
    pub fn is_authenticated(self) -> bool {
        (u8::from(self) & 0x80) != 0
    }

    /// Matches the original router's "is this PDU a response to match against
    /// the outstanding transaction" predicate: odd opcodes that aren't
    /// notify/indicate, plus the handle-value confirmation.
    pub fn is_response(self) -> bool {
        let raw = u8::from(self);
        if self == Opcode::HandleValueConfirmation {
            return true;
        }
        if self == Opcode::HandleValueNotification || self == Opcode::HandleValueIndication {
            return false;
        }
        raw & 1 == 1
    }
}

pub const DEFAULT_LE_MTU: u16 = 23;
pub const ERROR_PDU_LEN: usize = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ATT error: opcode={opcode:?} handle={handle:?} code={code:?}")]
pub struct AttError {
    pub opcode: Opcode,
    pub handle: AttHandle,
    pub code: ErrorCode,
}

impl AttError {
    pub fn new(opcode: Opcode, handle: AttHandle, code: ErrorCode) -> Self {
        AttError {
            opcode,
            handle,
            code,
        }
    }

    pub fn attribute_not_found(opcode: Opcode, handle: AttHandle) -> Self {
        Self::new(opcode, handle, ErrorCode::AttributeNotFound)
    }

    /// Packs a 5-byte ATT error PDU: `0x01 | req_op | handle_le | ecode`.
    pub fn pack(self) -> Vec<u8> {
        let mut out = vec![0u8; ERROR_PDU_LEN];
        out[0] = u8::from(Opcode::ErrorRsp);
        out[1] = u8::from(self.opcode);
        LittleEndian::write_u16(&mut out[2..4], self.handle.as_u16());
        out[4] = u8::from(self.code);
        out
    }
}

/// Parses a raw PDU's opcode byte. Empty buffers have no opcode.
pub fn opcode_of(buf: &[u8]) -> Option<Opcode> {
    buf.first().copied().map(Opcode::from)
}

pub fn pack_mtu_req(mtu: u16) -> Vec<u8> {
    let mut out = vec![0u8; 3];
    out[0] = u8::from(Opcode::ExchangeMtuReq);
    LittleEndian::write_u16(&mut out[1..3], mtu);
    out
}

pub fn parse_mtu_req(buf: &[u8]) -> Option<u16> {
    if buf.len() != 3 || opcode_of(buf) != Some(Opcode::ExchangeMtuReq) {
        return None;
    }
    Some(LittleEndian::read_u16(&buf[1..3]))
}

pub fn pack_mtu_rsp(mtu: u16) -> Vec<u8> {
    let mut out = vec![0u8; 3];
    out[0] = u8::from(Opcode::ExchangeMtuRsp);
    LittleEndian::write_u16(&mut out[1..3], mtu);
    out
}

/// A validated find-information / find-by-type / read-by-type / read-by-group
/// request: a handle range plus, for the latter two, an attribute type.
#[derive(Debug, Clone)]
pub struct HandleRangeReq {
    pub start: AttHandle,
    pub end: AttHandle,
}

pub fn parse_handle_range_req(buf: &[u8], expected: Opcode) -> Option<HandleRangeReq> {
    if buf.len() != 5 || opcode_of(buf) != Some(expected) {
        return None;
    }
    Some(HandleRangeReq {
        start: AttHandle::new(LittleEndian::read_u16(&buf[1..3])),
        end: AttHandle::new(LittleEndian::read_u16(&buf[3..5])),
    })
}

pub fn parse_find_info_req(buf: &[u8]) -> Option<HandleRangeReq> {
    parse_handle_range_req(buf, Opcode::FindInformationReq)
}

pub fn parse_read_by_group_req(buf: &[u8]) -> Option<(HandleRangeReq, Uuid)> {
    parse_typed_range_req(buf, Opcode::ReadByGroupTypeReq)
}

pub fn parse_read_by_type_req(buf: &[u8]) -> Option<(HandleRangeReq, Uuid)> {
    parse_typed_range_req(buf, Opcode::ReadByTypeReq)
}

fn parse_typed_range_req(buf: &[u8], expected: Opcode) -> Option<(HandleRangeReq, Uuid)> {
    if opcode_of(buf) != Some(expected) || buf.len() < 7 {
        return None;
    }
    let range = HandleRangeReq {
        start: AttHandle::new(LittleEndian::read_u16(&buf[1..3])),
        end: AttHandle::new(LittleEndian::read_u16(&buf[3..5])),
    };
    let uuid = Uuid::from_wire(&buf[5..])?;
    Some((range, uuid))
}

#[derive(Debug, Clone)]
pub struct FindByTypeValueReq {
    pub start: AttHandle,
    pub end: AttHandle,
    pub att_type: u16,
    pub value: Vec<u8>,
}

pub fn parse_find_by_type_value_req(buf: &[u8]) -> Option<FindByTypeValueReq> {
    if opcode_of(buf) != Some(Opcode::FindByTypeValueReq) || buf.len() < 7 {
        return None;
    }
    Some(FindByTypeValueReq {
        start: AttHandle::new(LittleEndian::read_u16(&buf[1..3])),
        end: AttHandle::new(LittleEndian::read_u16(&buf[3..5])),
        att_type: LittleEndian::read_u16(&buf[5..7]),
        value: buf[7..].to_vec(),
    })
}

fn pack_typed_range_req(opcode: Opcode, start: AttHandle, end: AttHandle, uuid: Uuid) -> Vec<u8> {
    let wire = uuid.to_wire();
    let mut out = vec![0u8; 5 + wire.len()];
    out[0] = u8::from(opcode);
    LittleEndian::write_u16(&mut out[1..3], start.as_u16());
    LittleEndian::write_u16(&mut out[3..5], end.as_u16());
    out[5..].copy_from_slice(&wire);
    out
}

pub fn pack_read_by_group_req(start: AttHandle, end: AttHandle, uuid: Uuid) -> Vec<u8> {
    pack_typed_range_req(Opcode::ReadByGroupTypeReq, start, end, uuid)
}

pub fn pack_read_by_type_req(start: AttHandle, end: AttHandle, uuid: Uuid) -> Vec<u8> {
    pack_typed_range_req(Opcode::ReadByTypeReq, start, end, uuid)
}

pub fn pack_find_info_req(start: AttHandle, end: AttHandle) -> Vec<u8> {
    let mut out = vec![0u8; 5];
    out[0] = u8::from(Opcode::FindInformationReq);
    LittleEndian::write_u16(&mut out[1..3], start.as_u16());
    LittleEndian::write_u16(&mut out[3..5], end.as_u16());
    out
}

/// One entry from a parsed read-by-group-type response: the group's start
/// handle, its end-group handle, and the raw attribute value.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub handle: AttHandle,
    pub end_group: AttHandle,
    pub value: Vec<u8>,
}

/// Parses a `READ_BY_GROUP_TYPE_RSP`: a 1-byte entry length followed by
/// fixed-size `[handle(2) | end_group(2) | value(len-4)]` entries.
pub fn parse_read_by_group_rsp(buf: &[u8]) -> Option<Vec<GroupEntry>> {
    if opcode_of(buf) != Some(Opcode::ReadByGroupTypeRsp) || buf.len() < 2 {
        return None;
    }
    let entry_len = buf[1] as usize;
    if entry_len < 4 {
        return None;
    }
    let mut out = Vec::new();
    let mut pos = 2;
    while pos + entry_len <= buf.len() {
        let entry = &buf[pos..pos + entry_len];
        out.push(GroupEntry {
            handle: AttHandle::new(LittleEndian::read_u16(&entry[0..2])),
            end_group: AttHandle::new(LittleEndian::read_u16(&entry[2..4])),
            value: entry[4..].to_vec(),
        });
        pos += entry_len;
    }
    Some(out)
}

/// One entry from a parsed read-by-type response: the handle and its value.
#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub handle: AttHandle,
    pub value: Vec<u8>,
}

/// Parses a `READ_BY_TYPE_RSP`: a 1-byte entry length followed by fixed-size
/// `[handle(2) | value(len-2)]` entries. Entries whose claimed length would
/// run past the buffer's end are dropped rather than read out of bounds.
pub fn parse_read_by_type_rsp(buf: &[u8]) -> Option<Vec<TypeEntry>> {
    if opcode_of(buf) != Some(Opcode::ReadByTypeRsp) || buf.len() < 2 {
        return None;
    }
    let entry_len = buf[1] as usize;
    if entry_len < 2 {
        return None;
    }
    let mut out = Vec::new();
    let mut pos = 2;
    while pos + entry_len <= buf.len() {
        let entry = &buf[pos..pos + entry_len];
        out.push(TypeEntry {
            handle: AttHandle::new(LittleEndian::read_u16(&entry[0..2])),
            value: entry[2..].to_vec(),
        });
        pos += entry_len;
    }
    Some(out)
}

/// One entry from a parsed find-information response.
#[derive(Debug, Clone)]
pub struct InfoEntry {
    pub handle: AttHandle,
    pub uuid: Uuid,
}

/// Parses a `FIND_INFORMATION_RSP`: a 1-byte UUID-format discriminator
/// (`0x01` = 16-bit, `0x02` = 128-bit) followed by fixed-size entries.
pub fn parse_find_info_rsp(buf: &[u8]) -> Option<Vec<InfoEntry>> {
    if opcode_of(buf) != Some(Opcode::FindInformationRsp) || buf.len() < 2 {
        return None;
    }
    let format = buf[1];
    let uuid_len = match format {
        0x01 => 2,
        0x02 => 16,
        _ => return None,
    };
    let entry_len = 2 + uuid_len;
    let mut out = Vec::new();
    let mut pos = 2;
    while pos + entry_len <= buf.len() {
        let entry = &buf[pos..pos + entry_len];
        let uuid = Uuid::from_wire(&entry[2..])?;
        out.push(InfoEntry {
            handle: AttHandle::new(LittleEndian::read_u16(&entry[0..2])),
            uuid,
        });
        pos += entry_len;
    }
    Some(out)
}

/// Builder for multi-entry discovery responses (find-info, find-by-type,
/// read-by-group), which must stop appending once the peer's MTU would
/// overflow and (for read-by-group) once an entry's length disagrees with the
/// first entry's length.
pub struct DiscoveryResponseBuilder {
    opcode: Opcode,
    mtu: usize,
    header_written: bool,
    entry_len: Option<usize>,
    body: Vec<u8>,
}

impl DiscoveryResponseBuilder {
    pub fn new(opcode: Opcode, mtu: u16) -> Self {
        DiscoveryResponseBuilder {
            opcode,
            mtu: mtu as usize,
            header_written: false,
            entry_len: None,
            body: Vec::new(),
        }
    }

    /// Attempts to append one entry. Returns `false` (and leaves the buffer
    /// untouched) if the entry doesn't fit, or if read-by-group's
    /// homogeneous-length rule would be violated -- callers must treat either
    /// as "stop walking, this entry didn't make it in".
    pub fn try_push(&mut self, format: Option<u8>, entry: &[u8]) -> bool {
        if let Some(len) = self.entry_len {
            if len != entry.len() {
                return false;
            }
        }
        let format_bytes = if format.is_some() { 1 } else { 0 };
        let header_bytes = if self.header_written { 0 } else { 1 + format_bytes };
        if 1 + header_bytes + self.body.len() + entry.len() > self.mtu {
            return false;
        }
        self.entry_len = Some(entry.len());
        self.header_written = true;
        self.body.extend_from_slice(entry);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Finalizes into a full PDU: opcode, then (for find-info) the 1-byte
    /// UUID-format discriminator, then entries.
    pub fn finish(self, format: Option<u8>) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.body.len());
        out.push(u8::from(self.opcode));
        if let Some(format) = format {
            out.push(format);
        } else if let Some(len) = self.entry_len {
            out.push((len) as u8);
        }
        out.extend_from_slice(&self.body);
        out
    }
}

pub fn pack_handle_value_notification(handle: AttHandle, value: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 3 + value.len()];
    out[0] = u8::from(Opcode::HandleValueNotification);
    LittleEndian::write_u16(&mut out[1..3], handle.as_u16());
    out[3..].copy_from_slice(value);
    out
}

pub fn pack_handle_value_indication(handle: AttHandle, value: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 3 + value.len()];
    out[0] = u8::from(Opcode::HandleValueIndication);
    LittleEndian::write_u16(&mut out[1..3], handle.as_u16());
    out[3..].copy_from_slice(value);
    out
}

pub fn pack_handle_value_confirmation() -> Vec<u8> {
    vec![u8::from(Opcode::HandleValueConfirmation)]
}

pub fn pack_read_rsp(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + value.len());
    out.push(u8::from(Opcode::ReadRsp));
    out.extend_from_slice(value);
    out
}

pub fn pack_write_rsp() -> Vec<u8> {
    vec![u8::from(Opcode::WriteRsp)]
}

/// Reads the 2-byte little-endian handle field at `buf[1..3]`, the layout
/// shared by read/write/notify/indicate requests.
pub fn handle_field(buf: &[u8]) -> Option<AttHandle> {
    if buf.len() < 3 {
        return None;
    }
    Some(AttHandle::new(LittleEndian::read_u16(&buf[1..3])))
}

pub fn set_handle_field(buf: &mut [u8], handle: AttHandle) {
    if buf.len() >= 3 {
        LittleEndian::write_u16(&mut buf[1..3], handle.as_u16());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_pdu_round_trips_fields() {
        let err = AttError::new(Opcode::ReadReq, AttHandle::new(0x10), ErrorCode::AttributeNotFound);
        let buf = err.pack();
        assert_eq!(buf.len(), ERROR_PDU_LEN);
        assert_eq!(opcode_of(&buf), Some(Opcode::ErrorRsp));
        assert_eq!(handle_field(&buf), Some(AttHandle::new(0x10)));
        assert_eq!(buf[4], u8::from(ErrorCode::AttributeNotFound));
    }

    #[test]
    fn opcode_response_matching() {
        assert!(Opcode::ReadRsp.is_response());
        assert!(!Opcode::HandleValueNotification.is_response());
        assert!(!Opcode::HandleValueIndication.is_response());
        assert!(Opcode::HandleValueConfirmation.is_response());
        assert!(!Opcode::ReadReq.is_response());
    }

    #[test]
    fn discovery_builder_stops_on_mtu_overflow() {
        let mut b = DiscoveryResponseBuilder::new(Opcode::FindInformationRsp, 7);
        assert!(b.try_push(Some(1), &[0x01, 0x00, 0x00, 0x28]));
        // header(2) + one entry(4) = 6 bytes; a second entry would need 10.
        assert!(!b.try_push(Some(1), &[0x02, 0x00, 0x00, 0x28]));
    }

    #[test]
    fn discovery_builder_stops_on_heterogeneous_length() {
        let mut b = DiscoveryResponseBuilder::new(Opcode::ReadByGroupTypeRsp, 64);
        assert!(b.try_push(None, &[0x01, 0x00, 0x05, 0x00, 0xAA]));
        assert!(!b.try_push(None, &[0x06, 0x00, 0x0A, 0x00, 0xAA, 0xBB]));
    }

    #[test]
    fn mtu_req_round_trips() {
        let buf = pack_mtu_req(185);
        assert_eq!(parse_mtu_req(&buf), Some(185));
    }
}
