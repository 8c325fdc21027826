//! The router: the only component that ever looks inside a handle range
//! belonging to one device while holding a reference to another. Lock order
//! is fixed across every branch below: the registry's shared device-table
//! lock first, then the source's HAT, then whichever destination's
//! `handles` map the request actually touches.

use std::collections::HashMap;
use std::sync::Arc;

use crate::access::{is_trusted_proxy, AccessControl};
use crate::att::pdus::{self, ErrorCode, Opcode, TypeEntry};
use crate::att::AttHandle;
use crate::device::{Device, DeviceId, DeviceType};
use crate::handle::HandleVariant;
use crate::hat::HandleRange as HatRange;
use crate::registry::Beetle;
use crate::uuid::Uuid;

type Devices = HashMap<DeviceId, Arc<Device>>;

/// A block's local numbering starts at handle 1 (matching every device's own
/// discovered handle space), so the block's own first handle (its `start`)
/// is never itself assigned to an attribute -- one handle of slack per block
/// boundary, deliberately, rather than needing a different rule for block 0
/// (whose range starts at 0, where handle 0 is the reserved null handle).
fn to_local(range: HatRange, global: u16) -> u16 {
    global - range.start
}

fn to_global(range: HatRange, local: u16) -> u16 {
    range.start + local
}

fn reply_error(source: &Device, opcode: Opcode, handle: AttHandle, code: ErrorCode) {
    source.write_response(&pdus::AttError::new(opcode, handle, code).pack());
}

/// One destination's HAT range intersected with a requested global range,
/// both ends translated into that destination's own local handle numbering.
struct Span {
    device: Arc<Device>,
    local_start: u16,
    local_end: u16,
    range: HatRange,
}

fn spans_in(devices: &Devices, hat: &dyn crate::hat::HandleAllocationTable, start: u16, end: u16) -> Vec<Span> {
    let mut owners: Vec<(DeviceId, HatRange)> = hat
        .devices()
        .into_iter()
        .map(|d| (d, hat.device_range(d)))
        .filter(|(_, r)| !r.is_null())
        .collect();
    owners.sort_by_key(|(_, r)| r.start);

    let mut out = Vec::new();
    for (id, range) in owners {
        let lo = start.max(range.start);
        let hi = end.min(range.end);
        if lo > hi {
            continue;
        }
        if let Some(device) = devices.get(&id) {
            out.push(Span {
                device: device.clone(),
                local_start: to_local(range, lo),
                local_end: to_local(range, hi),
                range,
            });
        }
    }
    out
}

pub struct Router;

impl Router {
    pub fn new() -> Self {
        Router
    }

    pub fn route(&self, beetle: &Beetle, source_id: DeviceId, buf: Vec<u8>) {
        let devices = beetle.devices.read().unwrap();
        let source = match devices.get(&source_id) {
            Some(d) => d.clone(),
            None => {
                log::warn!("route: unknown source {:?}", source_id);
                return;
            }
        };
        let opcode = match pdus::opcode_of(&buf) {
            Some(op) => op,
            None => {
                log::warn!("route: empty PDU from {:?}: {:?}", source_id, crate::utils::HexSlice(&buf));
                return;
            }
        };

        match opcode {
            Opcode::FindInformationReq => self.route_find_info(beetle, &devices, &source, &buf),
            Opcode::ReadByGroupTypeReq => self.route_read_by_group(beetle, &devices, &source, &buf),
            Opcode::FindByTypeValueReq => self.route_find_by_type_value(beetle, &devices, &source, &buf),
            Opcode::ReadByTypeReq => self.route_read_by_type(beetle, &devices, &source, &buf),
            Opcode::ReadReq => self.route_read(beetle, &devices, &source, &buf),
            Opcode::WriteReq | Opcode::WriteCommand | Opcode::SignedWriteCommand => {
                self.route_write(beetle, &devices, &source, &buf, opcode)
            }
            Opcode::HandleValueNotification => self.route_notify(beetle, &devices, &source, &buf),
            Opcode::HandleValueIndication => self.route_indicate(beetle, &devices, &source, &buf),
            _ => {
                if !opcode.is_command() {
                    let handle = pdus::handle_field(&buf).unwrap_or(AttHandle::NULL);
                    reply_error(&source, opcode, handle, ErrorCode::RequestNotSupported);
                }
            }
        }
    }

    fn route_find_info(&self, _beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8]) {
        let req = match pdus::parse_find_info_req(buf) {
            Some(r) => r,
            None => return reply_error(source, Opcode::FindInformationReq, AttHandle::NULL, ErrorCode::InvalidPdu),
        };
        let spans = spans_in(devices, &**source.hat.lock().unwrap(), req.start.as_u16(), req.end.as_u16());
        let mut builder = pdus::DiscoveryResponseBuilder::new(Opcode::FindInformationRsp, source.get_mtu());
        let mut format: Option<u8> = None;
        'outer: for span in &spans {
            let handles = span.device.handles.lock().unwrap();
            for (&local, h) in handles.range(span.local_start..=span.local_end) {
                let entry_format = if h.uuid.is_short() { 1u8 } else { 2u8 };
                let mut entry = Vec::with_capacity(2 + 16);
                entry.extend_from_slice(&to_global(span.range, local).to_le_bytes());
                entry.extend_from_slice(&h.uuid.to_wire());
                if !builder.try_push(Some(entry_format), &entry) {
                    break 'outer;
                }
                format = Some(entry_format);
            }
        }
        if builder.is_empty() {
            return reply_error(source, Opcode::FindInformationReq, req.start, ErrorCode::AttributeNotFound);
        }
        source.write_response(&builder.finish(format));
    }

    fn route_read_by_group(&self, _beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8]) {
        let (req, uuid) = match pdus::parse_read_by_group_req(buf) {
            Some(r) => r,
            None => return reply_error(source, Opcode::ReadByGroupTypeReq, AttHandle::NULL, ErrorCode::InvalidPdu),
        };
        let spans = spans_in(devices, &**source.hat.lock().unwrap(), req.start.as_u16(), req.end.as_u16());
        let mut builder = pdus::DiscoveryResponseBuilder::new(Opcode::ReadByGroupTypeRsp, source.get_mtu());
        'outer: for span in &spans {
            let handles = span.device.handles.lock().unwrap();
            for (&local, h) in handles.range(span.local_start..=span.local_end) {
                if h.variant != HandleVariant::PrimaryService {
                    continue;
                }
                let svc_uuid = match h.service_uuid() {
                    Some(u) => u,
                    None => continue,
                };
                if svc_uuid != uuid {
                    continue;
                }
                let end_group_local = h.end_group_handle.map(|e| e.as_u16()).unwrap_or(local);
                let value = h.cache.value().map(|v| v.to_vec()).unwrap_or_default();
                let mut entry = Vec::with_capacity(4 + value.len());
                entry.extend_from_slice(&to_global(span.range, local).to_le_bytes());
                entry.extend_from_slice(&to_global(span.range, end_group_local).to_le_bytes());
                entry.extend_from_slice(&value);
                if !builder.try_push(None, &entry) {
                    break 'outer;
                }
            }
        }
        if builder.is_empty() {
            return reply_error(source, Opcode::ReadByGroupTypeReq, req.start, ErrorCode::AttributeNotFound);
        }
        source.write_response(&builder.finish(None));
    }

    fn route_find_by_type_value(&self, _beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8]) {
        let req = match pdus::parse_find_by_type_value_req(buf) {
            Some(r) => r,
            None => return reply_error(source, Opcode::FindByTypeValueReq, AttHandle::NULL, ErrorCode::InvalidPdu),
        };
        let att_type = Uuid::from_u16(req.att_type);
        let spans = spans_in(devices, &**source.hat.lock().unwrap(), req.start.as_u16(), req.end.as_u16());
        let mut builder = pdus::DiscoveryResponseBuilder::new(Opcode::FindByTypeValueRsp, source.get_mtu());
        'outer: for span in &spans {
            let handles = span.device.handles.lock().unwrap();
            for (&local, h) in handles.range(span.local_start..=span.local_end) {
                if h.uuid != att_type {
                    continue;
                }
                if h.cache.value() != Some(req.value.as_slice()) {
                    continue;
                }
                let end_group_local = h.end_group_handle.map(|e| e.as_u16()).unwrap_or(local);
                let mut entry = Vec::with_capacity(4);
                entry.extend_from_slice(&to_global(span.range, local).to_le_bytes());
                entry.extend_from_slice(&to_global(span.range, end_group_local).to_le_bytes());
                if !builder.try_push(None, &entry) {
                    break 'outer;
                }
            }
        }
        if builder.is_empty() {
            return reply_error(source, Opcode::FindByTypeValueReq, req.start, ErrorCode::AttributeNotFound);
        }
        source.write_response(&builder.finish(None));
    }

    /// Serves entries from cache where fresh; forwards the rest (translated
    /// into the destination's local numbering) as a single request, rewiring
    /// any embedded value-handle field in each returned characteristic
    /// declaration back to the router's global space before replying.
    fn route_read_by_type(&self, beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8]) {
        let (req, uuid) = match pdus::parse_read_by_type_req(buf) {
            Some(r) => r,
            None => return reply_error(source, Opcode::ReadByTypeReq, AttHandle::NULL, ErrorCode::InvalidPdu),
        };
        let span = {
            let hat = source.hat.lock().unwrap();
            spans_in(devices, &**hat, req.start.as_u16(), req.end.as_u16())
                .into_iter()
                .next()
        };
        let span = match span {
            Some(s) => s,
            None => return reply_error(source, Opcode::ReadByTypeReq, req.start, ErrorCode::AttributeNotFound),
        };

        let dest = span.device.clone();
        if !is_trusted_proxy(source.device_type()) {
            if let Some(ac) = beetle.access_control() {
                if !ac.can_read_type(source, &dest, uuid) {
                    return reply_error(source, Opcode::ReadByTypeReq, req.start, ErrorCode::ReadNotPermitted);
                }
            }
        }

        let fresh: Option<Vec<TypeEntry>> = {
            let handles = dest.handles.lock().unwrap();
            let mut entries = Vec::new();
            let mut all_fresh = true;
            for (&local, h) in handles.range(span.local_start..=span.local_end) {
                if h.uuid != uuid {
                    continue;
                }
                if !h.cache.is_fresh_for(source.id()) {
                    all_fresh = false;
                    break;
                }
                entries.push(TypeEntry {
                    handle: AttHandle::new(to_global(span.range, local)),
                    value: h.cache.value().unwrap_or_default().to_vec(),
                });
            }
            if all_fresh && !entries.is_empty() {
                Some(entries)
            } else {
                None
            }
        };

        let ac = beetle.access_control();
        if let Some(mut entries) = fresh {
            let mut handles = dest.handles.lock().unwrap();
            for e in &entries {
                let local = to_local(span.range, e.handle.as_u16());
                if let Some(h) = handles.get_mut(&local) {
                    h.cache.mark_served(source.id());
                }
            }
            drop(handles);
            if uuid == crate::uuid::well_known::CHARACTERISTIC {
                if mask_char_properties(&ac, source, &dest, &mut entries).is_err() {
                    return reply_error(source, Opcode::ReadByTypeReq, req.start, ErrorCode::InsufficientAuthorization);
                }
            }
            return reply_read_by_type(source, &entries, span.range);
        }

        let local_req = pdus::pack_read_by_type_req(
            AttHandle::new(span.local_start),
            AttHandle::new(span.local_end),
            uuid,
        );
        let source_arc = clone_device(devices, source.id());
        let range = span.range;
        let dest_for_cb = dest.clone();
        let dest_for_mask = dest.clone();
        dest.write_transaction(
            local_req,
            Box::new(move |result| {
                let resp = match result {
                    crate::device::TransactionResult::Response(r) => r,
                    crate::device::TransactionResult::Aborted => return,
                };
                let source = match source_arc {
                    Some(s) => s,
                    None => return,
                };
                if pdus::opcode_of(&resp) != Some(Opcode::ReadByTypeRsp) {
                    source.write_response(&resp);
                    return;
                }
                let entries = match pdus::parse_read_by_type_rsp(&resp) {
                    Some(e) => e,
                    // The peer's own response claimed a bogus entry length;
                    // rather than relay a truncated/garbled body, tell the
                    // requester this read just isn't going to work out.
                    None => return reply_error(&source, Opcode::ReadByTypeReq, AttHandle::NULL, ErrorCode::UnlikelyError),
                };
                let mut handles = dest_for_cb.handles.lock().unwrap();
                let mut rewired = Vec::with_capacity(entries.len());
                for e in entries {
                    let local = e.handle.as_u16();
                    if let Some(h) = handles.get_mut(&local) {
                        h.cache.set(e.value.clone());
                        h.cache.mark_served(source.id());
                    }
                    rewired.push(TypeEntry {
                        handle: AttHandle::new(to_global(range, local)),
                        value: e.value,
                    });
                }
                drop(handles);
                if uuid == crate::uuid::well_known::CHARACTERISTIC {
                    if mask_char_properties(&ac, &source, &dest_for_mask, &mut rewired).is_err() {
                        return reply_error(&source, Opcode::ReadByTypeReq, AttHandle::NULL, ErrorCode::InsufficientAuthorization);
                    }
                }
                reply_read_by_type(&source, &rewired, range);
            }),
        );
    }

    fn route_read(&self, beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8]) {
        let global = match pdus::handle_field(buf) {
            Some(h) => h,
            None => return reply_error(source, Opcode::ReadReq, AttHandle::NULL, ErrorCode::InvalidPdu),
        };
        let (dest, range) = match resolve(devices, source, global) {
            Ok(v) => v,
            Err(()) => return reply_error(source, Opcode::ReadReq, global, ErrorCode::InvalidHandle),
        };
        let local = AttHandle::new(to_local(range, global.as_u16()));

        if !is_trusted_proxy(source.device_type()) {
            if let Some(ac) = beetle.access_control() {
                if let Err(code) = ac.can_access_handle(source, &dest, local) {
                    return reply_error(source, Opcode::ReadReq, global, code);
                }
            }
        }

        // The internal device has no physical peer to forward to; every read
        // against it is answered straight from cache or fails outright.
        if dest.device_type() == DeviceType::BeetleInternal {
            let value = dest.handles.lock().unwrap().get(&local.as_u16()).and_then(|h| h.cache.value().map(|v| v.to_vec()));
            return match value {
                Some(v) => source.write_response(&pdus::pack_read_rsp(&v)),
                None => reply_error(source, Opcode::ReadReq, global, ErrorCode::InvalidHandle),
            };
        }

        let cached = {
            let handles = dest.handles.lock().unwrap();
            handles.get(&local.as_u16()).and_then(|h| {
                if h.cache.is_fresh_for(source.id()) {
                    h.cache.value().map(|v| v.to_vec())
                } else {
                    None
                }
            })
        };
        if let Some(value) = cached {
            if let Some(h) = dest.handles.lock().unwrap().get_mut(&local.as_u16()) {
                h.cache.mark_served(source.id());
            }
            source.write_response(&pdus::pack_read_rsp(&value));
            return;
        }

        let source_arc = clone_device(devices, source.id());
        let local_req = {
            let mut b = vec![0u8; 3];
            b[0] = u8::from(Opcode::ReadReq);
            pdus::set_handle_field(&mut b, local);
            b
        };
        let dest_for_cb = dest.clone();
        dest.write_transaction(
            local_req,
            Box::new(move |result| {
                let resp = match result {
                    crate::device::TransactionResult::Response(r) => r,
                    crate::device::TransactionResult::Aborted => return,
                };
                let source = match source_arc {
                    Some(s) => s,
                    None => return,
                };
                if pdus::opcode_of(&resp) == Some(Opcode::ReadRsp) {
                    let value = resp[1..].to_vec();
                    if let Some(h) = dest_for_cb.handles.lock().unwrap().get_mut(&local.as_u16()) {
                        h.cache.set(value);
                        h.cache.mark_served(source.id());
                    }
                }
                source.write_response(&resp);
            }),
        );
    }

    fn route_write(&self, beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8], opcode: Opcode) {
        let global = match pdus::handle_field(buf) {
            Some(h) => h,
            None => return,
        };
        let (dest, range) = match resolve(devices, source, global) {
            Ok(v) => v,
            Err(()) => {
                if opcode == Opcode::WriteReq {
                    reply_error(source, opcode, global, ErrorCode::InvalidHandle);
                }
                return;
            }
        };
        let local = AttHandle::new(to_local(range, global.as_u16()));

        if !is_trusted_proxy(source.device_type()) {
            if let Some(ac) = beetle.access_control() {
                if let Err(code) = ac.can_access_handle(source, &dest, local) {
                    if opcode == Opcode::WriteReq {
                        reply_error(source, opcode, global, code);
                    }
                    return;
                }
            }
        }

        let value = &buf[3..];
        let variant = dest.handles.lock().unwrap().get(&local.as_u16()).map(|h| h.variant);

        if variant == Some(HandleVariant::ClientCharCfg) {
            return self.route_cccd_write(beetle, devices, source, &dest, local, value, opcode);
        }

        // No physical peer to forward to: update the cache and answer
        // WRITE_RSP locally.
        if dest.device_type() == DeviceType::BeetleInternal {
            if let Some(h) = dest.handles.lock().unwrap().get_mut(&local.as_u16()) {
                h.cache.set(value.to_vec());
            }
            if opcode == Opcode::WriteReq {
                source.write_response(&pdus::pack_write_rsp());
            }
            return;
        }

        let mut local_buf = buf.to_vec();
        pdus::set_handle_field(&mut local_buf, local);

        match opcode {
            Opcode::WriteCommand | Opcode::SignedWriteCommand => {
                dest.write_command(&local_buf);
                if let Some(h) = dest.handles.lock().unwrap().get_mut(&local.as_u16()) {
                    h.cache.set(value.to_vec());
                }
            }
            Opcode::WriteReq => {
                let source_arc = clone_device(devices, source.id());
                let dest_for_cb = dest.clone();
                let written = value.to_vec();
                dest.write_transaction(
                    local_buf,
                    Box::new(move |result| {
                        let resp = match result {
                            crate::device::TransactionResult::Response(r) => r,
                            crate::device::TransactionResult::Aborted => return,
                        };
                        if pdus::opcode_of(&resp) == Some(Opcode::WriteRsp) {
                            if let Some(h) = dest_for_cb.handles.lock().unwrap().get_mut(&local.as_u16()) {
                                h.cache.set(written);
                            }
                        }
                        if let Some(source) = source_arc {
                            source.write_response(&resp);
                        }
                    }),
                );
            }
            _ => unreachable!(),
        }
    }

    /// A CCCD write is served and acknowledged locally; the physical enable
    /// write is only forwarded to the peripheral on the 0->1 and 1->0
    /// subscriber-count transition edges.
    fn route_cccd_write(
        &self,
        _beetle: &Beetle,
        devices: &Devices,
        source: &Device,
        dest: &Arc<Device>,
        cccd_local: AttHandle,
        value: &[u8],
        opcode: Opcode,
    ) {
        if value.len() != 2 {
            if opcode == Opcode::WriteReq {
                reply_error(source, opcode, cccd_local, ErrorCode::IO);
            }
            return;
        }
        let enabling = value[0] & 0x03 != 0;
        let char_handle = dest
            .handles
            .lock()
            .unwrap()
            .get(&cccd_local.as_u16())
            .and_then(|h| h.char_handle);
        let char_handle = match char_handle {
            Some(h) => h,
            None => {
                if opcode == Opcode::WriteReq {
                    reply_error(source, opcode, cccd_local, ErrorCode::InvalidHandle);
                }
                return;
            }
        };
        let value_handle_local = {
            let handles = dest.handles.lock().unwrap();
            handles
                .values()
                .find(|h| h.variant == HandleVariant::CharacteristicValue && h.char_handle == Some(char_handle))
                .map(|h| h.handle)
        };
        let edge = {
            let mut handles = dest.handles.lock().unwrap();
            let value_handle_local = match value_handle_local {
                Some(h) => h,
                None => return,
            };
            let h = match handles.get_mut(&value_handle_local.as_u16()) {
                Some(h) => h,
                None => return,
            };
            let was_empty = h.subscribers.is_empty();
            if enabling {
                h.subscribers.insert(source.id());
            } else {
                h.subscribers.remove(&source.id());
            }
            let now_empty = h.subscribers.is_empty();
            was_empty != now_empty
        };

        if edge && dest.device_type() == DeviceType::BeetleInternal {
            if opcode == Opcode::WriteReq {
                source.write_response(&pdus::pack_write_rsp());
            }
            return;
        }

        if edge {
            let mut forward = vec![0u8; 5];
            forward[0] = u8::from(Opcode::WriteReq);
            pdus::set_handle_field(&mut forward, cccd_local);
            forward.extend_from_slice(value);
            let source_arc = clone_device(devices, source.id());
            dest.write_transaction(
                forward,
                Box::new(move |result| {
                    let resp = match result {
                        crate::device::TransactionResult::Response(r) => r,
                        crate::device::TransactionResult::Aborted => return,
                    };
                    if let Some(source) = source_arc {
                        if opcode == Opcode::WriteReq {
                            source.write_response(&resp);
                        }
                    }
                }),
            );
        } else if opcode == Opcode::WriteReq {
            source.write_response(&pdus::pack_write_rsp());
        }
    }

    /// A server device (`source`) notifying its own subscribers: fan out one
    /// fire-and-forget notification per subscriber, rewriting the handle into
    /// each subscriber's own mapped space.
    fn route_notify(&self, _beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8]) {
        let local = match pdus::handle_field(buf) {
            Some(h) => h,
            None => return,
        };
        let value = &buf[3..];
        let subscribers: Vec<DeviceId> = {
            let mut handles = source.handles.lock().unwrap();
            match handles.get_mut(&local.as_u16()) {
                Some(h) => {
                    h.cache.set(value.to_vec());
                    h.subscribers.iter().copied().collect()
                }
                None => return,
            }
        };
        for sub_id in subscribers {
            let sub = match devices.get(&sub_id) {
                Some(s) => s,
                None => continue,
            };
            let range = sub.hat.lock().unwrap().device_range(source.id());
            if range.is_null() {
                continue;
            }
            let global = AttHandle::new(to_global(range, local.as_u16()));
            sub.write_command(&pdus::pack_handle_value_notification(global, value));
        }
    }

    /// Like `route_notify`, but each subscriber must individually confirm; the
    /// confirmation back to `source` is sent as soon as indications have been
    /// dispatched, independent of per-subscriber confirmations.
    fn route_indicate(&self, _beetle: &Beetle, devices: &Devices, source: &Device, buf: &[u8]) {
        let local = match pdus::handle_field(buf) {
            Some(h) => h,
            None => return,
        };
        let value = &buf[3..];
        let subscribers: Vec<DeviceId> = {
            let mut handles = source.handles.lock().unwrap();
            match handles.get_mut(&local.as_u16()) {
                Some(h) => {
                    h.cache.set(value.to_vec());
                    h.subscribers.iter().copied().collect()
                }
                None => return,
            }
        };
        for sub_id in subscribers {
            let sub = match devices.get(&sub_id) {
                Some(s) => s,
                None => continue,
            };
            let range = sub.hat.lock().unwrap().device_range(source.id());
            if range.is_null() {
                continue;
            }
            let global = AttHandle::new(to_global(range, local.as_u16()));
            sub.write_transaction(
                pdus::pack_handle_value_indication(global, value),
                Box::new(|_| {}),
            );
        }
        source.write_response(&pdus::pack_handle_value_confirmation());
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Masks each characteristic declaration's properties byte through
/// `AccessControl::char_access_properties`; `Err` means the caller should
/// reply `InsufficientAuthorization` instead of the masked entries.
fn mask_char_properties(
    ac: &Option<Arc<dyn AccessControl>>,
    source: &Device,
    dest: &Device,
    entries: &mut [TypeEntry],
) -> Result<(), ()> {
    let ac = match ac {
        Some(ac) => ac,
        None => return Ok(()),
    };
    for e in entries.iter_mut() {
        if let Some(declared) = e.value.first().copied() {
            let masked = ac.char_access_properties(source, dest, declared).map_err(|_| ())?;
            e.value[0] = masked;
        }
    }
    Ok(())
}

fn clone_device(devices: &Devices, id: DeviceId) -> Option<Arc<Device>> {
    devices.get(&id).cloned()
}

fn resolve(devices: &Devices, source: &Device, global: AttHandle) -> Result<(Arc<Device>, HatRange), ()> {
    let owner = source.hat.lock().unwrap().device_for_handle(global.as_u16()).ok_or(())?;
    let dest = devices.get(&owner).cloned().ok_or(())?;
    let range = source.hat.lock().unwrap().device_range(owner);
    if range.is_null() {
        return Err(());
    }
    Ok((dest, range))
}

fn reply_read_by_type(source: &Device, entries: &[TypeEntry], _range: HatRange) {
    let mut builder = pdus::DiscoveryResponseBuilder::new(Opcode::ReadByTypeRsp, source.get_mtu());
    for e in entries {
        let mut entry = Vec::with_capacity(2 + e.value.len());
        entry.extend_from_slice(&e.handle.as_u16().to_le_bytes());
        entry.extend_from_slice(&e.value);
        if !builder.try_push(None, &entry) {
            break;
        }
    }
    if builder.is_empty() {
        return reply_error(source, Opcode::ReadByTypeReq, AttHandle::NULL, ErrorCode::AttributeNotFound);
    }
    source.write_response(&builder.finish(None));
}
