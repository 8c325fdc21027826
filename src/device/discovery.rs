//! GATT discovery: the walk a virtual device runs once at `start()` to
//! populate its `handles` map from a real peripheral. Three nested iterative
//! walks -- read-by-group for services, read-by-type for characteristics
//! within each service, find-info for descriptors within each characteristic
//! -- each advancing past the last discovered handle until the peer replies
//! `ATTR_NOT_FOUND`/`REQ_NOT_SUPP` or the range is exhausted.

use std::collections::BTreeMap;

use crate::att::pdus::{self, ErrorCode, GroupEntry, InfoEntry, Opcode, TypeEntry};
use crate::att::AttHandle;
use crate::handle::{Handle, HandleVariant};
use crate::uuid::well_known;

use super::Device;

fn is_terminal_error(resp: &[u8], allow_not_supported: bool) -> bool {
    if pdus::opcode_of(resp) != Some(Opcode::ErrorRsp) || resp.len() != pdus::ERROR_PDU_LEN {
        return false;
    }
    let code = ErrorCode::from(resp[4]);
    code == ErrorCode::AttributeNotFound || (allow_not_supported && code == ErrorCode::RequestNotSupported)
}

pub fn discover_device_name(device: &Device) -> String {
    let req = pdus::pack_read_by_type_req(AttHandle::new(1), AttHandle::MAX, well_known::GAP_DEVICE_NAME);
    match device.write_transaction_blocking(req) {
        Some(resp) if pdus::opcode_of(&resp) == Some(Opcode::ReadByTypeRsp) => {
            match pdus::parse_read_by_type_rsp(&resp).and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) }) {
                Some(entry) => String::from_utf8_lossy(&entry.value).into_owned(),
                None => "unknown".to_string(),
            }
        }
        _ => "unknown".to_string(),
    }
}

/// Iteratively reads by group for `uuid` over `[start, end]`.
pub fn discover_groups(device: &Device, uuid: crate::uuid::Uuid, start: u16, end: u16) -> Vec<GroupEntry> {
    let mut out = Vec::new();
    let mut curr = start;
    loop {
        if curr > end {
            break;
        }
        let req = pdus::pack_read_by_group_req(AttHandle::new(curr), AttHandle::new(end), uuid);
        let resp = match device.write_transaction_blocking(req) {
            Some(r) => r,
            None => break,
        };
        if is_terminal_error(&resp, true) {
            break;
        }
        let entries = match pdus::parse_read_by_group_rsp(&resp) {
            Some(e) if !e.is_empty() => e,
            _ => break,
        };
        let last_end = entries.last().unwrap().end_group.as_u16();
        out.extend(entries);
        match last_end.checked_add(1) {
            Some(next) if next > curr => curr = next,
            _ => break,
        }
    }
    out
}

/// Iteratively reads by type for `uuid` over `[start, end]`.
pub fn discover_types(device: &Device, uuid: crate::uuid::Uuid, start: u16, end: u16) -> Vec<TypeEntry> {
    let mut out = Vec::new();
    let mut curr = start;
    loop {
        if curr > end {
            break;
        }
        let req = pdus::pack_read_by_type_req(AttHandle::new(curr), AttHandle::new(end), uuid);
        let resp = match device.write_transaction_blocking(req) {
            Some(r) => r,
            None => break,
        };
        if is_terminal_error(&resp, true) {
            break;
        }
        let entries = match pdus::parse_read_by_type_rsp(&resp) {
            Some(e) if !e.is_empty() => e,
            _ => break,
        };
        let last_handle = entries.last().unwrap().handle.as_u16();
        out.extend(entries);
        match last_handle.checked_add(1) {
            Some(next) if next > curr => curr = next,
            _ => break,
        }
    }
    out
}

/// Iteratively finds information (descriptors) over `[start, end]`.
pub fn discover_info(device: &Device, start: u16, end: u16) -> Vec<InfoEntry> {
    let mut out = Vec::new();
    let mut curr = start;
    loop {
        if curr > end {
            break;
        }
        let req = pdus::pack_find_info_req(AttHandle::new(curr), AttHandle::new(end));
        let resp = match device.write_transaction_blocking(req) {
            Some(r) => r,
            None => break,
        };
        if is_terminal_error(&resp, true) {
            break;
        }
        let entries = match pdus::parse_find_info_rsp(&resp) {
            Some(e) if !e.is_empty() => e,
            _ => break,
        };
        let last_handle = entries.last().unwrap().handle.as_u16();
        out.extend(entries);
        match last_handle.checked_add(1) {
            Some(next) if next > curr => curr = next,
            _ => break,
        }
    }
    out
}

/// Orchestrates the full tree build: services, then characteristics within
/// each service, then descriptors within each characteristic's gap.
pub fn discover_all_handles(device: &Device) -> BTreeMap<u16, Handle> {
    let mut handles = BTreeMap::new();
    let services = discover_groups(device, well_known::PRIMARY_SERVICE, 1, 0xFFFF);
    let mut highest = 0u16;

    for (service_idx, service) in services.iter().enumerate() {
        let service_handle = service.handle.as_u16();
        let mut svc = Handle::new(service.handle, well_known::PRIMARY_SERVICE, HandleVariant::PrimaryService);
        svc.cache.set_infinite(true);
        svc.cache.set(service.value.clone());
        svc.end_group_handle = Some(service.end_group);
        highest = highest.max(service.end_group.as_u16());

        let char_scan_end = service.end_group.as_u16();
        let chars = discover_types(device, well_known::CHARACTERISTIC, service_handle + 1, char_scan_end);

        for (char_idx, ch) in chars.iter().enumerate() {
            let mut char_h = Handle::new(ch.handle, well_known::CHARACTERISTIC, HandleVariant::Characteristic);
            char_h.service_handle = Some(service.handle);
            char_h.cache.set_infinite(true);
            char_h.cache.set(ch.value.clone());
            let value_handle = char_h.char_value_handle();
            let char_uuid = char_h.char_uuid().unwrap_or(well_known::CHARACTERISTIC);

            let is_last_char_in_service = char_idx + 1 == chars.len();
            let gap_end = if is_last_char_in_service {
                char_scan_end
            } else {
                chars[char_idx + 1].handle.as_u16().saturating_sub(1)
            };
            char_h.end_group_handle = Some(AttHandle::new(gap_end));
            highest = highest.max(gap_end);

            let gap_start = ch.handle.as_u16() + 1;
            let descriptors = if gap_start <= gap_end {
                discover_info(device, gap_start, gap_end)
            } else {
                Vec::new()
            };

            handles.insert(ch.handle.as_u16(), char_h);

            for d in descriptors {
                let variant = if d.uuid == well_known::CLIENT_CHARACTERISTIC_CONFIG {
                    HandleVariant::ClientCharCfg
                } else if Some(d.handle) == value_handle {
                    HandleVariant::CharacteristicValue
                } else {
                    HandleVariant::Generic
                };
                let uuid = if variant == HandleVariant::CharacteristicValue {
                    char_uuid
                } else {
                    d.uuid
                };
                let mut dh = Handle::new(d.handle, uuid, variant);
                dh.service_handle = Some(service.handle);
                dh.char_handle = Some(ch.handle);
                if variant != HandleVariant::PrimaryService && variant != HandleVariant::Characteristic {
                    dh.cache.set_infinite(false);
                }
                highest = highest.max(d.handle.as_u16());
                handles.insert(d.handle.as_u16(), dh);
            }
        }

        let _ = service_idx;
        handles.insert(service_handle, svc);
    }

    // Patch the last service's end-group to the overall highest handle, and
    // similarly for the last characteristic within each service.
    if let Some(last_service) = services.last() {
        if let Some(h) = handles.get_mut(&last_service.handle.as_u16()) {
            h.end_group_handle = Some(AttHandle::new(highest));
        }
    }
    for service in &services {
        let chars_in_service: Vec<u16> = handles
            .values()
            .filter(|h| h.variant == HandleVariant::Characteristic && h.service_handle == Some(service.handle))
            .map(|h| h.handle.as_u16())
            .collect();
        if let Some(&last_char) = chars_in_service.iter().max() {
            let this_service_highest = handles
                .values()
                .filter(|h| h.service_handle == Some(service.handle))
                .map(|h| h.handle.as_u16())
                .max()
                .unwrap_or(last_char);
            if let Some(h) = handles.get_mut(&last_char) {
                h.end_group_handle = Some(AttHandle::new(this_service_highest));
            }
        }
    }

    handles
}
