//! Beetle's own simulated device: the GAP/GATT attribute tree every gateway
//! exposes for its own device name and the `Service Changed` indication used
//! to tell clients their mapped handle ranges moved. Modeled as an ordinary
//! `Device` (id `DeviceId::BEETLE`) so the router and registry don't need a
//! special case to talk to it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::att::pdus;
use crate::att::AttHandle;
use crate::device::{Device, DeviceId, DeviceType};
use crate::handle::{Handle, HandleVariant};
use crate::hat::{HandleRange, SingleAllocator};
use crate::transport::{Transport, TransportError};
use crate::uuid::well_known;

struct NullTransport;

impl Transport for NullTransport {
    fn write(&self, _buf: &[u8]) -> bool {
        true
    }

    fn start_internal(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

const GAP_SERVICE_HANDLE: u16 = 1;
const DEVICE_NAME_CHAR_HANDLE: u16 = 2;
const DEVICE_NAME_VALUE_HANDLE: u16 = 3;
const GATT_SERVICE_HANDLE: u16 = 4;
const SERVICE_CHANGED_CHAR_HANDLE: u16 = 5;
const SERVICE_CHANGED_VALUE_HANDLE: u16 = 6;
const SERVICE_CHANGED_CCCD_HANDLE: u16 = 7;

pub struct BeetleInternal {
    device: Arc<Device>,
}

impl BeetleInternal {
    pub fn new(name: impl Into<String>) -> Self {
        let device = Arc::new(Device::new(
            DeviceId::BEETLE,
            name.into(),
            DeviceType::BeetleInternal,
            false,
            Box::new(SingleAllocator::new(None)),
            Arc::new(NullTransport),
        ));
        device.start_nd();

        {
            let mut handles = device.handles.lock().unwrap();

            let mut gap = Handle::new(AttHandle::new(GAP_SERVICE_HANDLE), well_known::PRIMARY_SERVICE, HandleVariant::PrimaryService);
            gap.cache.set_infinite(true);
            gap.cache.set(well_known::GAP_SERVICE.to_wire());
            gap.end_group_handle = Some(AttHandle::new(DEVICE_NAME_VALUE_HANDLE));
            handles.insert(GAP_SERVICE_HANDLE, gap);

            let mut name_char = Handle::new(AttHandle::new(DEVICE_NAME_CHAR_HANDLE), well_known::CHARACTERISTIC, HandleVariant::Characteristic);
            name_char.service_handle = Some(AttHandle::new(GAP_SERVICE_HANDLE));
            name_char.cache.set_infinite(true);
            let mut decl = vec![0x02u8];
            decl.extend_from_slice(&DEVICE_NAME_VALUE_HANDLE.to_le_bytes());
            decl.extend_from_slice(&well_known::GAP_DEVICE_NAME.to_wire());
            name_char.cache.set(decl);
            name_char.end_group_handle = Some(AttHandle::new(DEVICE_NAME_VALUE_HANDLE));
            handles.insert(DEVICE_NAME_CHAR_HANDLE, name_char);

            let mut name_value = Handle::new(AttHandle::new(DEVICE_NAME_VALUE_HANDLE), well_known::GAP_DEVICE_NAME, HandleVariant::CharacteristicValue);
            name_value.service_handle = Some(AttHandle::new(GAP_SERVICE_HANDLE));
            name_value.char_handle = Some(AttHandle::new(DEVICE_NAME_CHAR_HANDLE));
            name_value.cache.set_infinite(true);
            name_value.cache.set(device.name().into_bytes());
            handles.insert(DEVICE_NAME_VALUE_HANDLE, name_value);

            let mut gatt = Handle::new(AttHandle::new(GATT_SERVICE_HANDLE), well_known::PRIMARY_SERVICE, HandleVariant::PrimaryService);
            gatt.cache.set_infinite(true);
            gatt.cache.set(well_known::GATT_SERVICE.to_wire());
            gatt.end_group_handle = Some(AttHandle::new(SERVICE_CHANGED_CCCD_HANDLE));
            handles.insert(GATT_SERVICE_HANDLE, gatt);

            let mut sc_char = Handle::new(AttHandle::new(SERVICE_CHANGED_CHAR_HANDLE), well_known::CHARACTERISTIC, HandleVariant::Characteristic);
            sc_char.service_handle = Some(AttHandle::new(GATT_SERVICE_HANDLE));
            sc_char.cache.set_infinite(true);
            let mut sc_decl = vec![0x20u8]; // indicate
            sc_decl.extend_from_slice(&SERVICE_CHANGED_VALUE_HANDLE.to_le_bytes());
            sc_decl.extend_from_slice(&well_known::GATT_SERVICE_CHANGED.to_wire());
            sc_char.cache.set(sc_decl);
            sc_char.end_group_handle = Some(AttHandle::new(SERVICE_CHANGED_CCCD_HANDLE));
            handles.insert(SERVICE_CHANGED_CHAR_HANDLE, sc_char);

            let mut sc_value = Handle::new(AttHandle::new(SERVICE_CHANGED_VALUE_HANDLE), well_known::GATT_SERVICE_CHANGED, HandleVariant::CharacteristicValue);
            sc_value.service_handle = Some(AttHandle::new(GATT_SERVICE_HANDLE));
            sc_value.char_handle = Some(AttHandle::new(SERVICE_CHANGED_CHAR_HANDLE));
            sc_value.cache.set_infinite(true);
            sc_value.cache.set(vec![0x00, 0x00, 0x00, 0x00]);
            handles.insert(SERVICE_CHANGED_VALUE_HANDLE, sc_value);

            let mut sc_cccd = Handle::new(AttHandle::new(SERVICE_CHANGED_CCCD_HANDLE), well_known::CLIENT_CHARACTERISTIC_CONFIG, HandleVariant::ClientCharCfg);
            sc_cccd.service_handle = Some(AttHandle::new(GATT_SERVICE_HANDLE));
            sc_cccd.char_handle = Some(AttHandle::new(SERVICE_CHANGED_CHAR_HANDLE));
            handles.insert(SERVICE_CHANGED_CCCD_HANDLE, sc_cccd);
        }

        BeetleInternal { device }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Notifies `dst` that `range` changed, provided `dst` has subscribed to
    /// `Service Changed`. Sent as `HANDLE_NOTIFY` even though the
    /// characteristic is declared indicate-only: spec.md's Open Question (a)
    /// is resolved in favor of preserving this exactly, so no confirmation is
    /// expected and none is awaited.
    pub fn inform_services_changed(&self, devices: &HashMap<DeviceId, Arc<Device>>, range: HandleRange, dst: DeviceId) {
        if range.is_null() {
            return;
        }
        let subscribed = self
            .device
            .handles
            .lock()
            .unwrap()
            .get(&SERVICE_CHANGED_VALUE_HANDLE)
            .map(|h| h.subscribers.contains(&dst))
            .unwrap_or(false);
        if !subscribed {
            return;
        }
        let dest = match devices.get(&dst) {
            Some(d) => d,
            None => return,
        };
        let mut value = Vec::with_capacity(4);
        value.extend_from_slice(&range.start.to_le_bytes());
        value.extend_from_slice(&range.end.to_le_bytes());
        dest.write_command(&pdus::pack_handle_value_notification(
            AttHandle::new(SERVICE_CHANGED_VALUE_HANDLE),
            &value,
        ));
    }
}
