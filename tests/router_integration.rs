//! End-to-end scenarios driving `Beetle`/`Router`/`Device` together, the way
//! an embedding application would: build a small server device's attribute
//! table by hand (bypassing the discovery walk, which `device::discovery`
//! already covers on its own), map it into a client's handle space, and push
//! raw PDUs through `Router::route`.

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use beetle::att::pdus::{self, ErrorCode, Opcode};
use beetle::att::AttHandle;
use beetle::hat::{BlockAllocator, HandleAllocationTable, HandleRange};
use beetle::handle::{Handle, HandleVariant};
use beetle::transport::ChannelTransport;
use beetle::uuid::{well_known, Uuid};
use beetle::{Beetle, Device, DeviceId, DeviceType};

const SERVICE: u16 = 1;
const CHAR_DECL: u16 = 2;
const CHAR_VALUE: u16 = 3;
const CCCD: u16 = 4;

fn char_uuid() -> Uuid {
    Uuid::from_u16(0xABCD)
}

fn build_server_handles() -> BTreeMap<u16, Handle> {
    let mut handles = BTreeMap::new();

    let mut service = Handle::new(AttHandle::new(SERVICE), Uuid::from_u16(0x1234), HandleVariant::PrimaryService);
    service.cache.set_infinite(true);
    service.cache.set(Uuid::from_u16(0x1234).to_wire());
    service.end_group_handle = Some(AttHandle::new(CCCD));
    handles.insert(SERVICE, service);

    let mut decl = Handle::new(AttHandle::new(CHAR_DECL), well_known::CHARACTERISTIC, HandleVariant::Characteristic);
    decl.service_handle = Some(AttHandle::new(SERVICE));
    decl.cache.set_infinite(true);
    let mut decl_bytes = vec![0x12u8]; // notify | write
    decl_bytes.extend_from_slice(&CHAR_VALUE.to_le_bytes());
    decl_bytes.extend_from_slice(&char_uuid().to_wire());
    decl.cache.set(decl_bytes);
    decl.end_group_handle = Some(AttHandle::new(CCCD));
    handles.insert(CHAR_DECL, decl);

    let mut value = Handle::new(AttHandle::new(CHAR_VALUE), char_uuid(), HandleVariant::CharacteristicValue);
    value.service_handle = Some(AttHandle::new(SERVICE));
    value.char_handle = Some(AttHandle::new(CHAR_DECL));
    handles.insert(CHAR_VALUE, value);

    let mut cccd = Handle::new(AttHandle::new(CCCD), well_known::CLIENT_CHARACTERISTIC_CONFIG, HandleVariant::ClientCharCfg);
    cccd.service_handle = Some(AttHandle::new(SERVICE));
    cccd.char_handle = Some(AttHandle::new(CHAR_DECL));
    handles.insert(CCCD, cccd);

    handles
}

fn make_device(id: DeviceId, name: &str, device_type: DeviceType) -> (Arc<Device>, Receiver<Vec<u8>>) {
    let (transport, rx) = ChannelTransport::new();
    let device = Arc::new(Device::new(id, name, device_type, true, Box::new(BlockAllocator::new(256)), Arc::new(transport)));
    device.start_nd();
    (device, rx)
}

fn pack_request(opcode: Opcode, handle: AttHandle, value: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 3 + value.len()];
    buf[0] = u8::from(opcode);
    pdus::set_handle_field(&mut buf, handle);
    buf[3..].copy_from_slice(value);
    buf
}

fn global(range: HandleRange, local: u16) -> AttHandle {
    AttHandle::new(range.start + local)
}

fn recv(rx: &Receiver<Vec<u8>>) -> Vec<u8> {
    rx.recv_timeout(Duration::from_secs(1)).expect("expected a PDU on the channel")
}

fn recv_none(rx: &Receiver<Vec<u8>>) {
    assert!(
        rx.recv_timeout(Duration::from_millis(50)).is_err(),
        "expected no PDU on the channel"
    );
}

struct Fixture {
    beetle: Arc<Beetle>,
    server: Arc<Device>,
    server_rx: Receiver<Vec<u8>>,
    client: Arc<Device>,
    client_rx: Receiver<Vec<u8>>,
    range: HandleRange,
}

fn setup() -> Fixture {
    let beetle = Beetle::with_pool_sizes("test-gateway", 2, 2);
    let server_id = beetle.next_device_id();
    let client_id = beetle.next_device_id();

    let (server, server_rx) = make_device(server_id, "server", DeviceType::LePeripheral);
    *server.handles.lock().unwrap() = build_server_handles();
    let (client, client_rx) = make_device(client_id, "client", DeviceType::TcpClient);

    let _ = beetle.add_device(server.clone());
    let _ = beetle.add_device(client.clone());
    beetle.map_devices(server_id, client_id);

    let range = client.hat.lock().unwrap().device_range(server_id);
    assert!(!range.is_null(), "mapping server into client's HAT must succeed");

    Fixture {
        beetle,
        server,
        server_rx,
        client,
        client_rx,
        range,
    }
}

#[test]
fn first_subscriber_forwards_physical_cccd_write_and_confirms_locally() {
    let f = setup();
    let cccd = global(f.range, CCCD);
    let req = pack_request(Opcode::WriteReq, cccd, &[0x01, 0x00]);

    f.beetle.router.route(&f.beetle, f.client.id(), req);

    let forwarded = recv(&f.server_rx);
    assert_eq!(pdus::opcode_of(&forwarded), Some(Opcode::WriteReq));
    assert_eq!(pdus::handle_field(&forwarded), Some(AttHandle::new(CCCD)));

    assert!(
        f.server.handles.lock().unwrap().get(&CHAR_VALUE).unwrap().subscribers.contains(&f.client.id()),
        "subscriber must be recorded before the edge-triggered forward completes"
    );

    // Simulate the peripheral's own write response coming back.
    assert!(matches!(f.server.handle_inbound(&pdus::pack_write_rsp()), beetle::device::Inbound::Handled));

    let back = recv(&f.client_rx);
    assert_eq!(pdus::opcode_of(&back), Some(Opcode::WriteRsp));
}

#[test]
fn second_subscriber_is_served_locally_without_a_physical_write() {
    let f = setup();
    let beetle = &f.beetle;
    let other_id = beetle.next_device_id();
    let (other, other_rx) = make_device(other_id, "client-2", DeviceType::TcpClient);
    let _ = beetle.add_device(other.clone());
    beetle.map_devices(f.server.id(), other_id);
    let other_range = other.hat.lock().unwrap().device_range(f.server.id());

    // First subscriber crosses the 0->1 edge.
    let first_req = pack_request(Opcode::WriteReq, global(f.range, CCCD), &[0x01, 0x00]);
    beetle.router.route(beetle, f.client.id(), first_req);
    recv(&f.server_rx);
    f.server.handle_inbound(&pdus::pack_write_rsp());
    recv(&f.client_rx);

    // Second subscriber does not cross an edge: answered locally, nothing
    // forwarded to the peripheral.
    let second_req = pack_request(Opcode::WriteReq, global(other_range, CCCD), &[0x01, 0x00]);
    beetle.router.route(beetle, other_id, second_req);
    recv_none(&f.server_rx);
    let rsp = recv(&other_rx);
    assert_eq!(pdus::opcode_of(&rsp), Some(Opcode::WriteRsp));
}

#[test]
fn malformed_cccd_write_is_rejected_without_touching_subscriber_state() {
    let f = setup();
    let req = pack_request(Opcode::WriteReq, global(f.range, CCCD), &[0x01]); // one byte, not two
    f.beetle.router.route(&f.beetle, f.client.id(), req);

    recv_none(&f.server_rx);
    let rsp = recv(&f.client_rx);
    assert_eq!(pdus::opcode_of(&rsp), Some(Opcode::ErrorRsp));
    assert_eq!(rsp[4], u8::from(ErrorCode::IO));
    assert!(!f.server.handles.lock().unwrap().get(&CHAR_VALUE).unwrap().subscribers.contains(&f.client.id()));
}

#[test]
fn notification_fans_out_with_the_handle_rewritten_into_each_subscriber_space() {
    let f = setup();

    // Subscribe first so there is a fan-out target.
    let req = pack_request(Opcode::WriteReq, global(f.range, CCCD), &[0x01, 0x00]);
    f.beetle.router.route(&f.beetle, f.client.id(), req);
    recv(&f.server_rx);
    f.server.handle_inbound(&pdus::pack_write_rsp());
    recv(&f.client_rx);

    let notify = pack_request(Opcode::HandleValueNotification, AttHandle::new(CHAR_VALUE), &[0x2A]);
    f.beetle.router.route(&f.beetle, f.server.id(), notify);

    let delivered = recv(&f.client_rx);
    assert_eq!(pdus::opcode_of(&delivered), Some(Opcode::HandleValueNotification));
    assert_eq!(pdus::handle_field(&delivered), Some(global(f.range, CHAR_VALUE)));
    assert_eq!(&delivered[3..], &[0x2A]);
}

#[test]
fn read_by_type_is_served_from_cache_without_forwarding() {
    let f = setup();
    let req = pdus::pack_read_by_type_req(global(f.range, SERVICE), global(f.range, CCCD), well_known::CHARACTERISTIC);

    f.beetle.router.route(&f.beetle, f.client.id(), req);

    recv_none(&f.server_rx); // cache hit: the peripheral is never consulted
    let rsp = recv(&f.client_rx);
    assert_eq!(pdus::opcode_of(&rsp), Some(Opcode::ReadByTypeRsp));
    let entries = pdus::parse_read_by_type_rsp(&rsp).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].handle, global(f.range, CHAR_DECL));
    assert_eq!(entries[0].value[0], 0x12);
}

#[test]
fn find_information_walk_translates_every_handle_into_the_client_space() {
    let f = setup();
    let req = pdus::pack_find_info_req(global(f.range, SERVICE), global(f.range, CCCD));

    f.beetle.router.route(&f.beetle, f.client.id(), req);

    let rsp = recv(&f.client_rx);
    assert_eq!(pdus::opcode_of(&rsp), Some(Opcode::FindInformationRsp));
    let entries = pdus::parse_find_info_rsp(&rsp).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].handle, global(f.range, SERVICE));
    assert_eq!(entries[3].handle, global(f.range, CCCD));
}

#[test]
fn removing_a_device_unsubscribes_it_everywhere_and_frees_its_mapped_blocks() {
    let f = setup();

    // Subscribe, then remove the client: the server must drop it as a
    // subscriber.
    let req = pack_request(Opcode::WriteReq, global(f.range, CCCD), &[0x01, 0x00]);
    f.beetle.router.route(&f.beetle, f.client.id(), req);
    recv(&f.server_rx);
    f.server.handle_inbound(&pdus::pack_write_rsp());
    recv(&f.client_rx);
    assert!(f.server.handles.lock().unwrap().get(&CHAR_VALUE).unwrap().subscribers.contains(&f.client.id()));

    f.beetle.remove_device(f.client.id());
    assert!(!f.server.handles.lock().unwrap().get(&CHAR_VALUE).unwrap().subscribers.contains(&f.client.id()));
    assert!(f.beetle.devices.read().unwrap().get(&f.client.id()).is_none());

    // A second client mapped to the server loses that mapping once the
    // server itself is removed.
    let other_id = f.beetle.next_device_id();
    let (other, _other_rx) = make_device(other_id, "client-2", DeviceType::TcpClient);
    let _ = f.beetle.add_device(other.clone());
    f.beetle.map_devices(f.server.id(), other_id);
    assert!(!other.hat.lock().unwrap().device_range(f.server.id()).is_null());

    f.beetle.remove_device(f.server.id());
    assert!(other.hat.lock().unwrap().device_range(f.server.id()).is_null());
    assert!(f.beetle.devices.read().unwrap().get(&f.server.id()).is_none());
}
