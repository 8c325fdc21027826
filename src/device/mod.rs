//! The virtual device: the per-connection object every endpoint (a real
//! peripheral, a local application, a remote gateway, or Beetle's own
//! simulated device) is modeled as. Owns a transaction queue, negotiated
//! MTU, and the `handles`/`hat` pair that map its attributes into the
//! gateway's shared handle space.

pub mod discovery;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use crate::att::pdus::{self, Opcode, DEFAULT_LE_MTU};
use crate::att::AttHandle;
use crate::hat::HandleAllocationTable;
use crate::handle::Handle;
use crate::sync::Semaphore;
use crate::transport::Transport;

/// A device identifier: monotonically allocated per gateway process, with
/// two reserved values.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(i32);

impl DeviceId {
    /// The gateway's own simulated device.
    pub const BEETLE: DeviceId = DeviceId(0);
    /// "No mapping" / "no such device".
    pub const NULL: DeviceId = DeviceId(-1);

    pub const fn new(raw: i32) -> Self {
        DeviceId(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_reserved(self) -> bool {
        self == DeviceId::BEETLE || self == DeviceId::NULL
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == DeviceId::BEETLE {
            write!(f, "DeviceId(BEETLE)")
        } else if *self == DeviceId::NULL {
            write!(f, "DeviceId(NULL)")
        } else {
            write!(f, "DeviceId({})", self.0)
        }
    }
}

/// Allocates fresh device ids starting at 1 (0 and -1 are reserved).
pub struct DeviceIdAllocator {
    next: AtomicI32,
}

impl Default for DeviceIdAllocator {
    fn default() -> Self {
        DeviceIdAllocator {
            next: AtomicI32::new(1),
        }
    }
}

impl DeviceIdAllocator {
    pub fn next(&self) -> DeviceId {
        DeviceId::new(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// The router-observable device type, used only for access-control
/// short-circuits (a `TcpClientProxy` is trusted to have done its own
/// checks; a `TcpServerProxy` is never a client subject).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceType {
    BeetleInternal,
    LePeripheral,
    TcpClient,
    IpcApplication,
    TcpClientProxy,
    TcpServerProxy,
    Unknown,
}

/// The outcome of handing a raw inbound PDU to a device: either the device
/// answered it locally (MTU negotiation, or it matched the outstanding
/// transaction), or it still needs to go to the router.
pub enum Inbound {
    Handled,
    Route,
}

/// What a pending transaction's callback receives: the peer's response, or
/// notice that the device tore down before one arrived.
pub enum TransactionResult {
    Response(Vec<u8>),
    Aborted,
}

type TransactionCallback = Box<dyn FnOnce(TransactionResult) + Send>;

struct Transaction {
    buf: Vec<u8>,
    cb: TransactionCallback,
}

#[derive(Default)]
struct TransactionState {
    current: Option<Transaction>,
    pending: VecDeque<Transaction>,
}

pub struct Device {
    id: DeviceId,
    name: Mutex<String>,
    device_type: DeviceType,
    is_endpoint: bool,
    started: AtomicBool,
    stopped: AtomicBool,
    mtu: AtomicU16,
    pub hat: Mutex<Box<dyn HandleAllocationTable>>,
    pub handles: Mutex<BTreeMap<u16, Handle>>,
    transaction: Mutex<TransactionState>,
    transport: Arc<dyn Transport>,
}

impl Device {
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        device_type: DeviceType,
        is_endpoint: bool,
        hat: Box<dyn HandleAllocationTable>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Device {
            id,
            name: Mutex::new(name.into()),
            device_type,
            is_endpoint,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            mtu: AtomicU16::new(DEFAULT_LE_MTU),
            hat: Mutex::new(hat),
            handles: Mutex::new(BTreeMap::new()),
            transaction: Mutex::new(TransactionState::default()),
            transport,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn is_endpoint(&self) -> bool {
        self.is_endpoint
    }

    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock().unwrap() = name.into();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn get_mtu(&self) -> u16 {
        self.mtu.load(Ordering::SeqCst).max(DEFAULT_LE_MTU)
    }

    /// Runs GATT discovery to populate `handles`, then sets `name` from the
    /// discovery result if it wasn't already set. Calling twice is a
    /// programming error, matching the original's `assert(started == false)`.
    pub fn start(self: &Arc<Self>) {
        assert!(
            !self.started.swap(true, Ordering::SeqCst),
            "Device::start called twice"
        );
        if let Err(e) = self.transport.start_internal() {
            log::warn!("device {:?} transport start failed: {}", self.id, e);
        }
        let discovered = discovery::discover_all_handles(self);
        if self.name().is_empty() {
            self.set_name(discovery::discover_device_name(self));
        }
        *self.handles.lock().unwrap() = discovered;
    }

    /// Same as `start` but skips discovery entirely.
    pub fn start_nd(&self) {
        assert!(
            !self.started.swap(true, Ordering::SeqCst),
            "Device::start_nd called twice"
        );
        if self.name().is_empty() {
            self.set_name("<unknown>");
        }
    }

    /// Idempotent: aborts the current and every pending transaction with
    /// `TransactionResult::Aborted`, then clears the handle table.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let aborted = {
            let mut state = self.transaction.lock().unwrap();
            let mut all: Vec<Transaction> = state.current.take().into_iter().collect();
            all.extend(state.pending.drain(..));
            all
        };
        for t in aborted {
            (t.cb)(TransactionResult::Aborted);
        }
        self.handles.lock().unwrap().clear();
    }

    pub fn write_command(&self, buf: &[u8]) -> bool {
        !self.is_stopped() && self.transport.write(buf)
    }

    pub fn write_response(&self, buf: &[u8]) -> bool {
        !self.is_stopped() && self.transport.write(buf)
    }

    /// Enqueues a request + callback. If there is no outstanding transaction
    /// it is sent immediately; otherwise it waits its turn. Returns `false`
    /// only if the device is stopped.
    pub fn write_transaction(&self, buf: Vec<u8>, cb: TransactionCallback) -> bool {
        if self.is_stopped() {
            return false;
        }
        let write_buf = buf.clone();
        let send_now = {
            let mut state = self.transaction.lock().unwrap();
            if state.current.is_none() {
                state.current = Some(Transaction { buf, cb });
                true
            } else {
                state.pending.push_back(Transaction { buf, cb });
                false
            }
        };
        if send_now && !self.transport.write(&write_buf) {
            log::error!("device {:?} failed to write outstanding transaction", self.id);
        }
        true
    }

    /// Synchronous wrapper over `write_transaction` using a semaphore.
    pub fn write_transaction_blocking(&self, buf: Vec<u8>) -> Option<Vec<u8>> {
        if self.is_stopped() {
            return None;
        }
        let sema = Arc::new(Semaphore::new(0));
        let slot: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
        let sema2 = sema.clone();
        let slot2 = slot.clone();
        let enqueued = self.write_transaction(
            buf,
            Box::new(move |result| {
                if let TransactionResult::Response(v) = result {
                    *slot2.lock().unwrap() = Some(v);
                }
                sema2.notify();
            }),
        );
        if !enqueued {
            return None;
        }
        sema.wait();
        slot.lock().unwrap().take()
    }

    /// Matches a response against the outstanding transaction, dispatches the
    /// next pending one (if any) under the lock, then invokes the original
    /// callback *outside* the lock.
    pub fn handle_transaction_response(&self, buf: &[u8]) {
        let finished = {
            let mut state = self.transaction.lock().unwrap();
            match state.current.take() {
                None => {
                    log::warn!("device {:?} got a response with no outstanding transaction", self.id);
                    return;
                }
                Some(finished) => {
                    if let Some(next) = state.pending.pop_front() {
                        let next_buf = next.buf.clone();
                        state.current = Some(next);
                        drop(state);
                        if !self.transport.write(&next_buf) {
                            log::error!("device {:?} failed to write next queued transaction", self.id);
                        }
                    }
                    finished
                }
            }
        };
        (finished.cb)(TransactionResult::Response(buf.to_vec()));
    }

    /// Handles MTU negotiation and response matching locally; anything else
    /// is a request the caller must hand to the router.
    pub fn handle_inbound(&self, buf: &[u8]) -> Inbound {
        let opcode = match pdus::opcode_of(buf) {
            Some(op) => op,
            None => return Inbound::Route,
        };
        if opcode == Opcode::ExchangeMtuReq {
            if let Some(requested) = pdus::parse_mtu_req(buf) {
                self.mtu.store(requested.min(DEFAULT_LE_MTU), Ordering::SeqCst);
            }
            self.write_response(&pdus::pack_mtu_rsp(DEFAULT_LE_MTU));
            return Inbound::Handled;
        }
        if opcode.is_response() {
            self.handle_transaction_response(buf);
            return Inbound::Handled;
        }
        Inbound::Route
    }

    pub fn highest_handle(&self) -> Option<AttHandle> {
        self.handles
            .lock()
            .unwrap()
            .keys()
            .next_back()
            .copied()
            .map(AttHandle::new)
    }

    /// Removes every subscription `who` holds across this device's handles;
    /// for every characteristic whose subscriber count just dropped to zero,
    /// fires a best-effort CCCD-disable write back to the peer.
    pub fn unsubscribe_all(&self, who: DeviceId) {
        let mut char_handles_to_disable = Vec::new();
        {
            let mut handles = self.handles.lock().unwrap();
            for h in handles.values_mut() {
                if h.variant == crate::handle::HandleVariant::CharacteristicValue
                    && h.subscribers.remove(&who)
                    && h.subscribers.is_empty()
                {
                    if let Some(char_handle) = h.char_handle {
                        char_handles_to_disable.push(char_handle);
                    }
                }
            }
        }
        let cccd_handles: Vec<AttHandle> = {
            let handles = self.handles.lock().unwrap();
            handles
                .values()
                .filter(|h| {
                    h.variant == crate::handle::HandleVariant::ClientCharCfg
                        && h.char_handle
                            .map(|ch| char_handles_to_disable.contains(&ch))
                            .unwrap_or(false)
                })
                .map(|h| h.handle)
                .collect()
        };
        for cccd in cccd_handles {
            let mut buf = vec![0u8; 5];
            buf[0] = u8::from(Opcode::WriteReq);
            pdus::set_handle_field(&mut buf, cccd);
            self.write_transaction(buf, Box::new(|_| {}));
        }
    }
}
