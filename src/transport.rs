//! The transport seam: what a virtual device needs from its underlying
//! connection, independent of whether that connection is a local L2CAP
//! socket, a TLS-wrapped TCP stream to another gateway, or a UNIX seqpacket.
//! Concrete transports are an embedding application's responsibility; this
//! module defines the interface and a channel-backed implementation for
//! tests.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;

use crate::device::DeviceId;
use crate::uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("transport failed to start: {0}")]
    StartFailed(String),
}

/// The write primitive a virtual device needs from its connection, plus a
/// hook run once at `start()`/`start_nd()` time for transport-specific setup.
pub trait Transport: Send + Sync {
    /// Writes one PDU. Returns `false` if the write failed (the device will
    /// transition to stopped and schedule its own removal).
    fn write(&self, buf: &[u8]) -> bool;

    fn start_internal(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A transport backed by an in-memory channel: every `write` is pushed onto
/// an `mpsc` channel the test can drain. Stands in for "some transport"
/// anywhere router/device logic needs one but a real socket would be out of
/// scope.
pub struct ChannelTransport {
    sender: Mutex<Sender<Vec<u8>>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            ChannelTransport {
                sender: Mutex::new(tx),
            },
            rx,
        )
    }
}

impl Transport for ChannelTransport {
    fn write(&self, buf: &[u8]) -> bool {
        self.sender.lock().unwrap().send(buf.to_vec()).is_ok()
    }
}

/// Models the HTTPS controller client / scanning-and-autoconnect surface
/// (`VirtualDevice::discoverNetworkServices` in the original). Referenced
/// only through this interface; no implementation ships here.
pub trait NetworkDiscoveryClient: Send + Sync {
    fn discover_services(&self, service_uuid: Uuid) -> Vec<DeviceId>;
}
