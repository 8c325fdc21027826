//! Beetle: a BLE GATT virtualization gateway. Maps a real peripheral's
//! attribute table into the handle space of any number of clients at once,
//! routing requests, responses, and notifications between them under a
//! single, explicit lock order (see `router`).
//!
//! `Beetle` (in `registry`) owns the device table and the worker pools;
//! `Device` (in `device`) is the per-connection state machine every endpoint
//! is modeled as; `Router` dispatches inbound PDUs that a device didn't
//! already answer itself. Transports, access control, and network discovery
//! are trait seams an embedding application supplies.

#[macro_use]
mod utils;

pub mod access;
pub mod att;
pub mod config;
pub mod device;
pub mod error;
pub mod handle;
pub mod handshake;
pub mod hat;
pub mod internal_device;
pub mod registry;
pub mod router;
pub mod sync;
pub mod transport;
pub mod uuid;

pub use access::AccessControl;
pub use config::GatewayConfig;
pub use device::{Device, DeviceId, DeviceType};
pub use registry::Beetle;
pub use router::Router;
pub use transport::{NetworkDiscoveryClient, Transport};
