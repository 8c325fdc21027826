//! Crate-wide error types that sit above the per-subsystem ones: `HatError`
//! and `DeviceError` describe what each owning module can fail with;
//! `RouterError`/`RegistryError` wrap those (plus `UnknownDevice`) for the
//! two components that cross subsystem boundaries in a single operation.

use thiserror::Error;

use crate::device::DeviceId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum HatError {
    #[error("no free block left to reserve")]
    NoFreeBlock,
    #[error("handle range is invalid")]
    InvalidRange,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device is stopped")]
    Stopped,
    #[error("device already started")]
    AlreadyStarted,
    #[error("transaction was aborted by device teardown")]
    TransactionAborted,
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Hat(#[from] HatError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("no such device: {0:?}")]
    UnknownDevice(DeviceId),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Hat(#[from] HatError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("no such device: {0:?}")]
    UnknownDevice(DeviceId),
}

/// The crate-wide error for operations that can fail in more than one
/// subsystem at once (currently none of the library's own public functions
/// need this; it exists for embedding applications that want one error type
/// across `Beetle`'s public surface).
#[derive(Debug, Error)]
pub enum BeetleError {
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Att(#[from] crate::att::AttError),
}
