//! The 16-bit ATT handle type and the inclusive range helper used by the HAT
//! and by every discovery-walk router path.

use std::fmt;
use std::ops::RangeInclusive;

/// A nonzero 16-bit attribute handle. `0x0000` is reserved and never valid on
/// the wire; use `AttHandle::NULL` to represent "no handle" in Rust code.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttHandle(u16);

impl AttHandle {
    pub const NULL: AttHandle = AttHandle(0);
    pub const MIN: AttHandle = AttHandle(1);
    pub const MAX: AttHandle = AttHandle(0xFFFF);

    pub fn new(raw: u16) -> Self {
        AttHandle(raw)
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, n: u16) -> Option<AttHandle> {
        self.0.checked_add(n).map(AttHandle)
    }
}

impl fmt::Debug for AttHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttHandle({:#06X})", self.0)
    }
}

/// A handle range as it appears unvalidated on the wire: `start` and `end`
/// taken verbatim from the request.
#[derive(Copy, Clone, Debug)]
pub struct RawHandleRange {
    pub start: AttHandle,
    pub end: AttHandle,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid handle range: start={start:?} end={end:?}")]
pub struct InvalidHandleRange {
    pub start: AttHandle,
    pub end: AttHandle,
}

impl RawHandleRange {
    /// Validates `start != 0 && start <= end`, matching the original
    /// gateway's request-validation rule for every handle-range request.
    pub fn check(self) -> Result<HandleRange, InvalidHandleRange> {
        if self.start.is_null() || self.start > self.end {
            Err(InvalidHandleRange {
                start: self.start,
                end: self.end,
            })
        } else {
            Ok(HandleRange(self.start..=self.end))
        }
    }
}

/// A validated, non-empty inclusive handle range.
#[derive(Clone, Debug)]
pub struct HandleRange(pub RangeInclusive<AttHandle>);

impl HandleRange {
    pub fn start(&self) -> AttHandle {
        *self.0.start()
    }

    pub fn end(&self) -> AttHandle {
        *self.0.end()
    }

    pub fn contains(&self, h: AttHandle) -> bool {
        self.0.contains(&h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_null_start() {
        let raw = RawHandleRange {
            start: AttHandle::NULL,
            end: AttHandle::new(5),
        };
        assert!(raw.check().is_err());
    }

    #[test]
    fn rejects_start_after_end() {
        let raw = RawHandleRange {
            start: AttHandle::new(5),
            end: AttHandle::new(4),
        };
        assert!(raw.check().is_err());
    }

    #[test]
    fn accepts_valid_range() {
        let raw = RawHandleRange {
            start: AttHandle::new(1),
            end: AttHandle::new(1),
        };
        let range = raw.check().unwrap();
        assert!(range.contains(AttHandle::new(1)));
    }
}
