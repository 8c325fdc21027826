//! 128-bit UUID value type used for attribute types, with the short/long
//! duality the Bluetooth SIG defines for its own assigned numbers.
//!
//! Canonical form is 16 bytes. A UUID is *short* iff bytes 0–1 are zero and
//! bytes 4–15 equal the Bluetooth base UUID suffix; the 16-bit short value
//! lives at bytes 2–3, big-endian. This layout (and not a naive 16→32→128-bit
//! zero-extension chain) is what the Bluetooth base UUID actually requires;
//! see DESIGN.md for why this diverges from this crate's teacher lineage.

use std::fmt;

/// Bluetooth base UUID suffix, `0000-1000-8000-00805F9B34FB`, stored as the
/// last 12 bytes of the canonical 16-byte form.
const BASE_UUID_SUFFIX: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid(pub [u8; 16]);

#[derive(Debug, thiserror::Error)]
pub enum UuidParseError {
    #[error("UUID string must have 4 or 32 hex digits, found {0}")]
    BadLength(usize),
    #[error("UUID string contains non-hex characters")]
    NotHex,
}

impl Uuid {
    /// Builds a canonical UUID from a 16-bit short value.
    pub const fn from_u16(short: u16) -> Self {
        let mut bytes = [0u8; 16];
        bytes[2] = (short >> 8) as u8;
        bytes[3] = short as u8;
        let suffix = BASE_UUID_SUFFIX;
        let mut i = 0;
        while i < 12 {
            bytes[4 + i] = suffix[i];
            i += 1;
        }
        Uuid(bytes)
    }

    /// Builds a canonical UUID from a raw 16-byte value.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Uuid(bytes)
    }

    /// Parses either a 2-byte short form or a 16-byte long form, matching the
    /// original gateway's `UUID(uint8_t*, size_t)` constructor.
    pub fn from_slice(value: &[u8]) -> Option<Self> {
        match value.len() {
            2 => Some(Self::from_u16(u16::from_be_bytes([value[0], value[1]]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(value);
                Some(Uuid(bytes))
            }
            _ => None,
        }
    }

    /// Parses a hex string, with or without dashes, 4 or 32 hex digits.
    pub fn parse(s: &str) -> Result<Self, UuidParseError> {
        let stripped: String = s.chars().filter(|c| *c != '-').collect();
        let digits = stripped.len();
        if digits != 4 && digits != 32 {
            return Err(UuidParseError::BadLength(digits));
        }
        let mut raw = Vec::with_capacity(digits / 2);
        let chars: Vec<char> = stripped.chars().collect();
        for pair in chars.chunks(2) {
            let s: String = pair.iter().collect();
            let byte = u8::from_str_radix(&s, 16).map_err(|_| UuidParseError::NotHex)?;
            raw.push(byte);
        }
        Self::from_slice(&raw).ok_or(UuidParseError::BadLength(digits))
    }

    pub fn is_short(&self) -> bool {
        self.0[0] == 0 && self.0[1] == 0 && self.0[4..16] == BASE_UUID_SUFFIX
    }

    /// Returns the 16-bit short value if this UUID is short.
    pub fn short(&self) -> Option<u16> {
        if self.is_short() {
            Some(u16::from_be_bytes([self.0[2], self.0[3]]))
        } else {
            None
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.0
    }

    /// Serializes on the wire: 2 little-endian bytes if short, else 16 raw
    /// bytes, matching the ATT codec's convention for attribute types.
    pub fn to_wire(&self) -> Vec<u8> {
        match self.short() {
            Some(short) => short.to_le_bytes().to_vec(),
            None => self.0.to_vec(),
        }
    }

    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            2 => Some(Self::from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            16 => Self::from_slice(bytes),
            _ => None,
        }
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(short) = self.short() {
            write!(f, "Uuid16({:#06X})", short)
        } else {
            let b = &self.0;
            write!(
                f,
                "Uuid128({:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x})",
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
            )
        }
    }
}

/// GATT-assigned UUIDs the router and internal device need by name.
pub mod well_known {
    use super::Uuid;

    pub const PRIMARY_SERVICE: Uuid = Uuid::from_u16(0x2800);
    pub const CHARACTERISTIC: Uuid = Uuid::from_u16(0x2803);
    pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = Uuid::from_u16(0x2902);
    pub const GAP_SERVICE: Uuid = Uuid::from_u16(0x1800);
    pub const GAP_DEVICE_NAME: Uuid = Uuid::from_u16(0x2A00);
    pub const GATT_SERVICE: Uuid = Uuid::from_u16(0x1801);
    pub const GATT_SERVICE_CHANGED: Uuid = Uuid::from_u16(0x2A05);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_round_trips() {
        let u = Uuid::from_u16(0x1800);
        assert_eq!(u.short(), Some(0x1800));
        assert!(u.is_short());
        assert_eq!(Uuid::from_slice(&u.to_bytes()).unwrap(), u);
    }

    #[test]
    fn long_is_not_short() {
        let bytes: [u8; 16] = [
            0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
            0x77, 0x88,
        ];
        let u = Uuid::from_bytes(bytes);
        assert!(!u.is_short());
        assert_eq!(u.short(), None);
    }

    #[test]
    fn parse_short_hex_string() {
        let u = Uuid::parse("2800").unwrap();
        assert_eq!(u, Uuid::from_u16(0x2800));
    }

    #[test]
    fn parse_long_hex_string_with_dashes() {
        let u = Uuid::parse("12345678-9abc-def0-1122-334455667788").unwrap();
        assert_eq!(u.short(), None);
    }

    #[test]
    fn base_uuid_layout_matches_bluetooth_sig() {
        // Bytes 2-3 carry the short value, not bytes 0-1.
        let u = Uuid::from_u16(0x00FF);
        assert_eq!(u.0[2], 0x00);
        assert_eq!(u.0[3], 0xFF);
        assert_eq!(&u.0[4..16], &BASE_UUID_SUFFIX[..]);
    }
}
