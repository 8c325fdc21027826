//! Small helpers shared across modules: an extensible "known value or raw"
//! enum macro, and a hex-dump `Debug` wrapper for byte slices.

use std::fmt;

/// Defines an enum that wraps a raw integer type, with a set of known named
/// variants and an `Unknown(raw)` catch-all, plus bidirectional `From` impls.
///
/// This mirrors the pattern used throughout embedded Rust network code (first
/// popularized by `smoltcp`) for wire enums that must round-trip any value the
/// wire format allows, including ones this crate doesn't special-case.
macro_rules! enum_with_unknown {
    (
        $(#[$enum_attr:meta])*
        pub enum $name:ident($ty:ty) {
            $( $(#[$variant_attr:meta])* $variant:ident = $value:expr ),+ $(,)*
        }
    ) => {
        $(#[$enum_attr])*
        pub enum $name {
            $( $(#[$variant_attr])* $variant ),+,
            /// An unrecognized value that still round-trips.
            Unknown($ty),
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),+,
                    other => $name::Unknown(other),
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),+,
                    $name::Unknown(other) => other,
                }
            }
        }
    }
}

/// A wrapper around a byte slice that formats as hex groups in `Debug`.
pub struct HexSlice<'a>(pub &'a [u8]);

impl<'a> fmt::Debug for HexSlice<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum_with_unknown! {
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub enum TestOp(u8) {
            A = 0x01,
            B = 0x02,
        }
    }

    #[test]
    fn enum_with_unknown_round_trips() {
        assert_eq!(TestOp::from(0x01), TestOp::A);
        assert_eq!(TestOp::from(0x7F), TestOp::Unknown(0x7F));
        assert_eq!(u8::from(TestOp::B), 0x02);
        assert_eq!(u8::from(TestOp::Unknown(0x55)), 0x55);
    }

    #[test]
    fn hex_slice_formats() {
        assert_eq!(format!("{:?}", HexSlice(&[0xDE, 0xAD])), "[DE AD]");
    }
}
