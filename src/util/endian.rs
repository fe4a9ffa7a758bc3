//! Byte order selection for `.mc` streams.
//!
//! Maya writes its caches big-endian. The order is picked once per decode and
//! turned into a `byteorder::ByteOrder` type parameter, so a single stream can
//! never mix orders.

/// Byte order of multi-byte values in a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Most significant byte first (Maya's native order).
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

impl std::fmt::Display for Endian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Big => f.write_str("big-endian"),
            Self::Little => f.write_str("little-endian"),
        }
    }
}

/// Run `$body` with `$B` bound to the `byteorder` type matching `$endian`.
///
/// ```ignore
/// with_byte_order!(options.endian, B => decode_one_file::<B>(data.bytes(), &mut decoder))
/// ```
#[macro_export]
macro_rules! with_byte_order {
    ($endian:expr, $B:ident => $body:expr) => {
        match $endian {
            $crate::util::Endian::Big => {
                type $B = ::byteorder::BigEndian;
                $body
            }
            $crate::util::Endian::Little => {
                type $B = ::byteorder::LittleEndian;
                $body
            }
        }
    };
}
