//! `.mc` chunk tags and layout constants.

use std::fmt;

/// Four-character chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Group block with 32-bit sizes.
    pub const FOR4: Tag = Tag(*b"FOR4");
    /// Header group type.
    pub const CACH: Tag = Tag(*b"CACH");
    /// Cache format version string.
    pub const VRSN: Tag = Tag(*b"VRSN");
    /// Cache start time.
    pub const STIM: Tag = Tag(*b"STIM");
    /// Cache end time.
    pub const ETIM: Tag = Tag(*b"ETIM");
    /// Per-frame group type.
    pub const MYCH: Tag = Tag(*b"MYCH");
    /// Frame time in ticks.
    pub const TIME: Tag = Tag(*b"TIME");
    /// Channel name.
    pub const CHNM: Tag = Tag(*b"CHNM");
    /// Array length.
    pub const SIZE: Tag = Tag(*b"SIZE");
    /// Float vector array.
    pub const FVCA: Tag = Tag(*b"FVCA");
    /// Double vector array.
    pub const DVCA: Tag = Tag(*b"DVCA");

    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self)
    }
}

/// Size in bytes of a chunk tag.
pub const TAG_SIZE: usize = 4;

/// Size in bytes of the payload of `VRSN`, `STIM` and `ETIM`.
pub const HEADER_FIELD_SIZE: usize = 8;

/// `SIZE` and `TIME` carry a 4-byte size-of-value before the value.
pub const VALUE_SIZE_FIELD: u32 = 4;

/// Chunks are aligned to this many bytes.
pub const CHUNK_ALIGNMENT: usize = 4;

/// Round `n` up to the chunk alignment.
#[inline]
pub const fn align4(n: usize) -> usize {
    (n + CHUNK_ALIGNMENT - 1) & !(CHUNK_ALIGNMENT - 1)
}

/// Extension of binary cache files.
pub const DATA_EXTENSION: &str = "mc";

/// Extension of descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "xml";
