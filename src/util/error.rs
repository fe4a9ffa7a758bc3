//! Error types for the cache decoder.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`Error`], used for logging and by callers
/// that only care about which stage rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Descriptor XML could not be parsed or is missing required fields.
    XmlMalformed,
    /// Descriptor declares a cache version newer than 2.0.
    UnsupportedVersion,
    /// Descriptor names a layout other than `OneFile` / `OneFilePerFrame`.
    UnknownCacheType,
    /// An expected chunk tag was absent, or a channel name is unknown.
    ChunkTagMismatch,
    /// A declared length disagrees with the data it describes.
    SizeMismatch,
    /// A channel record uses a sample format other than `FVCA` / `DVCA`.
    UnknownDataFormatTag,
    /// File access failed or the stream ended in the middle of a chunk.
    IoFailure,
    /// The scheduler refused work because an earlier job failed.
    Halted,
    /// A job panicked (in the sink, the decoder or a callback).
    Panicked,
}

/// Main error type for cache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Descriptor XML is malformed or incomplete
    #[error("Malformed cache descriptor: {0}")]
    XmlMalformed(String),

    /// Descriptor version is newer than the decoder understands
    #[error("Unsupported cache version {0} (only 2.0 and lower can be parsed)")]
    UnsupportedVersion(f32),

    /// Unknown `cacheType` value
    #[error("Invalid cache file type: {0:?}")]
    UnknownCacheType(String),

    /// Expected tag not found at the given offset
    #[error("Expected chunk {expected} at offset {offset}, found {found}")]
    ChunkTagMismatch {
        expected: String,
        found: String,
        offset: u64,
    },

    /// Channel record names a channel the descriptor does not declare
    #[error("Channel {name:?} at offset {offset} is not declared in the descriptor")]
    UnknownChannel { name: String, offset: u64 },

    /// Declared length inconsistent with its payload
    #[error("Size inconsistency in {context}: declared {declared}, expected {expected}")]
    SizeMismatch {
        context: String,
        declared: u64,
        expected: u64,
    },

    /// Sample data tag is neither FVCA nor DVCA
    #[error("Unknown data tag {tag} at offset {offset}")]
    UnknownDataFormatTag { tag: String, offset: u64 },

    /// Stream ended inside a chunk
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// Scheduler is halted after an earlier failure
    #[error("Load aborted due to an earlier failure: {0}")]
    Halted(String),

    /// Job panicked on the loader thread
    #[error("Load job panicked: {0}")]
    Panicked(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::XmlMalformed(_) => ErrorKind::XmlMalformed,
            Self::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            Self::UnknownCacheType(_) => ErrorKind::UnknownCacheType,
            Self::ChunkTagMismatch { .. } | Self::UnknownChannel { .. } => {
                ErrorKind::ChunkTagMismatch
            }
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::UnknownDataFormatTag { .. } => ErrorKind::UnknownDataFormatTag,
            Self::UnexpectedEof(_)
            | Self::FileNotFound(_)
            | Self::MmapFailed(_)
            | Self::Io(_) => ErrorKind::IoFailure,
            Self::Halted(_) => ErrorKind::Halted,
            Self::Panicked(_) => ErrorKind::Panicked,
        }
    }

    /// Create a malformed-descriptor error.
    pub fn xml(msg: impl Into<String>) -> Self {
        Self::XmlMalformed(msg.into())
    }

    /// Create a size mismatch error.
    pub fn size_mismatch(context: impl Into<String>, declared: u64, expected: u64) -> Self {
        Self::SizeMismatch {
            context: context.into(),
            declared,
            expected,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Self::XmlMalformed(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlMalformed(e.to_string())
    }
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
