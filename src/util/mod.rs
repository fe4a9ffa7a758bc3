//! Utility types shared by the decoder.
//!
//! - [`Error`] / [`Result`] / [`ErrorKind`] - Error handling
//! - [`Endian`] - Byte order of the binary cache files
//! - [`LoadOptions`] - How data files are read

mod error;
mod endian;
mod options;

pub use error::*;
pub use endian::*;
pub use options::*;
