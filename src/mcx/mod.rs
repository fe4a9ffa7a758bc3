//! Maya `.mc` binary cache format.
//!
//! Data files are big-endian (by default) streams of 4-byte-aligned chunks.
//!
//! ## File Structure
//!
//! ```text
//! +---------------------------+
//! | FOR4 size CACH            |  header group
//! |   VRSN  "0.1"             |  8-byte string
//! |   STIM  start ticks       |  f64
//! |   ETIM  end ticks         |  f64
//! +---------------------------+
//! | FOR4 size MYCH            |  one group per frame
//! |   TIME  4  ticks          |  absent in per-frame files
//! |   CHNM  len  name\0 pad   |
//! |   SIZE  4  array length   |  one record per channel
//! |   FVCA|DVCA  len  samples |
//! +---------------------------+
//! | ...                       |
//! +---------------------------+
//! ```
//!
//! Times are in ticks of 1/6000 second.

mod format;
mod reader;
mod decode;
mod layout;
pub mod writer;

pub use format::*;
pub use reader::*;
pub use decode::*;
pub use layout::*;
