//! # mcache
//!
//! Decoder for Maya geometry caches: a `<basename>.xml` descriptor plus one or
//! more chunk-tagged `.mc` data files holding per-frame vertex positions.
//!
//! ## Modules
//!
//! - [`util`] - Errors, byte order and load options
//! - [`core`] - Descriptor model, time bucketing and frame sinks
//! - [`mcx`] - Low-level `.mc` binary format (reader, decoder, writer)
//! - [`load`] - Cache files and the background load scheduler
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcache::prelude::*;
//!
//! let store = Arc::new(FrameStore::new());
//! let cache = CacheFile::open("cache/pSphere1.xml")?;
//!
//! let loader = LoadScheduler::new();
//! loader.submit(DecodeJob::new(cache, store.clone()).on_complete(|ev| {
//!     println!("{}: {} frames", ev.file_name, ev.summary.frames_delivered);
//! }))?;
//! ```

pub mod util;
pub mod core;
pub mod mcx;
pub mod load;

// Re-export commonly used types
pub use util::{Endian, Error, ErrorKind, LoadOptions, Result};
pub use load::{load_file, CacheFile};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Endian, Error, ErrorKind, LoadOptions, Result};
    pub use crate::core::{CacheChannel, CacheDescriptor, CacheLayout, ChannelFormat};
    pub use crate::core::{FrameSink, FrameStore, VertexFrame};
    pub use crate::mcx::LoadSummary;
    pub use crate::load::{load_file, CacheFile, DecodeJob, JobHandle, JobState, LoadScheduler};
}
