//! Loading caches into sinks.
//!
//! - [`CacheFile`] - A parsed descriptor and the location of its data files
//! - [`load_file`] - Synchronous one-shot load
//! - [`LoadScheduler`] / [`DecodeJob`] - Serial background loading with a
//!   fail-fast halt latch

mod cache_file;
mod scheduler;

pub use cache_file::*;
pub use scheduler::*;
