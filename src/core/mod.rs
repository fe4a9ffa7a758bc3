//! Core layer - cache description and frame delivery.
//!
//! This module provides:
//! - [`CacheDescriptor`] / [`CacheChannel`] - Parsed `<basename>.xml` descriptor
//! - [`CacheLayout`] / [`ChannelFormat`] - Tagged file layout and sample format
//! - [`FrameSink`] / [`VertexFrame`] - Where decoded frames go
//! - [`FrameStore`] - In-memory sink
//! - Tick/second conversion and frame bucketing

mod descriptor;
mod sink;
pub mod time;

pub use descriptor::{
    parse_descriptor, CacheChannel, CacheDescriptor, CacheLayout, ChannelFormat,
    MAX_CACHE_VERSION, ROOT_ELEMENT,
};
pub use sink::{FrameSink, FrameStore, VertexFrame};
pub use time::{frame_index, Chrono, TICKS_PER_SECOND};
