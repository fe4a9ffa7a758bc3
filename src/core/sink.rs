//! Destination of decoded frames.
//!
//! The decoder pushes every channel record it reads into a [`FrameSink`] as a
//! [`VertexFrame`]. [`FrameStore`] is a ready-made sink that keeps every frame
//! in memory, keyed by channel and frame index.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;

use super::time::Chrono;

/// Vertex positions of one channel at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexFrame {
    /// Frame bucket the samples belong to.
    pub index: usize,
    /// Channel the samples were read from.
    pub channel: String,
    /// One row per vertex.
    pub positions: Vec<Vec3>,
}

impl VertexFrame {
    pub fn new(index: usize, channel: impl Into<String>, positions: Vec<Vec3>) -> Self {
        Self {
            index,
            channel: channel.into(),
            positions,
        }
    }

    /// Number of vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions as a flat `x, y, z, x, y, z, ...` buffer.
    #[inline]
    pub fn as_floats(&self) -> &[f32] {
        bytemuck::cast_slice(self.positions.as_slice())
    }
}

/// Receiver of decoded frames, typically a mesh animation player.
///
/// Methods take `&self`: a sink is shared between the caller and the
/// background loader, so implementations use interior mutability.
pub trait FrameSink: Send + Sync {
    /// Seconds per frame. Called once before any frame is delivered.
    fn set_time_inc(&self, seconds: Chrono);

    /// Called with `false` before decoding starts and `true` once it succeeded.
    fn set_active(&self, active: bool);

    /// Store the vertex buffer for one channel and frame.
    fn set_source(&self, frame: VertexFrame);

    /// Display name of the sink, if it has one.
    fn name(&self) -> Option<String> {
        None
    }

    /// Called with `<basename>.meshanim` when the sink has no name yet.
    fn set_name(&self, _name: &str) {}
}

#[derive(Debug, Default)]
struct StoreInner {
    name: Option<String>,
    time_inc: Chrono,
    active: bool,
    frames: HashMap<String, BTreeMap<usize, Arc<[Vec3]>>>,
}

/// In-memory, time-indexed vertex buffer store.
#[derive(Debug, Default)]
pub struct FrameStore {
    inner: RwLock<StoreInner>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds per frame, as set by the decoder.
    pub fn time_inc(&self) -> Chrono {
        self.inner.read().time_inc
    }

    pub fn is_active(&self) -> bool {
        self.inner.read().active
    }

    /// Channel names that received at least one frame, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().frames.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of frames stored for a channel.
    pub fn num_frames(&self, channel: &str) -> usize {
        self.inner.read().frames.get(channel).map_or(0, BTreeMap::len)
    }

    /// Frame indices stored for a channel, ascending.
    pub fn frame_indices(&self, channel: &str) -> Vec<usize> {
        self.inner
            .read()
            .frames
            .get(channel)
            .map(|f| f.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Positions of a channel at a frame.
    pub fn frame(&self, channel: &str, index: usize) -> Option<Arc<[Vec3]>> {
        self.inner.read().frames.get(channel)?.get(&index).cloned()
    }

    /// Total number of stored frames across all channels.
    pub fn len(&self) -> usize {
        self.inner.read().frames.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameSink for FrameStore {
    fn set_time_inc(&self, seconds: Chrono) {
        self.inner.write().time_inc = seconds;
    }

    fn set_active(&self, active: bool) {
        self.inner.write().active = active;
    }

    fn set_source(&self, frame: VertexFrame) {
        let VertexFrame { index, channel, positions } = frame;
        self.inner
            .write()
            .frames
            .entry(channel)
            .or_default()
            .insert(index, positions.into());
    }

    fn name(&self) -> Option<String> {
        self.inner.read().name.clone()
    }

    fn set_name(&self, name: &str) {
        self.inner.write().name = Some(name.to_string());
    }
}
