//! `.mc` cache writer.
//!
//! Produces caches the decoder reads back: a `<basename>.xml` descriptor plus
//! either one `<basename>.mc` or one `<basename>Frame<N>[Tick<M>].mc` per frame.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use byteorder::ByteOrder;
use glam::Vec3;

use super::format::*;
use crate::core::time::seconds_to_ticks;
use crate::core::{CacheDescriptor, CacheLayout, ChannelFormat};
use crate::util::{Error, Result};

/// One channel's positions for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData {
    pub name: String,
    pub format: ChannelFormat,
    pub positions: Vec<Vec3>,
}

impl ChannelData {
    pub fn new(name: impl Into<String>, format: ChannelFormat, positions: Vec<Vec3>) -> Self {
        Self {
            name: name.into(),
            format,
            positions,
        }
    }
}

/// All channels sampled at one time.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    /// Sample time in ticks (1/6000 s).
    pub ticks: i32,
    pub channels: Vec<ChannelData>,
}

impl FrameData {
    pub fn new(ticks: i32, channels: Vec<ChannelData>) -> Self {
        Self { ticks, channels }
    }
}

/// In-memory `.mc` stream builder.
pub struct McWriter<B: ByteOrder> {
    buf: Vec<u8>,
    _order: PhantomData<B>,
}

impl<B: ByteOrder> Default for McWriter<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ByteOrder> McWriter<B> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            _order: PhantomData,
        }
    }

    #[inline]
    fn tag(&mut self, tag: Tag) {
        self.buf.extend_from_slice(tag.as_bytes());
    }

    #[inline]
    fn u32(&mut self, value: u32) {
        let mut b = [0u8; 4];
        B::write_u32(&mut b, value);
        self.buf.extend_from_slice(&b);
    }

    #[inline]
    fn i32(&mut self, value: i32) {
        let mut b = [0u8; 4];
        B::write_i32(&mut b, value);
        self.buf.extend_from_slice(&b);
    }

    #[inline]
    fn f64(&mut self, value: f64) {
        let mut b = [0u8; 8];
        B::write_f64(&mut b, value);
        self.buf.extend_from_slice(&b);
    }

    fn pad(&mut self) {
        let len = self.buf.len();
        self.buf.resize(align4(len), 0);
    }

    /// Open a `FOR4` group; returns the position of its size field.
    fn begin_group(&mut self, kind: Tag) -> usize {
        self.tag(Tag::FOR4);
        let size_pos = self.buf.len();
        self.u32(0);
        self.tag(kind);
        size_pos
    }

    /// Patch the size of a group opened with [`begin_group`](Self::begin_group).
    fn end_group(&mut self, size_pos: usize) {
        let size = (self.buf.len() - size_pos - 4) as u32;
        B::write_u32(&mut self.buf[size_pos..size_pos + 4], size);
    }

    /// Write the `FOR4`/`CACH` header group.
    pub fn write_header(&mut self, version: &str, start_ticks: f64, end_ticks: f64) {
        let group = self.begin_group(Tag::CACH);
        self.tag(Tag::VRSN);
        let mut field = [0u8; HEADER_FIELD_SIZE];
        let n = version.len().min(HEADER_FIELD_SIZE - 1);
        field[..n].copy_from_slice(&version.as_bytes()[..n]);
        self.buf.extend_from_slice(&field);
        self.tag(Tag::STIM);
        self.f64(start_ticks);
        self.tag(Tag::ETIM);
        self.f64(end_ticks);
        self.end_group(group);
    }

    /// Write one `FOR4`/`MYCH` frame group. Per-frame files carry no `TIME`.
    pub fn write_frame(&mut self, time_ticks: Option<i32>, channels: &[ChannelData]) {
        let group = self.begin_group(Tag::MYCH);
        if let Some(ticks) = time_ticks {
            self.tag(Tag::TIME);
            self.u32(VALUE_SIZE_FIELD);
            self.i32(ticks);
        }
        for channel in channels {
            self.write_record(channel);
        }
        self.end_group(group);
    }

    /// Write a single channel record.
    pub fn write_record(&mut self, channel: &ChannelData) {
        self.tag(Tag::CHNM);
        self.u32(channel.name.len() as u32 + 1);
        self.buf.extend_from_slice(channel.name.as_bytes());
        self.buf.push(0);
        self.pad();

        self.tag(Tag::SIZE);
        self.u32(VALUE_SIZE_FIELD);
        self.u32(channel.positions.len() as u32);

        let word = channel.format.word_size();
        self.tag(channel.format.tag());
        self.u32((channel.positions.len() * 3 * word) as u32);
        let floats: &[f32] = bytemuck::cast_slice(channel.positions.as_slice());
        match channel.format {
            ChannelFormat::Float3Array => {
                let start = self.buf.len();
                self.buf.resize(start + floats.len() * 4, 0);
                B::write_f32_into(floats, &mut self.buf[start..]);
            }
            ChannelFormat::Double3Array => {
                let doubles: Vec<f64> = floats.iter().map(|&v| v as f64).collect();
                let start = self.buf.len();
                self.buf.resize(start + doubles.len() * 8, 0);
                B::write_f64_into(&doubles, &mut self.buf[start..]);
            }
        }
        self.pad();
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// File name of a per-frame data file.
pub fn frame_file_name(base_name: &str, frame: u32, tick: u32) -> String {
    if tick == 0 {
        format!("{}Frame{}.{}", base_name, frame, DATA_EXTENSION)
    } else {
        format!("{}Frame{}Tick{}.{}", base_name, frame, tick, DATA_EXTENSION)
    }
}

/// Write a complete cache (descriptor and data files) into `dir`.
///
/// Returns the paths written, descriptor first.
pub fn write_cache<B: ByteOrder>(
    dir: impl AsRef<Path>,
    base_name: &str,
    descriptor: &CacheDescriptor,
    frames: &[FrameData],
) -> Result<Vec<PathBuf>> {
    descriptor.validate()?;
    let dir = dir.as_ref();
    let mut written = Vec::new();

    let xml_path = dir.join(format!("{}.{}", base_name, DESCRIPTOR_EXTENSION));
    std::fs::write(&xml_path, descriptor.to_xml()?)?;
    written.push(xml_path);

    let version = format!("{:.1}", descriptor.version());
    let start = seconds_to_ticks(descriptor.start_time()) as f64;
    let end = seconds_to_ticks(descriptor.end_time()) as f64;

    match descriptor.layout() {
        CacheLayout::OneFile => {
            let mut w = McWriter::<B>::new();
            w.write_header(&version, start, end);
            for frame in frames {
                w.write_frame(Some(frame.ticks), &frame.channels);
            }
            let path = dir.join(format!("{}.{}", base_name, DATA_EXTENSION));
            std::fs::write(&path, w.into_bytes())?;
            written.push(path);
        }
        CacheLayout::OneFilePerFrame => {
            let tpf = seconds_to_ticks(descriptor.time_per_frame());
            for frame in frames {
                let ticks = frame.ticks as i64;
                if ticks < 0 || tpf <= 0 {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("cannot name a frame file for time {} ticks", ticks),
                    )));
                }
                let name = frame_file_name(base_name, (ticks / tpf) as u32, (ticks % tpf) as u32);
                let mut w = McWriter::<B>::new();
                w.write_header(&version, start, end);
                w.write_frame(None, &frame.channels);
                let path = dir.join(name);
                std::fs::write(&path, w.into_bytes())?;
                written.push(path);
            }
        }
    }

    Ok(written)
}
