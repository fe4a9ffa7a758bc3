//! Channel record decoding.
//!
//! A channel record holds one channel's vertex positions for one frame:
//!
//! ```text
//! CHNM  u32 name length (incl. NUL)  name, NUL-padded to 4 bytes
//! SIZE  u32 4                        u32 array length
//! FVCA|DVCA  u32 buffer length       array length x 3 x (f32|f64)
//! ```

use byteorder::ByteOrder;
use glam::Vec3;
use tracing::{debug, trace, warn};

use super::format::*;
use super::reader::ChunkReader;
use crate::core::{frame_index, CacheDescriptor, ChannelFormat, Chrono, FrameSink, VertexFrame};
use crate::util::{Error, Result};

/// Counters accumulated while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Channel records read.
    pub records: usize,
    /// Records handed to the sink.
    pub delivered: usize,
    /// Records dropped because they fall before their channel's start.
    pub skipped_negative: usize,
}

/// Decodes channel records against a descriptor and feeds them to a sink.
pub struct FrameDecoder<'d> {
    descriptor: &'d CacheDescriptor,
    sink: &'d dyn FrameSink,
    stats: DecodeStats,
}

impl<'d> FrameDecoder<'d> {
    pub fn new(descriptor: &'d CacheDescriptor, sink: &'d dyn FrameSink) -> Self {
        Self {
            descriptor,
            sink,
            stats: DecodeStats::default(),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &'d CacheDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Decode one channel record sampled at `time` and deliver it.
    ///
    /// Returns the number of bytes consumed. On error nothing is delivered
    /// for this record and the reader position is unspecified.
    pub fn decode_record<B: ByteOrder>(
        &mut self,
        reader: &mut ChunkReader<'_, B>,
        time: Chrono,
    ) -> Result<usize> {
        let start = reader.position();

        // Channel name
        reader.expect_tag(Tag::CHNM)?;
        let name_len = reader.read_len()?;
        if name_len == 0 {
            return Err(Error::size_mismatch("CHNM name length", 0, 1));
        }
        let name_bytes = reader.take(align4(name_len))?;
        let name = decode_name(&name_bytes[..name_len - 1]);
        let channel = self.descriptor.channel(&name).ok_or_else(|| Error::UnknownChannel {
            name: name.clone(),
            offset: start as u64,
        })?;

        // Array length
        reader.expect_tag(Tag::SIZE)?;
        let size_of_size = reader.read_u32()?;
        if size_of_size != VALUE_SIZE_FIELD {
            return Err(Error::size_mismatch(
                format!("SIZE field of channel {:?}", name),
                size_of_size as u64,
                VALUE_SIZE_FIELD as u64,
            ));
        }
        let array_len = reader.read_len()?;

        // Sample data
        let format_offset = reader.position() as u64;
        let format_tag = reader.read_tag()?;
        let format = ChannelFormat::from_tag(format_tag).ok_or_else(|| Error::UnknownDataFormatTag {
            tag: format_tag.to_string(),
            offset: format_offset,
        })?;
        let buffer_len = reader.read_len()? as u64;
        let expected = array_len as u64 * 3 * format.word_size() as u64;
        if buffer_len != expected {
            return Err(Error::size_mismatch(
                format!("{} buffer of channel {:?}", format_tag, name),
                buffer_len,
                expected,
            ));
        }
        let buffer_len = buffer_len as usize;
        let data = reader.take(buffer_len)?;
        reader.skip(align4(buffer_len) - buffer_len)?;
        let positions = read_vectors::<B>(data, format, array_len);

        if let Some(declared) = channel.declared_format() {
            if declared != format {
                debug!(
                    "channel {:?} declared as {} but stored as {}",
                    name,
                    declared.type_name(),
                    format.type_name()
                );
            }
        }

        self.stats.records += 1;
        let index = frame_index(time, self.descriptor.time_per_frame(), channel.start_time);
        if index < 0 {
            warn!(
                "channel {:?} sample at {:.4}s precedes channel start {:.4}s, skipped",
                name, time, channel.start_time
            );
            self.stats.skipped_negative += 1;
        } else {
            trace!(channel = %name, index, time, vertices = array_len, "frame");
            self.sink.set_source(VertexFrame::new(index as usize, name, positions));
            self.stats.delivered += 1;
        }

        Ok(reader.position() - start)
    }
}

/// Channel names are ASCII; tolerate extra NUL padding and stray bytes.
fn decode_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Convert raw sample bytes to vertex rows, narrowing doubles to f32.
fn read_vectors<B: ByteOrder>(data: &[u8], format: ChannelFormat, count: usize) -> Vec<Vec3> {
    let mut positions = vec![Vec3::ZERO; count];
    match format {
        ChannelFormat::Float3Array => {
            B::read_f32_into(data, bytemuck::cast_slice_mut(positions.as_mut_slice()));
        }
        ChannelFormat::Double3Array => {
            let mut doubles = vec![0.0f64; count * 3];
            B::read_f64_into(data, &mut doubles);
            for (dst, src) in positions.iter_mut().zip(doubles.chunks_exact(3)) {
                *dst = Vec3::new(src[0] as f32, src[1] as f32, src[2] as f32);
            }
        }
    }
    positions
}
