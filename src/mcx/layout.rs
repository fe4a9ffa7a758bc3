//! File layout strategies.
//!
//! `OneFile` caches keep every frame in `<basename>.mc`, each frame block
//! stamped with a `TIME` chunk. `OneFilePerFrame` caches keep one file per
//! frame and encode the time in the file name instead.

use std::path::{Path, PathBuf};

use byteorder::ByteOrder;
use tracing::{debug, trace, warn};

use super::decode::FrameDecoder;
use super::format::*;
use super::reader::{CacheData, ChunkReader};
use crate::core::time::{frame_file_time, ticks_to_seconds};
use crate::core::{CacheDescriptor, CacheLayout, Chrono, FrameSink};
use crate::util::{Error, LoadOptions, Result};

/// Contents of the `FOR4`/`CACH` header group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheHeader {
    /// `VRSN` string, e.g. `0.1`.
    pub version: Option<String>,
    /// `STIM`, in ticks.
    pub start_ticks: Option<f64>,
    /// `ETIM`, in ticks.
    pub end_ticks: Option<f64>,
}

/// What a decode run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    /// Data files decoded.
    pub files_read: usize,
    /// Channel records read.
    pub records: usize,
    /// Records delivered to the sink.
    pub frames_delivered: usize,
    /// Records dropped for falling before their channel start.
    pub skipped_records: usize,
    /// Frame files whose names carry no usable frame number.
    pub skipped_files: Vec<PathBuf>,
    /// Header of the first data file.
    pub header: Option<CacheHeader>,
}

/// Read the header group: `FOR4 size CACH [VRSN] [STIM] [ETIM]`.
pub fn read_header<B: ByteOrder>(reader: &mut ChunkReader<'_, B>) -> Result<CacheHeader> {
    reader.expect_tag(Tag::FOR4)?;
    let declared = reader.read_len()?;
    let start = reader.position();
    reader.expect_tag(Tag::CACH)?;

    let mut header = CacheHeader::default();
    if reader.peek_tag() == Some(Tag::VRSN) {
        reader.skip(TAG_SIZE)?;
        let raw = reader.take(HEADER_FIELD_SIZE)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        header.version = Some(String::from_utf8_lossy(&raw[..end]).trim().to_string());
    }
    if reader.peek_tag() == Some(Tag::STIM) {
        reader.skip(TAG_SIZE)?;
        header.start_ticks = Some(reader.read_f64()?);
    }
    if reader.peek_tag() == Some(Tag::ETIM) {
        reader.skip(TAG_SIZE)?;
        header.end_ticks = Some(reader.read_f64()?);
    }

    let consumed = reader.position() - start;
    if consumed != declared {
        debug!("header group declares {} bytes, read {}", declared, consumed);
    }
    Ok(header)
}

/// Decode channel records of a `MYCH` block until `block_size` bytes,
/// counted from `block_start`, have been consumed.
fn decode_block<B: ByteOrder>(
    reader: &mut ChunkReader<'_, B>,
    decoder: &mut FrameDecoder<'_>,
    time: Chrono,
    block_start: usize,
    block_size: usize,
) -> Result<()> {
    while reader.position() - block_start < block_size {
        decoder.decode_record(reader, time)?;
    }
    let consumed = reader.position() - block_start;
    if consumed != block_size {
        return Err(Error::size_mismatch("FOR4 frame block", block_size as u64, consumed as u64));
    }
    Ok(())
}

/// Read a `TIME` chunk body (size-of-value + ticks) and return the ticks.
fn read_time<B: ByteOrder>(reader: &mut ChunkReader<'_, B>) -> Result<i32> {
    let size = reader.read_u32()?;
    if size != VALUE_SIZE_FIELD {
        return Err(Error::size_mismatch("TIME field", size as u64, VALUE_SIZE_FIELD as u64));
    }
    reader.read_i32()
}

/// Decode a `OneFile` stream: header, then frame blocks until end of stream.
pub fn decode_one_file<B: ByteOrder>(data: &[u8], decoder: &mut FrameDecoder<'_>) -> Result<CacheHeader> {
    let mut reader = ChunkReader::<B>::new(data);
    let header = read_header(&mut reader)?;

    loop {
        let offset = reader.position() as u64;
        let tag = match reader.try_read_tag()? {
            Some(tag) => tag,
            None => break,
        };
        if tag != Tag::FOR4 {
            return Err(Error::ChunkTagMismatch {
                expected: Tag::FOR4.to_string(),
                found: tag.to_string(),
                offset,
            });
        }
        let block_size = reader.read_len()?;
        let block_start = reader.position();
        reader.expect_tag(Tag::MYCH)?;
        reader.expect_tag(Tag::TIME)?;
        let ticks = read_time(&mut reader)?;
        let time = ticks_to_seconds(ticks as f64);
        trace!(ticks, time, block_size, "frame block");
        decode_block(&mut reader, decoder, time, block_start, block_size)?;
    }

    Ok(header)
}

/// Decode one file of a `OneFilePerFrame` cache sampled at `time`.
pub fn decode_frame_file<B: ByteOrder>(
    data: &[u8],
    decoder: &mut FrameDecoder<'_>,
    time: Chrono,
) -> Result<CacheHeader> {
    let mut reader = ChunkReader::<B>::new(data);
    let header = read_header(&mut reader)?;

    reader.expect_tag(Tag::FOR4)?;
    let block_size = reader.read_len()?;
    let block_start = reader.position();
    reader.expect_tag(Tag::MYCH)?;
    if reader.peek_tag() == Some(Tag::TIME) {
        reader.skip(TAG_SIZE)?;
        let ticks = read_time(&mut reader)?;
        trace!(ticks, time, "TIME chunk in frame file ignored, file name wins");
    }
    decode_block(&mut reader, decoder, time, block_start, block_size)?;

    if !reader.is_eof() {
        debug!("{} trailing bytes after frame block ignored", reader.remaining());
    }
    Ok(header)
}

// ============================================================================
// Frame file discovery
// ============================================================================

/// A `OneFilePerFrame` data file and the time encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFile {
    pub path: PathBuf,
    pub frame: u32,
    pub tick: u32,
}

impl FrameFile {
    /// Sample time in seconds.
    #[inline]
    pub fn time(&self, time_per_frame: Chrono) -> Chrono {
        frame_file_time(self.frame, self.tick, time_per_frame)
    }
}

/// Result of scanning a cache directory for frame files.
#[derive(Debug, Clone, Default)]
pub struct FrameScan {
    /// Usable files, ordered by (frame, tick).
    pub files: Vec<FrameFile>,
    /// Files that belong to the cache but whose frame number did not parse.
    pub skipped: Vec<PathBuf>,
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Text after `Frame` when `stem` names a frame file of `base_name`.
///
/// Only separators may sit between the base name and `Frame`, so a sibling
/// cache such as `cloth2` is not taken for `cloth`.
fn frame_suffix<'a>(stem: &'a str, base_name: &str) -> Option<&'a str> {
    let rest = stem.strip_prefix(base_name)?;
    rest.trim_start_matches(|c: char| !c.is_alphanumeric())
        .strip_prefix("Frame")
}

fn parse_frame_suffix(tail: &str) -> Option<(u32, u32)> {
    match tail.find("Tick") {
        Some(i) => Some((parse_digits(&tail[..i])?, parse_digits(&tail[i + "Tick".len()..])?)),
        None => Some((parse_digits(tail)?, 0)),
    }
}

/// Parse `<base_name>[_]Frame<N>[Tick<M>]` into `(N, M)`.
pub fn parse_frame_name(stem: &str, base_name: &str) -> Option<(u32, u32)> {
    parse_frame_suffix(frame_suffix(stem, base_name)?)
}

/// Find the data files of a `OneFilePerFrame` cache.
pub fn scan_frame_files(dir: &Path, base_name: &str) -> Result<FrameScan> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(dir.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;

    let mut scan = FrameScan::default();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DATA_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(tail) = frame_suffix(stem, base_name) else {
            if stem.starts_with(base_name) {
                debug!("{} is not a frame file of {}, ignored", path.display(), base_name);
            }
            continue;
        };
        match parse_frame_suffix(tail) {
            Some((frame, tick)) => scan.files.push(FrameFile { path, frame, tick }),
            None => {
                warn!("cannot parse a frame number from {}, skipped", path.display());
                scan.skipped.push(path);
            }
        }
    }

    scan.files.sort_by(|a, b| (a.frame, a.tick, &a.path).cmp(&(b.frame, b.tick, &b.path)));
    scan.skipped.sort();
    Ok(scan)
}

// ============================================================================
// Layout dispatch
// ============================================================================

/// Decode every data file of a cache into `sink`.
///
/// `dir` is the directory of the descriptor and `base_name` its file stem.
/// The descriptor is validated first; nothing is read from `dir` if it fails.
pub fn decode_cache(
    descriptor: &CacheDescriptor,
    dir: &Path,
    base_name: &str,
    sink: &dyn FrameSink,
    options: &LoadOptions,
) -> Result<LoadSummary> {
    descriptor.validate()?;
    let mut decoder = FrameDecoder::new(descriptor, sink);
    let mut summary = LoadSummary::default();

    match descriptor.layout() {
        CacheLayout::OneFile => {
            let path = dir.join(format!("{}.{}", base_name, DATA_EXTENSION));
            debug!("decoding {} ({})", path.display(), options.endian);
            let data = CacheData::open(&path, options.use_mmap)?;
            let header = crate::with_byte_order!(options.endian, B => {
                decode_one_file::<B>(data.bytes(), &mut decoder)
            })?;
            summary.files_read = 1;
            summary.header = Some(header);
        }
        CacheLayout::OneFilePerFrame => {
            let scan = scan_frame_files(dir, base_name)?;
            let tpf = descriptor.time_per_frame();
            for file in &scan.files {
                let time = file.time(tpf);
                debug!("decoding {} at {:.4}s ({})", file.path.display(), time, options.endian);
                let data = CacheData::open(&file.path, options.use_mmap)?;
                let header = crate::with_byte_order!(options.endian, B => {
                    decode_frame_file::<B>(data.bytes(), &mut decoder, time)
                })?;
                summary.files_read += 1;
                summary.header.get_or_insert(header);
            }
            summary.skipped_files = scan.skipped;
        }
    }

    let stats = decoder.stats();
    summary.records = stats.records;
    summary.frames_delivered = stats.delivered;
    summary.skipped_records = stats.skipped_negative;
    Ok(summary)
}
