//! Binary `.mc` stream access.
//!
//! [`CacheData`] owns the bytes of one data file (memory-mapped when
//! possible). [`ChunkReader`] walks those bytes chunk by chunk; its byte order
//! is a type parameter, fixed for the lifetime of the reader.

use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use byteorder::ByteOrder;
use memmap2::Mmap;

use super::format::*;
use crate::util::{Error, Result};

/// Bytes of one cache data file.
pub struct CacheData {
    inner: DataInner,
    path: PathBuf,
}

enum DataInner {
    /// Memory-mapped file (preferred for large caches)
    Mmap(Mmap),
    /// File read into memory (fallback, and empty files)
    Buffer(Vec<u8>),
}

impl CacheData {
    /// Open a data file, memory-mapping it when `use_mmap` is set.
    pub fn open(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();

        let inner = if use_mmap && size > 0 {
            // Safety: file is opened read-only; caches are not rewritten while loading
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            DataInner::Mmap(mmap)
        } else {
            let mut buf = Vec::with_capacity(size as usize);
            file.read_to_end(&mut buf)?;
            DataInner::Buffer(buf)
        };

        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Wrap bytes that are already in memory.
    pub fn from_bytes(bytes: Vec<u8>, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: DataInner::Buffer(bytes),
            path: path.into(),
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        match &self.inner {
            DataInner::Mmap(mmap) => &mmap[..],
            DataInner::Buffer(buf) => &buf[..],
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sequential reader over chunk-tagged bytes.
pub struct ChunkReader<'a, B: ByteOrder> {
    data: &'a [u8],
    pos: usize,
    _order: PhantomData<B>,
}

impl<'a, B: ByteOrder> ChunkReader<'a, B> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            _order: PhantomData,
        }
    }

    /// Current byte offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Consume `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::UnexpectedEof((self.pos + len) as u64));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Skip `len` bytes.
    #[inline]
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn read_tag(&mut self) -> Result<Tag> {
        self.take(TAG_SIZE).map(Tag::from_slice)
    }

    /// Read a tag, or `None` at a clean end of stream.
    ///
    /// A stream that ends partway through a tag is truncated, not finished.
    pub fn try_read_tag(&mut self) -> Result<Option<Tag>> {
        if self.is_eof() {
            return Ok(None);
        }
        self.read_tag().map(Some)
    }

    /// Look at the next tag without consuming it.
    pub fn peek_tag(&self) -> Option<Tag> {
        if self.remaining() < TAG_SIZE {
            return None;
        }
        Some(Tag::from_slice(&self.data[self.pos..]))
    }

    /// Consume the next tag, failing unless it is `expected`.
    pub fn expect_tag(&mut self, expected: Tag) -> Result<()> {
        let offset = self.pos as u64;
        let found = self.read_tag()?;
        if found != expected {
            return Err(Error::ChunkTagMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
                offset,
            });
        }
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4).map(B::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take(4).map(B::read_i32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.take(4).map(B::read_f32)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.take(8).map(B::read_f64)
    }

    /// Read a 32-bit length and widen it for indexing.
    pub fn read_len(&mut self) -> Result<usize> {
        self.read_u32().map(|v| v as usize)
    }
}
