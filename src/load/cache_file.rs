//! A parsed cache ready to decode.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::{CacheDescriptor, FrameSink};
use crate::mcx::{decode_cache, LoadSummary};
use crate::util::{Error, LoadOptions, Result};

/// Extension appended to the base name when naming an unnamed sink.
pub const SINK_NAME_EXTENSION: &str = "meshanim";

/// A cache descriptor together with where its data files live.
#[derive(Debug, Clone)]
pub struct CacheFile {
    descriptor: CacheDescriptor,
    file_name: String,
    base_name: String,
    directory: PathBuf,
}

impl CacheFile {
    /// Parse the descriptor at `path`. Data files are not touched.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let descriptor = CacheDescriptor::open(path)?;
        let file_name = path.to_string_lossy().into_owned();
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::xml(format!("descriptor path {} has no file name", path.display())))?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        debug!(
            "parsed {}: {} channel(s), {}",
            file_name,
            descriptor.num_channels(),
            descriptor.layout()
        );
        Ok(Self {
            descriptor,
            file_name,
            base_name,
            directory,
        })
    }

    /// Parse descriptor text. `file_name` locates the data files, as if the
    /// text had been read from that path.
    pub fn from_xml(xml: &str, file_name: impl AsRef<Path>) -> Result<Self> {
        let path = file_name.as_ref();
        let descriptor = CacheDescriptor::from_xml(xml)?;
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::xml(format!("descriptor path {} has no file name", path.display())))?;
        Ok(Self {
            descriptor,
            file_name: path.to_string_lossy().into_owned(),
            base_name,
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }

    #[inline]
    pub fn descriptor(&self) -> &CacheDescriptor {
        &self.descriptor
    }

    /// Path of the descriptor, as given.
    #[inline]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Descriptor file stem; data files are named after it.
    #[inline]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Directory holding the descriptor and its data files.
    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Decode every data file into `sink`.
    ///
    /// The sink is named `<basename>.meshanim` if it has no name, receives
    /// the frame width, and is marked inactive until decoding succeeds. On
    /// failure it keeps whatever frames were delivered and stays inactive.
    pub fn decode(&self, sink: &dyn FrameSink, options: &LoadOptions) -> Result<LoadSummary> {
        if sink.name().is_none() {
            sink.set_name(&format!("{}.{}", self.base_name, SINK_NAME_EXTENSION));
        }
        sink.set_time_inc(self.descriptor.time_per_frame());
        sink.set_active(false);

        let desc = &self.descriptor;
        debug!(
            "decoding {}: version {:.1}, {}, {} channel(s), {:.4}s - {:.4}s",
            self.file_name,
            desc.version(),
            desc.layout(),
            desc.num_channels(),
            desc.start_time(),
            desc.end_time()
        );
        for ch in desc.channels() {
            debug!(
                "  channel {} [{}, {}] rate {:.6}s, {:.4}s - {:.4}s",
                ch.name, ch.channel_type, ch.interpretation, ch.sampling_rate, ch.start_time, ch.end_time
            );
        }

        let summary = decode_cache(
            &self.descriptor,
            &self.directory,
            &self.base_name,
            sink,
            options,
        )?;

        sink.set_active(true);
        info!(
            "loaded {}: {} file(s), {} frame(s)",
            self.file_name, summary.files_read, summary.frames_delivered
        );
        Ok(summary)
    }
}

/// Parse the descriptor at `path` and decode it into `sink` on this thread.
pub fn load_file(path: impl AsRef<Path>, sink: &dyn FrameSink, options: &LoadOptions) -> Result<LoadSummary> {
    CacheFile::open(path)?.decode(sink, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CacheChannel, CacheLayout, ChannelFormat, FrameStore};
    use crate::mcx::writer::{write_cache, ChannelData, FrameData};
    use crate::util::ErrorKind;
    use byteorder::BigEndian;
    use glam::Vec3;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    const DT: f64 = 250.0 / 6000.0;

    fn descriptor(layout: CacheLayout) -> CacheDescriptor {
        CacheDescriptor::new(layout, DT)
            .with_range(0.0, 2.0 * DT)
            .with_channel(CacheChannel::positions("mesh", ChannelFormat::Float3Array, DT, 0.0, 2.0 * DT))
    }

    fn frames() -> Vec<FrameData> {
        (0..3)
            .map(|i| {
                FrameData::new(
                    i * 250,
                    vec![ChannelData::new("mesh", ChannelFormat::Float3Array, vec![Vec3::splat(i as f32)])],
                )
            })
            .collect()
    }

    #[test]
    fn test_paths() {
        let cache = CacheFile::from_xml(
            &descriptor(CacheLayout::OneFile).to_xml().unwrap(),
            "/caches/cloth.xml",
        )
        .unwrap();
        assert_eq!(cache.base_name(), "cloth");
        assert_eq!(cache.directory(), Path::new("/caches"));
        assert_eq!(cache.file_name(), "/caches/cloth.xml");
    }

    #[test]
    fn test_decode_sets_sink_state() {
        let dir = tempfile::tempdir().unwrap();
        write_cache::<BigEndian>(dir.path(), "cloth", &descriptor(CacheLayout::OneFile), &frames()).unwrap();

        let sink = FrameStore::new();
        let summary = load_file(dir.path().join("cloth.xml"), &sink, &LoadOptions::default()).unwrap();

        assert_eq!(summary.files_read, 1);
        assert_eq!(summary.frames_delivered, 3);
        assert_eq!(sink.name().as_deref(), Some("cloth.meshanim"));
        assert_eq!(sink.time_inc(), DT);
        assert!(sink.is_active());
        assert_eq!(sink.frame_indices("mesh"), vec![0, 1, 2]);
    }

    #[test]
    fn test_existing_sink_name_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_cache::<BigEndian>(dir.path(), "cloth", &descriptor(CacheLayout::OneFile), &frames()).unwrap();

        let sink = FrameStore::new();
        sink.set_name("player");
        load_file(dir.path().join("cloth.xml"), &sink, &LoadOptions::default()).unwrap();
        assert_eq!(sink.name().as_deref(), Some("player"));
    }

    #[test]
    fn test_failed_decode_leaves_sink_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let desc = descriptor(CacheLayout::OneFile);
        std::fs::write(dir.path().join("cloth.xml"), desc.to_xml().unwrap()).unwrap();

        let sink = FrameStore::new();
        sink.set_active(true);
        let err = load_file(dir.path().join("cloth.xml"), &sink, &LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(!sink.is_active());
    }

    #[test]
    fn test_missing_descriptor() {
        let sink = FrameStore::new();
        let err = load_file("/nonexistent/cloth.xml", &sink, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    /// Log output collected in memory.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_decode_logs_channels() {
        let dir = tempfile::tempdir().unwrap();
        write_cache::<BigEndian>(dir.path(), "cloth", &descriptor(CacheLayout::OneFile), &frames()).unwrap();

        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let sink = FrameStore::new();
            load_file(dir.path().join("cloth.xml"), &sink, &LoadOptions::default()).unwrap();
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("version 2.0, OneFile, 1 channel(s)"), "{}", out);
        assert!(out.contains("channel mesh [FloatVectorArray, positions] rate 0.041667s"), "{}", out);
        assert!(out.contains("0.0000s - 0.0833s"), "{}", out);
    }
}
