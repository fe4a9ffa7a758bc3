//! Integration tests for decoding complete caches from disk.

use std::path::Path;

use byteorder::{BigEndian, LittleEndian};
use glam::Vec3;
use mcache::core::time::ticks_to_seconds;
use mcache::core::{frame_index, CacheChannel, CacheDescriptor, CacheLayout, ChannelFormat, FrameSink, FrameStore};
use mcache::mcx::writer::{frame_file_name, write_cache, ChannelData, FrameData, McWriter};
use mcache::{load_file, CacheFile, Endian, Error, ErrorKind, LoadOptions};

use tempfile::TempDir;

const TPF_TICKS: i32 = 250;

fn tpf() -> f64 {
    ticks_to_seconds(TPF_TICKS as f64)
}

fn positions(channel: usize, frame: i32, count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|v| Vec3::new(channel as f32, frame as f32, v as f32 * 0.5))
        .collect()
}

/// Three channels, one starting late, written for frames 0..4.
fn multi_channel_cache(dir: &Path, layout: CacheLayout) -> CacheDescriptor {
    let dt = tpf();
    let desc = CacheDescriptor::new(layout, dt)
        .with_range(0.0, 3.0 * dt)
        .with_channel(CacheChannel::positions("pSphereShape1", ChannelFormat::Float3Array, dt, 0.0, 3.0 * dt))
        .with_channel(CacheChannel::positions("pCubeShape1", ChannelFormat::Double3Array, dt, 0.0, 3.0 * dt))
        .with_channel(CacheChannel::positions("pConeShape1", ChannelFormat::Float3Array, dt, dt, 3.0 * dt));

    let frames: Vec<FrameData> = (0..4)
        .map(|f| {
            FrameData::new(
                f * TPF_TICKS,
                vec![
                    ChannelData::new("pSphereShape1", ChannelFormat::Float3Array, positions(0, f, 5)),
                    ChannelData::new("pCubeShape1", ChannelFormat::Double3Array, positions(1, f, 3)),
                    ChannelData::new("pConeShape1", ChannelFormat::Float3Array, positions(2, f, 2)),
                ],
            )
        })
        .collect();
    write_cache::<BigEndian>(dir, "scene", &desc, &frames).expect("Failed to write cache");
    desc
}

#[test]
fn test_one_file_all_channels_all_frames() {
    let dir = TempDir::new().unwrap();
    multi_channel_cache(dir.path(), CacheLayout::OneFile);

    let cache = CacheFile::open(dir.path().join("scene.xml")).expect("Failed to open descriptor");
    let store = FrameStore::new();
    let summary = cache.decode(&store, &LoadOptions::default()).expect("Failed to decode");

    assert_eq!(summary.files_read, 1);
    assert_eq!(summary.records, 12);
    // pConeShape1 frame 0 lies before its channel start
    assert_eq!(summary.frames_delivered, 11);
    assert_eq!(summary.skipped_records, 1);
    assert_eq!(summary.header.as_ref().and_then(|h| h.version.clone()).as_deref(), Some("2.0"));

    let desc = cache.descriptor();
    for channel in desc.channels() {
        let mut expected: Vec<usize> = (0..4)
            .map(|f| frame_index(ticks_to_seconds((f * TPF_TICKS) as f64), desc.time_per_frame(), channel.start_time))
            .filter(|&i| i >= 0)
            .map(|i| i as usize)
            .collect();
        expected.dedup();
        assert_eq!(store.frame_indices(&channel.name), expected, "channel {}", channel.name);
    }

    assert_eq!(&*store.frame("pSphereShape1", 2).unwrap(), positions(0, 2, 5).as_slice());
    assert_eq!(&*store.frame("pCubeShape1", 3).unwrap(), positions(1, 3, 3).as_slice());
    // written at frame 3, bucketed relative to its start one frame in
    assert_eq!(&*store.frame("pConeShape1", 2).unwrap(), positions(2, 3, 2).as_slice());
    assert!(store.is_active());
    assert_eq!(store.name().as_deref(), Some("scene.meshanim"));
}

#[test]
fn test_one_file_little_endian_without_mmap() {
    let dir = TempDir::new().unwrap();
    let dt = tpf();
    let desc = CacheDescriptor::new(CacheLayout::OneFile, dt)
        .with_channel(CacheChannel::positions("mesh", ChannelFormat::Float3Array, dt, 0.0, dt));
    let frames = vec![
        FrameData::new(0, vec![ChannelData::new("mesh", ChannelFormat::Float3Array, positions(0, 0, 4))]),
        FrameData::new(250, vec![ChannelData::new("mesh", ChannelFormat::Float3Array, positions(0, 1, 4))]),
    ];
    write_cache::<LittleEndian>(dir.path(), "le", &desc, &frames).unwrap();

    let store = FrameStore::new();
    let options = LoadOptions::new().with_endian(Endian::Little).with_mmap(false);
    load_file(dir.path().join("le.xml"), &store, &options).unwrap();
    assert_eq!(&*store.frame("mesh", 1).unwrap(), positions(0, 1, 4).as_slice());

    // the same bytes read big-endian do not parse
    let store = FrameStore::new();
    assert!(load_file(dir.path().join("le.xml"), &store, &LoadOptions::default()).is_err());
}

#[test]
fn test_size_mismatch_delivers_nothing_for_that_record() {
    let dir = TempDir::new().unwrap();
    let dt = tpf();
    let desc = CacheDescriptor::new(CacheLayout::OneFile, dt)
        .with_channel(CacheChannel::positions("mesh", ChannelFormat::Float3Array, dt, 0.0, 0.0));
    let frames = vec![FrameData::new(
        0,
        vec![ChannelData::new("mesh", ChannelFormat::Float3Array, positions(0, 0, 3))],
    )];
    write_cache::<BigEndian>(dir.path(), "bad", &desc, &frames).unwrap();

    // declare 10 vertices for a 3-vertex buffer
    let mc = dir.path().join("bad.mc");
    let mut bytes = std::fs::read(&mc).unwrap();
    let at = bytes.windows(4).position(|w| w == b"SIZE").unwrap() + 8;
    bytes[at..at + 4].copy_from_slice(&10u32.to_be_bytes());
    std::fs::write(&mc, bytes).unwrap();

    let store = FrameStore::new();
    let err = load_file(dir.path().join("bad.xml"), &store, &LoadOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    assert!(store.is_empty());
    assert!(!store.is_active());
}

fn write_frame_file(dir: &Path, name: &str, channels: &[ChannelData]) {
    let mut w = McWriter::<BigEndian>::new();
    w.write_header("0.1", 0.0, 0.0);
    w.write_frame(None, channels);
    std::fs::write(dir.join(name), w.into_bytes()).unwrap();
}

#[test]
fn test_per_frame_timestamps_from_file_names() {
    let dir = TempDir::new().unwrap();
    let dt = tpf();
    let desc = CacheDescriptor::new(CacheLayout::OneFilePerFrame, dt)
        .with_channel(CacheChannel::positions("mesh", ChannelFormat::Float3Array, dt, 0.0, 1.0));
    std::fs::write(dir.path().join("base.xml"), desc.to_xml().unwrap()).unwrap();

    let mesh = |f: i32| vec![ChannelData::new("mesh", ChannelFormat::Float3Array, positions(0, f, 2))];
    write_frame_file(dir.path(), "base_Frame12.mc", &mesh(12));
    write_frame_file(dir.path(), "base_Frame5Tick3000.mc", &mesh(5));

    let store = FrameStore::new();
    let summary = load_file(dir.path().join("base.xml"), &store, &LoadOptions::default()).unwrap();
    assert_eq!(summary.files_read, 2);
    assert!(summary.skipped_files.is_empty());

    // Frame 12 -> 12 * dt; Frame 5 Tick 3000 -> 5 * dt + 0.5s
    let late = frame_index(5.0 * dt + 0.5, dt, 0.0) as usize;
    assert_eq!(late, 17);
    assert_eq!(store.frame_indices("mesh"), vec![12, late]);
    assert_eq!(&*store.frame("mesh", 12).unwrap(), positions(0, 12, 2).as_slice());
    assert_eq!(&*store.frame("mesh", late).unwrap(), positions(0, 5, 2).as_slice());
}

#[test]
fn test_per_frame_round_trip_through_writer() {
    let dir = TempDir::new().unwrap();
    multi_channel_cache(dir.path(), CacheLayout::OneFilePerFrame);
    for f in 0..4u32 {
        assert!(dir.path().join(frame_file_name("scene", f, 0)).exists());
    }

    let store = FrameStore::new();
    let summary = load_file(dir.path().join("scene.xml"), &store, &LoadOptions::default()).unwrap();
    assert_eq!(summary.files_read, 4);
    assert_eq!(store.frame_indices("pSphereShape1"), vec![0, 1, 2, 3]);
    assert_eq!(store.frame_indices("pConeShape1"), vec![0, 1, 2]);
}

#[test]
fn test_unparsable_frame_file_is_skipped() {
    let dir = TempDir::new().unwrap();
    let dt = tpf();
    let desc = CacheDescriptor::new(CacheLayout::OneFilePerFrame, dt)
        .with_channel(CacheChannel::positions("mesh", ChannelFormat::Float3Array, dt, 0.0, 1.0));
    std::fs::write(dir.path().join("base.xml"), desc.to_xml().unwrap()).unwrap();

    let mesh = vec![ChannelData::new("mesh", ChannelFormat::Float3Array, positions(0, 1, 1))];
    write_frame_file(dir.path(), "base_Frame1.mc", &mesh);
    write_frame_file(dir.path(), "base_FrameLast.mc", &mesh);

    let store = FrameStore::new();
    let summary = load_file(dir.path().join("base.xml"), &store, &LoadOptions::default()).unwrap();
    assert_eq!(summary.files_read, 1);
    assert_eq!(summary.skipped_files, vec![dir.path().join("base_FrameLast.mc")]);
    assert_eq!(store.frame_indices("mesh"), vec![1]);
}

#[test]
fn test_version_above_two_is_rejected() {
    let dir = TempDir::new().unwrap();
    let desc = CacheDescriptor::new(CacheLayout::OneFile, tpf()).with_version(3.0);
    std::fs::write(dir.path().join("future.xml"), desc.to_xml().unwrap()).unwrap();

    let store = FrameStore::new();
    let err = load_file(dir.path().join("future.xml"), &store, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion(v) if v == 3.0));
    assert!(store.is_empty());
}

#[test]
fn test_unknown_cache_type_is_rejected() {
    let xml = CacheDescriptor::new(CacheLayout::OneFile, tpf())
        .to_xml()
        .unwrap()
        .replace("\"OneFile\"", "\"OneFilePerChannel\"");
    let err = CacheFile::from_xml(&xml, "cache.xml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCacheType);
}

#[test]
fn test_missing_data_file() {
    let dir = TempDir::new().unwrap();
    let desc = CacheDescriptor::new(CacheLayout::OneFile, tpf());
    std::fs::write(dir.path().join("lonely.xml"), desc.to_xml().unwrap()).unwrap();

    let store = FrameStore::new();
    let err = load_file(dir.path().join("lonely.xml"), &store, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::FileNotFound(ref p) if p.ends_with("lonely.mc")));
}
