//! Cache descriptor (`<basename>.xml`) parsing and writing.
//!
//! A descriptor looks like this:
//!
//! ```text
//! <Autodesk_Cache_File>
//!   <cacheType Type="OneFile" Format="mcc"/>
//!   <time Range="250-5000"/>
//!   <cacheTimePerFrame TimePerFrame="250"/>
//!   <cacheVersion Version="2.0"/>
//!   <Channels>
//!     <channel0 ChannelName="pSphereShape1" ChannelType="FloatVectorArray"
//!               ChannelInterpretation="positions" SamplingType="Regular"
//!               SamplingRate="250" StartTime="250" EndTime="5000"/>
//!   </Channels>
//! </Autodesk_Cache_File>
//! ```
//!
//! All tick-valued fields are converted to seconds on the way in.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::time::{seconds_to_ticks, ticks_to_seconds, Chrono};
use crate::mcx::Tag;
use crate::util::{Error, Result};

/// Root element of every descriptor.
pub const ROOT_ELEMENT: &str = "Autodesk_Cache_File";

/// Highest descriptor version the decoder accepts.
pub const MAX_CACHE_VERSION: f32 = 2.0;

/// How the frames of a cache are split across binary files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheLayout {
    /// Every frame in a single `<basename>.mc`.
    OneFile,
    /// One `<basename>Frame<N>[Tick<M>].mc` per frame.
    OneFilePerFrame,
}

impl CacheLayout {
    /// Name used in the descriptor's `cacheType` element.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneFile => "OneFile",
            Self::OneFilePerFrame => "OneFilePerFrame",
        }
    }
}

impl FromStr for CacheLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OneFile" => Ok(Self::OneFile),
            "OneFilePerFrame" => Ok(Self::OneFilePerFrame),
            other => Err(Error::UnknownCacheType(other.to_string())),
        }
    }
}

impl fmt::Display for CacheLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample layout of a channel record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelFormat {
    /// `FVCA`: array of 3 x f32.
    Float3Array,
    /// `DVCA`: array of 3 x f64.
    Double3Array,
}

impl ChannelFormat {
    /// Data format tag in the binary stream.
    pub fn tag(self) -> Tag {
        match self {
            Self::Float3Array => Tag::FVCA,
            Self::Double3Array => Tag::DVCA,
        }
    }

    /// Look up the format for a data format tag.
    pub fn from_tag(tag: Tag) -> Option<Self> {
        match tag {
            Tag::FVCA => Some(Self::Float3Array),
            Tag::DVCA => Some(Self::Double3Array),
            _ => None,
        }
    }

    /// Size in bytes of one vector component.
    #[inline]
    pub fn word_size(self) -> usize {
        match self {
            Self::Float3Array => 4,
            Self::Double3Array => 8,
        }
    }

    /// Name used in the descriptor's `ChannelType` attribute.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Float3Array => "FloatVectorArray",
            Self::Double3Array => "DoubleVectorArray",
        }
    }
}

/// One channel declared in the descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheChannel {
    pub name: String,
    /// Declared type, e.g. `FloatVectorArray`.
    pub channel_type: String,
    /// Interpretation tag, e.g. `positions`.
    pub interpretation: String,
    /// Sampling type, e.g. `Regular`.
    pub sampling_type: String,
    /// Seconds between samples.
    pub sampling_rate: Chrono,
    pub start_time: Chrono,
    pub end_time: Chrono,
}

impl CacheChannel {
    /// A regularly sampled position channel.
    pub fn positions(
        name: impl Into<String>,
        format: ChannelFormat,
        sampling_rate: Chrono,
        start_time: Chrono,
        end_time: Chrono,
    ) -> Self {
        Self {
            name: name.into(),
            channel_type: format.type_name().to_string(),
            interpretation: "positions".to_string(),
            sampling_type: "Regular".to_string(),
            sampling_rate,
            start_time,
            end_time,
        }
    }

    /// Sample format implied by the declared type, if it is one we decode.
    pub fn declared_format(&self) -> Option<ChannelFormat> {
        match self.channel_type.as_str() {
            "FloatVectorArray" => Some(ChannelFormat::Float3Array),
            "DoubleVectorArray" => Some(ChannelFormat::Double3Array),
            _ => None,
        }
    }

    /// Number of samples between start and end time.
    pub fn num_samples(&self) -> f64 {
        if self.sampling_rate > 0.0 {
            (self.end_time - self.start_time) / self.sampling_rate
        } else {
            0.0
        }
    }
}

/// Parsed cache descriptor. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDescriptor {
    layout: CacheLayout,
    start_time: Chrono,
    end_time: Chrono,
    time_per_frame: Chrono,
    version: f32,
    channels: BTreeMap<String, CacheChannel>,
}

impl CacheDescriptor {
    /// Start building a descriptor with the given layout and frame width.
    pub fn new(layout: CacheLayout, time_per_frame: Chrono) -> Self {
        Self {
            layout,
            start_time: 0.0,
            end_time: 0.0,
            time_per_frame,
            version: MAX_CACHE_VERSION,
            channels: BTreeMap::new(),
        }
    }

    /// Set the cache time range in seconds.
    pub fn with_range(mut self, start_time: Chrono, end_time: Chrono) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Set the declared format version.
    pub fn with_version(mut self, version: f32) -> Self {
        self.version = version;
        self
    }

    /// Add (or replace) a channel.
    pub fn with_channel(mut self, channel: CacheChannel) -> Self {
        self.channels.insert(channel.name.clone(), channel);
        self
    }

    /// Read and parse a descriptor file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_xml(&text)
    }

    /// Parse a descriptor from XML text.
    pub fn from_xml(xml: &str) -> Result<Self> {
        parse_descriptor(xml)
    }

    #[inline]
    pub fn layout(&self) -> CacheLayout {
        self.layout
    }

    #[inline]
    pub fn start_time(&self) -> Chrono {
        self.start_time
    }

    #[inline]
    pub fn end_time(&self) -> Chrono {
        self.end_time
    }

    /// Seconds per frame.
    #[inline]
    pub fn time_per_frame(&self) -> Chrono {
        self.time_per_frame
    }

    #[inline]
    pub fn version(&self) -> f32 {
        self.version
    }

    /// Look up a channel by name.
    #[inline]
    pub fn channel(&self, name: &str) -> Option<&CacheChannel> {
        self.channels.get(name)
    }

    /// All channels, ordered by name.
    pub fn channels(&self) -> impl Iterator<Item = &CacheChannel> {
        self.channels.values()
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Check the invariants the decoder relies on.
    pub fn validate(&self) -> Result<()> {
        // NaN compares false either way
        if !(self.version <= MAX_CACHE_VERSION) {
            return Err(Error::UnsupportedVersion(self.version));
        }
        if !(self.time_per_frame > 0.0) {
            return Err(Error::xml(format!(
                "cacheTimePerFrame must be positive, got {} seconds",
                self.time_per_frame
            )));
        }
        Ok(())
    }

    /// Serialize back to Maya's descriptor XML.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;

        let mut elem = BytesStart::new("cacheType");
        elem.push_attribute(("Type", self.layout.as_str()));
        elem.push_attribute(("Format", "mcc"));
        writer.write_event(Event::Empty(elem))?;

        let range = format!(
            "{}-{}",
            seconds_to_ticks(self.start_time),
            seconds_to_ticks(self.end_time)
        );
        let mut elem = BytesStart::new("time");
        elem.push_attribute(("Range", range.as_str()));
        writer.write_event(Event::Empty(elem))?;

        let tpf = seconds_to_ticks(self.time_per_frame).to_string();
        let mut elem = BytesStart::new("cacheTimePerFrame");
        elem.push_attribute(("TimePerFrame", tpf.as_str()));
        writer.write_event(Event::Empty(elem))?;

        let version = format!("{:.1}", self.version);
        let mut elem = BytesStart::new("cacheVersion");
        elem.push_attribute(("Version", version.as_str()));
        writer.write_event(Event::Empty(elem))?;

        writer.write_event(Event::Start(BytesStart::new("Channels")))?;
        for (i, channel) in self.channels.values().enumerate() {
            let tag = format!("channel{}", i);
            let rate = seconds_to_ticks(channel.sampling_rate).to_string();
            let start = seconds_to_ticks(channel.start_time).to_string();
            let end = seconds_to_ticks(channel.end_time).to_string();

            let mut elem = BytesStart::new(tag.as_str());
            elem.push_attribute(("ChannelName", channel.name.as_str()));
            elem.push_attribute(("ChannelType", channel.channel_type.as_str()));
            elem.push_attribute(("ChannelInterpretation", channel.interpretation.as_str()));
            elem.push_attribute(("SamplingType", channel.sampling_type.as_str()));
            elem.push_attribute(("SamplingRate", rate.as_str()));
            elem.push_attribute(("StartTime", start.as_str()));
            elem.push_attribute(("EndTime", end.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Channels")))?;
        writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::xml(format!("descriptor is not UTF-8: {}", e)))
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Attributes of one element, in document order.
struct Attrs(Vec<(String, String)>);

impl Attrs {
    fn read(elem: &BytesStart<'_>) -> Result<Self> {
        let mut out = Vec::new();
        for attr in elem.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            out.push((key, value));
        }
        Ok(Self(out))
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Named attribute, or the first one. Maya always writes the value first.
    fn value(&self, name: &str) -> Option<&str> {
        self.get(name).or_else(|| self.0.first().map(|(_, v)| v.as_str()))
    }
}

fn parse_number(field: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| Error::xml(format!("{} is not a number: {:?}", field, text)))
}

/// Split `"start-end"`; the start may itself be negative.
fn parse_tick_range(text: &str) -> Result<(f64, f64)> {
    let text = text.trim();
    let split = text
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '-')
        .map(|(i, _)| i)
        .ok_or_else(|| Error::xml(format!("time range is not start-end: {:?}", text)))?;
    let start = parse_number("time range start", &text[..split])?;
    let end = parse_number("time range end", &text[split + 1..])?;
    Ok((start, end))
}

fn parse_channel(attrs: &Attrs) -> Result<CacheChannel> {
    let ticks = |field: &str| -> Result<f64> {
        match attrs.get(field) {
            Some(v) => Ok(ticks_to_seconds(parse_number(field, v)?)),
            None => Ok(0.0),
        }
    };
    let text = |field: &str| attrs.get(field).unwrap_or_default().to_string();

    let name = attrs
        .get("ChannelName")
        .ok_or_else(|| Error::xml("channel element without ChannelName"))?
        .to_string();

    Ok(CacheChannel {
        name,
        channel_type: text("ChannelType"),
        interpretation: text("ChannelInterpretation"),
        sampling_type: text("SamplingType"),
        sampling_rate: ticks("SamplingRate")?,
        start_time: ticks("StartTime")?,
        end_time: ticks("EndTime")?,
    })
}

/// Parse descriptor XML into a validated [`CacheDescriptor`].
pub fn parse_descriptor(xml: &str) -> Result<CacheDescriptor> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;
    let mut seen_channels = false;
    let mut layout: Option<String> = None;
    let mut range: Option<(f64, f64)> = None;
    let mut time_per_frame: Option<f64> = None;
    let mut version: Option<f32> = None;
    let mut channels = BTreeMap::new();

    loop {
        let (elem, is_empty) = match reader.read_event()? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                stack.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
        let parent = stack.last().map(String::as_str);

        match (parent, name.as_str()) {
            (_, ROOT_ELEMENT) if !seen_root => seen_root = true,
            (Some(ROOT_ELEMENT), "cacheType") => {
                let attrs = Attrs::read(&elem)?;
                layout = Some(attrs.value("Type").unwrap_or_default().to_string());
            }
            (Some(ROOT_ELEMENT), "time") => {
                let attrs = Attrs::read(&elem)?;
                let text = attrs
                    .value("Range")
                    .ok_or_else(|| Error::xml("time element without Range"))?;
                range = Some(parse_tick_range(text)?);
            }
            (Some(ROOT_ELEMENT), "cacheTimePerFrame") => {
                let attrs = Attrs::read(&elem)?;
                let text = attrs
                    .value("TimePerFrame")
                    .ok_or_else(|| Error::xml("cacheTimePerFrame without value"))?;
                time_per_frame = Some(parse_number("cacheTimePerFrame", text)?);
            }
            (Some(ROOT_ELEMENT), "cacheVersion") => {
                let attrs = Attrs::read(&elem)?;
                let text = attrs
                    .value("Version")
                    .ok_or_else(|| Error::xml("cacheVersion without value"))?;
                version = Some(parse_number("cacheVersion", text)? as f32);
            }
            (Some(ROOT_ELEMENT), "Channels") => seen_channels = true,
            (Some("Channels"), tag) if tag.contains("channel") => {
                let channel = parse_channel(&Attrs::read(&elem)?)?;
                if channels.contains_key(&channel.name) {
                    tracing::warn!("duplicate channel {:?} in descriptor, keeping the last", channel.name);
                }
                channels.insert(channel.name.clone(), channel);
            }
            _ => {}
        }

        if !is_empty {
            stack.push(name);
        }
    }

    if !stack.is_empty() {
        return Err(Error::xml(format!("unclosed element <{}>", stack.join("/"))));
    }
    if !seen_root {
        return Err(Error::xml(format!("missing {} root element", ROOT_ELEMENT)));
    }
    let layout: CacheLayout = layout
        .ok_or_else(|| Error::xml("missing cacheType element"))?
        .parse()?;
    let (start, end) = range.ok_or_else(|| Error::xml("missing time element"))?;
    let time_per_frame = time_per_frame.ok_or_else(|| Error::xml("missing cacheTimePerFrame element"))?;
    let version = version.ok_or_else(|| Error::xml("missing cacheVersion element"))?;
    if !seen_channels {
        return Err(Error::xml("missing Channels element"));
    }

    let descriptor = CacheDescriptor {
        layout,
        start_time: ticks_to_seconds(start),
        end_time: ticks_to_seconds(end),
        time_per_frame: ticks_to_seconds(time_per_frame),
        version,
        channels,
    };
    descriptor.validate()?;
    Ok(descriptor)
}
