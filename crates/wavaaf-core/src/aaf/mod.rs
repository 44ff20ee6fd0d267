//! Container assembly
//!
//! Turns one parsed WAV file into a master/source pair in a
//! [`ContainerBuilder`]:
//!
//! - one source object carrying the essence descriptor and either the
//!   embedded PCM span or a `file://` locator
//! - one master object named after the file, with the flattened metadata as
//!   comments and one timeline slot per channel
//! - stereo slots wrapped in constant pan operations (left -1, right +1)

mod comments;
mod mob_id;

pub use comments::metadata_comments;
pub use mob_id::{deterministic_mob_id, FileIdentity};

use std::borrow::Cow;
use std::path::Path;

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

use crate::graph::{
    ContainerBuilder, EssenceDescriptor, EssenceRef, GraphError, MasterRef, MobRef, PanOperation,
    ReadSeek, Segment, SlotRef, SourceClip, SourceRef,
};
use crate::timecode::{Rational, RateSpec, TimecodeError, TimecodeInfo};
use crate::ucs::{CategorizationResult, LOW_CONFIDENCE_THRESHOLD};
use crate::wav::{AudioFormatInfo, WavMetadata};

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Timecode error: {0}")]
    Timecode(#[from] TimecodeError),

    #[error("Graph write failed: {0}")]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Run-wide choice between copying PCM and referencing the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EssenceMode {
    #[default]
    Embed,
    Link,
}

/// How one file's essence ended up in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EssenceRepresentation {
    Embedded { offset: u64, length: u64 },
    Linked { url: String },
}

/// Placement of a stereo channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanPosition {
    Left,
    Right,
}

impl PanPosition {
    /// Pan parameter value: -1 hard left, +1 hard right
    pub fn value(self) -> Rational {
        match self {
            PanPosition::Left => Rational::from_int(-1),
            PanPosition::Right => Rational::from_int(1),
        }
    }

    /// Placement rule; only stereo has one
    pub fn for_channel(channel: u16, channel_count: u16) -> Option<Self> {
        match (channel_count, channel) {
            (2, 1) => Some(PanPosition::Left),
            (2, 2) => Some(PanPosition::Right),
            _ => None,
        }
    }
}

/// Result of pan setup for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanOutcome {
    Applied(PanPosition),
    /// No placement rule for this channel layout; the slot stays a plain clip
    NotApplicable,
}

/// Settings shared by every file in a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions {
    pub mode: EssenceMode,
    pub rate: RateSpec,
    pub drop_frame: bool,
    pub low_confidence_threshold: f64,
}

impl AssemblyOptions {
    pub fn new(mode: EssenceMode, rate: RateSpec) -> Self {
        Self {
            mode,
            rate,
            drop_frame: false,
            low_confidence_threshold: LOW_CONFIDENCE_THRESHOLD,
        }
    }
}

/// What was built for one file
#[derive(Debug, Clone)]
pub struct AssembledFile {
    pub master: MasterRef,
    pub source: SourceRef,
    pub slots: Vec<SlotRef>,
    pub pan: Vec<PanOutcome>,
    pub representation: EssenceRepresentation,
    pub timecode: TimecodeInfo,
}

/// Reject formats the container cannot describe
pub fn validate_format(format: &AudioFormatInfo) -> Result<()> {
    if format.sample_rate == 0 {
        return Err(AssemblyError::InvalidFormat("sample rate is zero".into()));
    }
    if format.channels == 0 {
        return Err(AssemblyError::InvalidFormat("channel count is zero".into()));
    }
    if format.bits_per_sample == 0 {
        return Err(AssemblyError::InvalidFormat("bit depth is zero".into()));
    }
    if !format.is_pcm() {
        return Err(AssemblyError::InvalidFormat(format!(
            "format tag 0x{:04X} is not integer PCM",
            format.format_tag
        )));
    }
    let expected = format.channels as u32 * format.bytes_per_sample() as u32;
    if format.block_align as u32 != expected {
        return Err(AssemblyError::InvalidFormat(format!(
            "block align {} does not match {} channel(s) of {} bits",
            format.block_align, format.channels, format.bits_per_sample
        )));
    }
    Ok(())
}

/// Bytes kept literal in the path of a `file://` URL
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b':');

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    Cow::Owned(path.to_string_lossy().replace('\\', "/").into_bytes())
}

/// `file://` URL for an absolute path
///
/// On unix the raw path bytes are encoded, so non-UTF-8 names survive.
pub fn file_url(path: &Path) -> String {
    let bytes = path_bytes(path);
    let encoded = percent_encode(&bytes, PATH_SEGMENT).to_string();
    if encoded.starts_with('/') {
        format!("file://{}", encoded)
    } else {
        format!("file:///{}", encoded)
    }
}

/// Wrap a slot's clip in a constant pan when its layout has a placement rule
///
/// A write failure is returned as an error, never folded into
/// [`PanOutcome::NotApplicable`].
pub fn apply_pan<B: ContainerBuilder + ?Sized>(
    builder: &mut B,
    slot: SlotRef,
    clip: &SourceClip,
    channel_count: u16,
) -> std::result::Result<PanOutcome, GraphError> {
    let Some(position) = PanPosition::for_channel(clip.channel, channel_count) else {
        return Ok(PanOutcome::NotApplicable);
    };
    builder.set_slot_segment(
        slot,
        Segment::Pan(PanOperation::constant(clip.clone(), position.value())),
    )?;
    Ok(PanOutcome::Applied(position))
}

/// Build the master/source pair for one file
///
/// `stream` must be the file the metadata was read from; in embed mode its
/// PCM span is copied into the source object.
pub fn assemble<B: ContainerBuilder + ?Sized>(
    builder: &mut B,
    identity: &FileIdentity,
    metadata: &WavMetadata,
    categorization: Option<&CategorizationResult>,
    options: &AssemblyOptions,
    stream: &mut dyn ReadSeek,
) -> Result<AssembledFile> {
    let format = &metadata.format;
    validate_format(format)?;

    let timecode = TimecodeInfo::resolve(
        format.sample_frames,
        format.sample_rate,
        &options.rate,
        options.drop_frame,
    )?;

    let file_name = identity
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let clip_name = identity
        .path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());

    // Source object and essence
    let source = builder.create_source_object(&file_name, format)?;
    builder.assign_mob_id(
        MobRef::Source(source),
        &deterministic_mob_id(identity, "source"),
    )?;
    let descriptor = EssenceDescriptor::from_format(format);

    let representation = match options.mode {
        EssenceMode::Embed => {
            builder.attach_descriptor(
                source,
                descriptor,
                EssenceRef::Embedded {
                    length: format.data_length,
                },
            )?;
            builder.write_essence_bytes(source, format.data_offset, format.data_length, stream)?;
            EssenceRepresentation::Embedded {
                offset: format.data_offset,
                length: format.data_length,
            }
        }
        EssenceMode::Link => {
            let url = file_url(&identity.path);
            let locator = builder.create_locator(&url)?;
            builder.attach_descriptor(source, descriptor, EssenceRef::Linked { locator })?;
            EssenceRepresentation::Linked { url }
        }
    };

    // Master object
    let master = builder.create_master_object(&clip_name)?;
    builder.assign_mob_id(
        MobRef::Master(master),
        &deterministic_mob_id(identity, "master"),
    )?;

    for (key, value) in metadata_comments(
        identity,
        metadata,
        categorization,
        &timecode,
        options.low_confidence_threshold,
    ) {
        builder.add_comment(master, &key, &value)?;
    }

    // One slot per channel
    let clip_length = timecode.duration.ceil();
    let mut slots = Vec::with_capacity(format.channels as usize);
    let mut pan = Vec::with_capacity(format.channels as usize);
    for channel in 1..=format.channels {
        let slot = builder.create_timeline_slot(master, options.rate.rate(), timecode.duration)?;
        let clip = SourceClip {
            source,
            channel,
            start: 0,
            length: clip_length,
        };
        let outcome = apply_pan(builder, slot, &clip, format.channels)?;
        if outcome == PanOutcome::NotApplicable {
            builder.set_slot_segment(slot, Segment::SourceClip(clip))?;
        }
        slots.push(slot);
        pan.push(outcome);
    }

    log::debug!(
        "assemble: {} -> {} slot(s), {:?}, {} frames at {}",
        file_name,
        slots.len(),
        options.mode,
        timecode.duration_frames,
        options.rate.label()
    );

    Ok(AssembledFile {
        master,
        source,
        slots,
        pan,
        representation,
        timecode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LocatorRef, ObjectGraph};
    use crate::wav::read_wav;
    use crate::wav::test_support::{pcm_ramp, WavBuilder};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn identity(name: &str) -> FileIdentity {
        FileIdentity {
            path: PathBuf::from(format!("/library/{}", name)),
            size: 4096,
            modified: None,
        }
    }

    fn options(mode: EssenceMode) -> AssemblyOptions {
        AssemblyOptions::new(mode, RateSpec::parse("25").unwrap())
    }

    fn build(channels: u16, frames: usize, mode: EssenceMode) -> (ObjectGraph, AssembledFile, Vec<u8>) {
        let pcm = pcm_ramp(frames, channels);
        let image = WavBuilder::new()
            .fmt(channels, 48000, 16)
            .bext("test tone", 1, None)
            .data(pcm.clone())
            .build();
        let mut stream = Cursor::new(image);
        let metadata = read_wav(&mut stream).unwrap();

        let mut graph = ObjectGraph::new();
        let assembled = assemble(
            &mut graph,
            &identity("tone.wav"),
            &metadata,
            None,
            &options(mode),
            &mut stream,
        )
        .unwrap();
        (graph, assembled, pcm)
    }

    #[test]
    fn test_stereo_gets_hard_left_right_pan() {
        let (graph, assembled, _) = build(2, 4800, EssenceMode::Embed);
        assert_eq!(assembled.slots.len(), 2);
        assert_eq!(
            assembled.pan,
            vec![
                PanOutcome::Applied(PanPosition::Left),
                PanOutcome::Applied(PanPosition::Right)
            ]
        );

        let slots = graph.master_slots(assembled.master);
        for (slot, expected) in slots.iter().zip([-1i64, 1]) {
            match slot.segment.as_ref().unwrap() {
                Segment::Pan(op) => {
                    assert_eq!(op.points.len(), 2);
                    assert_eq!(op.points[0].time, Rational::ZERO);
                    assert_eq!(op.points[1].time, Rational::from_int(1));
                    assert!(op.points.iter().all(|p| p.value == Rational::from_int(expected)));
                    assert_eq!(op.input.length, 3); // 2.5 frames rounded up
                }
                other => panic!("expected pan, got {:?}", other),
            }
        }
        assert_eq!(slots[0].slot_id, 1);
        assert_eq!(slots[1].slot_id, 2);
    }

    #[test]
    fn test_mono_has_plain_clip() {
        let (graph, assembled, _) = build(1, 4800, EssenceMode::Embed);
        assert_eq!(assembled.pan, vec![PanOutcome::NotApplicable]);
        let slots = graph.master_slots(assembled.master);
        assert_eq!(slots.len(), 1);
        assert!(matches!(slots[0].segment, Some(Segment::SourceClip(_))));
    }

    #[test]
    fn test_multichannel_one_slot_per_channel_without_pan() {
        let (graph, assembled, _) = build(6, 480, EssenceMode::Embed);
        assert_eq!(assembled.slots.len(), 6);
        assert!(assembled.pan.iter().all(|p| *p == PanOutcome::NotApplicable));
        let channels: Vec<u16> = graph
            .master_slots(assembled.master)
            .iter()
            .map(|s| s.segment.as_ref().unwrap().clip().channel)
            .collect();
        assert_eq!(channels, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_embedded_essence_is_exact_pcm_span() {
        let (graph, assembled, pcm) = build(2, 1000, EssenceMode::Embed);
        let bytes = graph.essence_bytes(assembled.source).unwrap();
        assert_eq!(bytes, pcm.as_slice());
        assert!(matches!(
            assembled.representation,
            EssenceRepresentation::Embedded { length, .. } if length == pcm.len() as u64
        ));
    }

    #[test]
    fn test_linked_mode_copies_no_pcm() {
        let (graph, assembled, _) = build(2, 1000, EssenceMode::Link);
        assert!(graph.essence_bytes(assembled.source).unwrap().is_empty());
        assert_eq!(
            assembled.representation,
            EssenceRepresentation::Linked {
                url: "file:///library/tone.wav".into()
            }
        );
        assert_eq!(graph.locator(LocatorRef(0)).unwrap().url, "file:///library/tone.wav");
    }

    #[test]
    fn test_master_carries_ids_and_comments() {
        let (graph, assembled, _) = build(1, 480, EssenceMode::Embed);
        let master = graph.master(assembled.master).unwrap();
        assert_eq!(master.name, "tone");
        assert_eq!(master.comment("bext_description"), Some("test tone"));
        assert_eq!(master.comment("tc_end"), Some("00:00:00:00"));
        assert_eq!(
            master.mob_id.as_deref(),
            Some(deterministic_mob_id(&identity("tone.wav"), "master").as_str())
        );
        let source = graph.source(assembled.source).unwrap();
        assert_ne!(source.mob_id, master.mob_id);
    }

    #[test]
    fn test_invalid_formats_are_rejected() {
        let image = WavBuilder::new().fmt(1, 48000, 16).data(pcm_ramp(10, 1)).build();
        let base = read_wav(&mut Cursor::new(image)).unwrap().format;

        let mut zero_rate = base.clone();
        zero_rate.sample_rate = 0;
        let mut float = base.clone();
        float.format_tag = 3;
        let mut misaligned = base.clone();
        misaligned.block_align = 3;
        let mut no_bits = base.clone();
        no_bits.bits_per_sample = 0;

        for format in [zero_rate, float, misaligned, no_bits] {
            assert!(matches!(
                validate_format(&format),
                Err(AssemblyError::InvalidFormat(_))
            ));
        }
        assert!(validate_format(&base).is_ok());
    }

    #[test]
    fn test_file_url_escapes() {
        assert_eq!(
            file_url(Path::new("/Sound Library/door #1.wav")),
            "file:///Sound%20Library/door%20%231.wav"
        );
    }

    #[cfg(windows)]
    #[test]
    fn test_file_url_windows_drive() {
        assert_eq!(file_url(Path::new("C:\\SFX\\a.wav")), "file:///C:/SFX/a.wav");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_url_keeps_non_utf8_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/sfx/caf\xe9 door.wav"));
        assert_eq!(file_url(path), "file:///sfx/caf%E9%20door.wav");
    }

    /// Builder whose segment writes always fail
    struct FailingSegments(ObjectGraph);

    impl ContainerBuilder for FailingSegments {
        fn create_master_object(&mut self, name: &str) -> crate::graph::Result<MasterRef> {
            self.0.create_master_object(name)
        }
        fn create_source_object(
            &mut self,
            name: &str,
            format: &AudioFormatInfo,
        ) -> crate::graph::Result<SourceRef> {
            self.0.create_source_object(name, format)
        }
        fn assign_mob_id(&mut self, mob: MobRef, mob_id: &str) -> crate::graph::Result<()> {
            self.0.assign_mob_id(mob, mob_id)
        }
        fn attach_descriptor(
            &mut self,
            source: SourceRef,
            descriptor: EssenceDescriptor,
            representation: EssenceRef,
        ) -> crate::graph::Result<()> {
            self.0.attach_descriptor(source, descriptor, representation)
        }
        fn create_timeline_slot(
            &mut self,
            master: MasterRef,
            edit_rate: Rational,
            duration: Rational,
        ) -> crate::graph::Result<SlotRef> {
            self.0.create_timeline_slot(master, edit_rate, duration)
        }
        fn set_slot_segment(&mut self, _slot: SlotRef, _segment: Segment) -> crate::graph::Result<()> {
            Err(GraphError::Io {
                path: PathBuf::from("graph"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }
        fn add_comment(&mut self, master: MasterRef, key: &str, value: &str) -> crate::graph::Result<()> {
            self.0.add_comment(master, key, value)
        }
        fn create_locator(&mut self, url: &str) -> crate::graph::Result<crate::graph::LocatorRef> {
            self.0.create_locator(url)
        }
        fn write_essence_bytes(
            &mut self,
            source: SourceRef,
            offset: u64,
            length: u64,
            stream: &mut dyn ReadSeek,
        ) -> crate::graph::Result<u64> {
            self.0.write_essence_bytes(source, offset, length, stream)
        }
        fn save(&self, path: &Path) -> crate::graph::Result<Vec<std::path::PathBuf>> {
            self.0.save(path)
        }
    }

    #[test]
    fn test_pan_write_failure_is_reported() {
        let mut builder = FailingSegments(ObjectGraph::new());
        let clip = SourceClip {
            source: SourceRef(0),
            channel: 1,
            start: 0,
            length: 10,
        };

        // Mono never touches the builder
        assert_eq!(
            apply_pan(&mut builder, SlotRef(0), &clip, 1).unwrap(),
            PanOutcome::NotApplicable
        );
        assert!(apply_pan(&mut builder, SlotRef(0), &clip, 2).is_err());

        let image = WavBuilder::new().fmt(2, 48000, 16).data(pcm_ramp(48, 2)).build();
        let mut stream = Cursor::new(image);
        let metadata = read_wav(&mut stream).unwrap();
        let result = assemble(
            &mut builder,
            &identity("fail.wav"),
            &metadata,
            None,
            &options(EssenceMode::Embed),
            &mut stream,
        );
        assert!(matches!(result, Err(AssemblyError::Graph(_))));
    }
}
