//! Container object-graph API
//!
//! The assembler builds its output through [`ContainerBuilder`]: master
//! objects (clip level, named, annotated with comments), source objects
//! (one per input file, carrying the essence descriptor and the essence
//! itself or a locator), and timeline slots whose segment is either a plain
//! source clip or a pan operation wrapping one.
//!
//! Objects are addressed by arena indices ([`MasterRef`], [`SourceRef`],
//! [`SlotRef`], [`LocatorRef`]) handed out by the builder.
//! [`ObjectGraph`] is the in-memory implementation.

mod memory;

pub use memory::{
    Comment, Locator, MasterObject, ObjectGraph, SourceObject, TimelineSlot, MANIFEST_FORMAT,
};

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::timecode::Rational;
use crate::wav::AudioFormatInfo;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Unknown {kind} reference #{index}")]
    InvalidReference { kind: &'static str, index: usize },

    #[error("Source #{0} already has an essence descriptor")]
    DescriptorAlreadyAttached(usize),

    #[error("Source #{0} has no embedded essence")]
    NotEmbedded(usize),

    #[error("Essence for source #{source_index}: expected {expected} bytes, got {actual}")]
    EssenceLength {
        source_index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("Failed to read essence: {0}")]
    EssenceRead(#[source] std::io::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize object graph: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MasterRef(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceRef(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SlotRef(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LocatorRef(pub(crate) usize);

/// Either kind of mob, for identifier assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobRef {
    Master(MasterRef),
    Source(SourceRef),
}

/// Audio essence descriptor of a source object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EssenceDescriptor {
    /// Always "PCM" for this converter
    pub coding: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub block_align: u16,
    /// Length in sample frames
    pub length: u64,
    /// Raw `fmt ` payload as hex, the wave descriptor summary
    pub summary: String,
}

impl EssenceDescriptor {
    pub fn from_format(format: &AudioFormatInfo) -> Self {
        Self {
            coding: "PCM".into(),
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            block_align: format.block_align,
            length: format.sample_frames,
            summary: format.fmt_chunk.iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }
}

/// Where a source object's essence lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EssenceRef {
    /// Bytes copied into the container; `length` must be written in full
    Embedded { length: u64 },
    /// External file reached through a locator
    Linked { locator: LocatorRef },
}

/// Reference from a timeline slot into a source object channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceClip {
    pub source: SourceRef,
    /// 1-based physical channel
    pub channel: u16,
    /// Start in edit units
    pub start: i64,
    /// Length in edit units
    pub length: i64,
}

/// Point on a constant or varying parameter curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlPoint {
    /// Normalised position within the operation, 0 to 1
    pub time: Rational,
    pub value: Rational,
}

/// Mono audio pan applied to a source clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanOperation {
    pub input: SourceClip,
    pub points: Vec<ControlPoint>,
}

impl PanOperation {
    /// Constant pan over the whole clip
    pub fn constant(input: SourceClip, value: Rational) -> Self {
        Self {
            input,
            points: vec![
                ControlPoint {
                    time: Rational::ZERO,
                    value,
                },
                ControlPoint {
                    time: Rational::from_int(1),
                    value,
                },
            ],
        }
    }
}

/// Content of a timeline slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    SourceClip(SourceClip),
    Pan(PanOperation),
}

impl Segment {
    /// The source clip, directly or inside an operation
    pub fn clip(&self) -> &SourceClip {
        match self {
            Segment::SourceClip(clip) => clip,
            Segment::Pan(op) => &op.input,
        }
    }
}

/// Object-safe `Read + Seek`
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Object-graph API of the output container
pub trait ContainerBuilder {
    fn create_master_object(&mut self, name: &str) -> Result<MasterRef>;

    /// Source object for one input file; `format` sets its native edit rate
    fn create_source_object(&mut self, name: &str, format: &AudioFormatInfo) -> Result<SourceRef>;

    fn assign_mob_id(&mut self, mob: MobRef, mob_id: &str) -> Result<()>;

    fn attach_descriptor(
        &mut self,
        source: SourceRef,
        descriptor: EssenceDescriptor,
        representation: EssenceRef,
    ) -> Result<()>;

    fn create_timeline_slot(
        &mut self,
        master: MasterRef,
        edit_rate: Rational,
        duration: Rational,
    ) -> Result<SlotRef>;

    fn set_slot_segment(&mut self, slot: SlotRef, segment: Segment) -> Result<()>;

    fn add_comment(&mut self, master: MasterRef, key: &str, value: &str) -> Result<()>;

    fn create_locator(&mut self, url: &str) -> Result<LocatorRef>;

    /// Copy `length` bytes starting at `offset` of `stream` into the
    /// source's embedded essence; returns the number of bytes written
    fn write_essence_bytes(
        &mut self,
        source: SourceRef,
        offset: u64,
        length: u64,
        stream: &mut dyn ReadSeek,
    ) -> Result<u64>;

    /// Persist the graph; returns every file written
    fn save(&self, path: &Path) -> Result<Vec<PathBuf>>;
}
