//! In-memory object graph persisted as a JSON manifest
//!
//! `save(path)` writes the manifest to `path` and each embedded source's
//! essence to a raw sidecar next to it (`<stem>.<n>.pcm`). All files go
//! through `.partial` files and are renamed only once every one of them has
//! been written. The manifest is renamed last; if that fails, sidecars
//! already renamed are removed again.

use std::io::{Read, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{
    ContainerBuilder, EssenceDescriptor, EssenceRef, GraphError, LocatorRef, MasterRef, MobRef,
    ReadSeek, Result, Segment, SlotRef, SourceRef,
};
use crate::output::{PartialFile, TempFileGuard};
use crate::timecode::Rational;
use crate::wav::AudioFormatInfo;

/// Value of the manifest's `format` field
pub const MANIFEST_FORMAT: &str = "wavaaf-object-graph";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterObject {
    pub name: String,
    pub mob_id: Option<String>,
    pub comments: Vec<Comment>,
    pub slots: Vec<SlotRef>,
}

impl MasterObject {
    pub fn comment(&self, key: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceObject {
    pub name: String,
    pub mob_id: Option<String>,
    /// Native rate of the essence (the sample rate)
    pub edit_rate: Rational,
    pub descriptor: Option<EssenceDescriptor>,
    pub essence: Option<EssenceRef>,
    #[serde(skip)]
    essence_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineSlot {
    pub master: MasterRef,
    /// 1-based within its master
    pub slot_id: u32,
    pub edit_rate: Rational,
    /// Exact duration in edit units
    pub duration: Rational,
    pub segment: Option<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    pub url: String,
}

/// Arena-backed implementation of [`ContainerBuilder`]
#[derive(Debug, Default)]
pub struct ObjectGraph {
    masters: Vec<MasterObject>,
    sources: Vec<SourceObject>,
    slots: Vec<TimelineSlot>,
    locators: Vec<Locator>,
}

#[derive(Serialize)]
struct SourceEntry<'a> {
    #[serde(flatten)]
    object: &'a SourceObject,
    essence_file: Option<String>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    format: &'static str,
    version: u32,
    masters: &'a [MasterObject],
    sources: Vec<SourceEntry<'a>>,
    slots: &'a [TimelineSlot],
    locators: &'a [Locator],
}

fn invalid(kind: &'static str, index: usize) -> GraphError {
    GraphError::InvalidReference { kind, index }
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn masters(&self) -> &[MasterObject] {
        &self.masters
    }

    pub fn sources(&self) -> &[SourceObject] {
        &self.sources
    }

    pub fn locators(&self) -> &[Locator] {
        &self.locators
    }

    pub fn master(&self, master: MasterRef) -> Option<&MasterObject> {
        self.masters.get(master.0)
    }

    pub fn source(&self, source: SourceRef) -> Option<&SourceObject> {
        self.sources.get(source.0)
    }

    pub fn slot(&self, slot: SlotRef) -> Option<&TimelineSlot> {
        self.slots.get(slot.0)
    }

    pub fn locator(&self, locator: LocatorRef) -> Option<&Locator> {
        self.locators.get(locator.0)
    }

    /// Slots of a master in slot order
    pub fn master_slots(&self, master: MasterRef) -> Vec<&TimelineSlot> {
        self.master(master)
            .map(|m| m.slots.iter().filter_map(|s| self.slot(*s)).collect())
            .unwrap_or_default()
    }

    /// Embedded essence written so far
    pub fn essence_bytes(&self, source: SourceRef) -> Option<&[u8]> {
        self.source(source).map(|s| s.essence_bytes.as_slice())
    }

    fn master_mut(&mut self, master: MasterRef) -> Result<&mut MasterObject> {
        self.masters
            .get_mut(master.0)
            .ok_or_else(|| invalid("master", master.0))
    }

    fn source_mut(&mut self, source: SourceRef) -> Result<&mut SourceObject> {
        self.sources
            .get_mut(source.0)
            .ok_or_else(|| invalid("source", source.0))
    }

    /// Check the refs a segment points at
    fn check_segment(&self, segment: &Segment) -> Result<()> {
        let clip = segment.clip();
        if self.source(clip.source).is_none() {
            return Err(invalid("source", clip.source.0));
        }
        Ok(())
    }

    fn sidecar_path(path: &Path, index: usize) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "graph".to_string());
        path.with_file_name(format!("{}.{}.pcm", stem, index + 1))
    }
}

impl ContainerBuilder for ObjectGraph {
    fn create_master_object(&mut self, name: &str) -> Result<MasterRef> {
        self.masters.push(MasterObject {
            name: name.to_string(),
            mob_id: None,
            comments: Vec::new(),
            slots: Vec::new(),
        });
        Ok(MasterRef(self.masters.len() - 1))
    }

    fn create_source_object(&mut self, name: &str, format: &AudioFormatInfo) -> Result<SourceRef> {
        self.sources.push(SourceObject {
            name: name.to_string(),
            mob_id: None,
            edit_rate: Rational::from_int(format.sample_rate as i64),
            descriptor: None,
            essence: None,
            essence_bytes: Vec::new(),
        });
        Ok(SourceRef(self.sources.len() - 1))
    }

    fn assign_mob_id(&mut self, mob: MobRef, mob_id: &str) -> Result<()> {
        match mob {
            MobRef::Master(m) => self.master_mut(m)?.mob_id = Some(mob_id.to_string()),
            MobRef::Source(s) => self.source_mut(s)?.mob_id = Some(mob_id.to_string()),
        }
        Ok(())
    }

    fn attach_descriptor(
        &mut self,
        source: SourceRef,
        descriptor: EssenceDescriptor,
        representation: EssenceRef,
    ) -> Result<()> {
        if let EssenceRef::Linked { locator } = representation {
            if self.locator(locator).is_none() {
                return Err(invalid("locator", locator.0));
            }
        }
        let object = self.source_mut(source)?;
        if object.descriptor.is_some() {
            return Err(GraphError::DescriptorAlreadyAttached(source.0));
        }
        object.descriptor = Some(descriptor);
        object.essence = Some(representation);
        Ok(())
    }

    fn create_timeline_slot(
        &mut self,
        master: MasterRef,
        edit_rate: Rational,
        duration: Rational,
    ) -> Result<SlotRef> {
        let slot = SlotRef(self.slots.len());
        let object = self.master_mut(master)?;
        object.slots.push(slot);
        let slot_id = object.slots.len() as u32;
        self.slots.push(TimelineSlot {
            master,
            slot_id,
            edit_rate,
            duration,
            segment: None,
        });
        Ok(slot)
    }

    fn set_slot_segment(&mut self, slot: SlotRef, segment: Segment) -> Result<()> {
        self.check_segment(&segment)?;
        let object = self
            .slots
            .get_mut(slot.0)
            .ok_or_else(|| invalid("slot", slot.0))?;
        object.segment = Some(segment);
        Ok(())
    }

    fn add_comment(&mut self, master: MasterRef, key: &str, value: &str) -> Result<()> {
        let object = self.master_mut(master)?;
        match object.comments.iter_mut().find(|c| c.key == key) {
            Some(existing) => existing.value = value.to_string(),
            None => object.comments.push(Comment {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
        Ok(())
    }

    fn create_locator(&mut self, url: &str) -> Result<LocatorRef> {
        self.locators.push(Locator {
            url: url.to_string(),
        });
        Ok(LocatorRef(self.locators.len() - 1))
    }

    fn write_essence_bytes(
        &mut self,
        source: SourceRef,
        offset: u64,
        length: u64,
        stream: &mut dyn ReadSeek,
    ) -> Result<u64> {
        let object = self.source_mut(source)?;
        if !matches!(object.essence, Some(EssenceRef::Embedded { .. })) {
            return Err(GraphError::NotEmbedded(source.0));
        }

        stream
            .seek(SeekFrom::Start(offset))
            .map_err(GraphError::EssenceRead)?;
        let mut buffer = Vec::with_capacity(length as usize);
        let read = Read::take(&mut *stream, length)
            .read_to_end(&mut buffer)
            .map_err(GraphError::EssenceRead)? as u64;
        if read != length {
            return Err(GraphError::EssenceLength {
                source_index: source.0,
                expected: length,
                actual: read,
            });
        }

        object.essence_bytes.extend_from_slice(&buffer);
        Ok(read)
    }

    fn save(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| GraphError::Io { path, source }
        };

        let mut sidecars = Vec::new();
        let mut entries = Vec::with_capacity(self.sources.len());

        for (index, source) in self.sources.iter().enumerate() {
            let mut essence_file = None;
            if let Some(EssenceRef::Embedded { length }) = source.essence {
                let actual = source.essence_bytes.len() as u64;
                if actual != length {
                    return Err(GraphError::EssenceLength {
                        source_index: index,
                        expected: length,
                        actual,
                    });
                }
                let sidecar = Self::sidecar_path(path, index);
                sidecars.push(
                    PartialFile::write(&sidecar, &source.essence_bytes)
                        .map_err(io_error(&sidecar))?,
                );
                essence_file = sidecar
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
            }
            entries.push(SourceEntry {
                object: source,
                essence_file,
            });
        }

        let manifest = Manifest {
            format: MANIFEST_FORMAT,
            version: MANIFEST_VERSION,
            masters: &self.masters,
            sources: entries,
            slots: &self.slots,
            locators: &self.locators,
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        let manifest_file = PartialFile::write(path, &json).map_err(io_error(path))?;

        // Committed sidecars stay armed until the manifest is in place
        let mut committed: Vec<TempFileGuard> = Vec::with_capacity(sidecars.len());
        for partial in sidecars {
            let target = partial.target().to_path_buf();
            let written = partial.commit().map_err(io_error(&target))?;
            committed.push(TempFileGuard::new(written));
        }
        let manifest_path = manifest_file.commit().map_err(io_error(path))?;

        let mut written = Vec::with_capacity(committed.len() + 1);
        for mut guard in committed {
            guard.disarm();
            written.push(guard.path().to_path_buf());
        }
        written.push(manifest_path);

        log::debug!("ObjectGraph::save: wrote {} file(s) for {:?}", written.len(), path);
        Ok(written)
    }
}
