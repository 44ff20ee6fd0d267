//! RIFF/RF64 broadcast WAV chunk reader
//!
//! Walks the flat chunk list of a WAV/BWF/RF64 file in a single pass and
//! collects everything the AAF assembler needs:
//!
//! - `fmt `: sample format ([`AudioFormatInfo`])
//! - `data`: offset and length of the PCM region (not copied)
//! - `bext`: broadcast extension ([`BroadcastMetadata`])
//! - `LIST`/`INFO`: attribution tags ([`TagListMetadata`])
//! - any other chunk whose payload sniffs as XML ([`StructuredTextMetadata`])
//!
//! A missing RIFF header, `fmt ` or `data` chunk rejects the file. A damaged
//! metadata chunk only stops the walk: whatever was parsed before it is kept
//! and the problem is reported as a [`ChunkWarning`].

mod bext;
mod info;
mod xml;

pub use bext::{BroadcastMetadata, Loudness, LoudnessKind, BEXT_BASE_SIZE, BEXT_MIN_SIZE};
pub use info::{InfoTag, TagListMetadata};
pub use xml::{StructuredTextMetadata, XmlKind};

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

/// PCM format tag in the `fmt ` chunk
pub const WAVE_FORMAT_PCM: u16 = 0x0001;

/// Extensible format tag; the real encoding lives in the sub-format GUID
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size value RF64 files store in 32-bit length fields that overflow
const RF64_SIZE_PLACEHOLDER: u32 = 0xFFFF_FFFF;

/// Bytes read from an unrecognised chunk to decide whether it holds XML
const SNIFF_LEN: usize = 64;

/// Upper bound for a structured-text payload we are willing to load
const MAX_TEXT_CHUNK: u64 = 16 * 1024 * 1024;

/// Errors that reject a file before any metadata is produced
#[derive(Error, Debug)]
pub enum WavError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a RIFF/RF64 file")]
    NotRiff,

    #[error("Not a WAVE file")]
    NotWave,

    #[error("Missing required chunk: {0}")]
    MissingChunk(&'static str),

    #[error("File corrupted: {0}")]
    Corrupted(String),
}

/// A metadata chunk that could not be fully parsed
///
/// The file is still usable; the warning ends up in the per-file result log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWarning {
    /// Four-character chunk tag
    pub tag: String,
    /// File offset of the chunk header
    pub offset: u64,
    /// What went wrong
    pub reason: String,
}

impl std::fmt::Display for ChunkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' chunk at offset {}: {}", self.tag, self.offset, self.reason)
    }
}

/// Audio format information from the `fmt ` and `data` chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormatInfo {
    /// Audio format tag (1 = PCM, 0xFFFE = extensible)
    pub format_tag: u16,
    /// Number of interleaved channels
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Average bytes per second
    pub byte_rate: u32,
    /// Bytes per sample frame (channels * bits_per_sample / 8)
    pub block_align: u16,
    /// Bits per sample (16, 24, 32...)
    pub bits_per_sample: u16,
    /// Number of sample frames in the data chunk
    pub sample_frames: u64,
    /// Byte offset of the PCM region in the source file
    pub data_offset: u64,
    /// Byte length of the PCM region
    pub data_length: u64,
    /// Raw `fmt ` payload, reused as the wave descriptor summary
    pub fmt_chunk: Vec<u8>,
    /// True if the file is RF64 (64-bit sizes from `ds64`)
    pub is_rf64: bool,
}

impl AudioFormatInfo {
    /// Check whether the samples are plain integer PCM
    ///
    /// Extensible files are PCM when the first two bytes of the sub-format
    /// GUID (offset 24 of the `fmt ` payload) carry the PCM tag.
    pub fn is_pcm(&self) -> bool {
        match self.format_tag {
            WAVE_FORMAT_PCM => true,
            WAVE_FORMAT_EXTENSIBLE => {
                self.fmt_chunk.len() >= 26
                    && u16::from_le_bytes([self.fmt_chunk[24], self.fmt_chunk[25]]) == WAVE_FORMAT_PCM
            }
            _ => false,
        }
    }

    /// Bytes per sample for a single channel
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample.div_ceil(8)
    }
}

/// Everything extracted from one WAV file
#[derive(Debug, Clone)]
pub struct WavMetadata {
    pub format: AudioFormatInfo,
    pub bext: Option<BroadcastMetadata>,
    pub info: Option<TagListMetadata>,
    pub xml: Vec<StructuredTextMetadata>,
    /// Chunks that were abandoned part-way
    pub warnings: Vec<ChunkWarning>,
}

impl WavMetadata {
    /// True if at least one metadata chunk could not be fully parsed
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// BEXT description, if present and non-empty
    pub fn description(&self) -> Option<&str> {
        self.bext
            .as_ref()
            .map(|b| b.description.as_str())
            .filter(|d| !d.is_empty())
    }
}

/// The closed set of chunk kinds the reader dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkKind {
    Format,
    Data,
    DataSize64,
    Broadcast,
    List,
    Other([u8; 4]),
}

impl ChunkKind {
    fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"fmt " => ChunkKind::Format,
            b"data" => ChunkKind::Data,
            b"ds64" => ChunkKind::DataSize64,
            b"bext" => ChunkKind::Broadcast,
            b"LIST" => ChunkKind::List,
            _ => ChunkKind::Other(tag),
        }
    }
}

/// Render a chunk tag for logs and warnings
pub(crate) fn tag_name(tag: &[u8]) -> String {
    tag.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

/// Clean string data for metadata output
///
/// Tabs and line breaks become spaces, other control characters are removed
/// and runs of whitespace collapse to a single space.
pub fn sanitize_text(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a fixed-width, NUL-padded text field
pub(crate) fn fixed_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    sanitize_text(&String::from_utf8_lossy(&bytes[..end]))
}

/// Open a WAV file and read its metadata without loading audio data
pub fn read_wav_file<P: AsRef<Path>>(path: P) -> Result<WavMetadata, WavError> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    read_wav(&mut reader)
}

/// Walk the chunks of a RIFF/RF64 WAVE stream
pub fn read_wav<R: Read + Seek>(reader: &mut R) -> Result<WavMetadata, WavError> {
    let stream_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    if stream_len < 12 {
        return Err(WavError::NotRiff);
    }

    let mut header = [0u8; 12];
    reader.read_exact(&mut header)?;

    let is_rf64 = match &header[0..4] {
        b"RIFF" => false,
        b"RF64" => true,
        _ => return Err(WavError::NotRiff),
    };
    if &header[8..12] != b"WAVE" {
        return Err(WavError::NotWave);
    }

    let mut format: Option<AudioFormatInfo> = None;
    let mut data_span: Option<(u64, u64)> = None;
    let mut ds64_data_size: Option<u64> = None;
    let mut bext: Option<BroadcastMetadata> = None;
    let mut info: Option<TagListMetadata> = None;
    let mut structured = Vec::new();
    let mut warnings = Vec::new();

    let mut pos: u64 = 12;
    while pos + 8 <= stream_len {
        reader.seek(SeekFrom::Start(pos))?;
        let mut chunk_header = [0u8; 8];
        reader.read_exact(&mut chunk_header)?;

        let tag = [chunk_header[0], chunk_header[1], chunk_header[2], chunk_header[3]];
        let size32 = u32::from_le_bytes([
            chunk_header[4],
            chunk_header[5],
            chunk_header[6],
            chunk_header[7],
        ]);
        let kind = ChunkKind::from_tag(tag);

        // RF64 stores the real data size in ds64
        let size = match (kind, ds64_data_size) {
            (ChunkKind::Data, Some(real)) if size32 == RF64_SIZE_PLACEHOLDER => real,
            _ => size32 as u64,
        };

        let payload_start = pos + 8;
        let Some(payload_end) = payload_start.checked_add(size) else {
            return Err(WavError::Corrupted(format!(
                "'{}' chunk at {} declares an impossible size of {} bytes",
                tag_name(&tag),
                pos,
                size
            )));
        };

        if payload_end > stream_len {
            let remaining = stream_len - payload_start;
            if kind == ChunkKind::Data {
                return Err(WavError::Corrupted(format!(
                    "data chunk declares {} bytes but only {} remain",
                    size, remaining
                )));
            }
            log::warn!(
                "read_wav: '{}' chunk at {} declares {} bytes, only {} remain",
                tag_name(&tag),
                pos,
                size,
                remaining
            );
            warnings.push(ChunkWarning {
                tag: tag_name(&tag),
                offset: pos,
                reason: format!("declares {} bytes but only {} remain", size, remaining),
            });
            break;
        }

        match kind {
            ChunkKind::Format => {
                let payload = read_payload(reader, size)?;
                format = Some(parse_fmt_chunk(&payload)?);
            }
            ChunkKind::Data => {
                data_span = Some((payload_start, size));
            }
            ChunkKind::DataSize64 => {
                let payload = read_payload(reader, size)?;
                if is_rf64 && payload.len() >= 16 {
                    // riff_size (8 bytes) then data_size (8 bytes)
                    let mut data_size = [0u8; 8];
                    data_size.copy_from_slice(&payload[8..16]);
                    ds64_data_size = Some(u64::from_le_bytes(data_size));
                } else if is_rf64 {
                    warnings.push(ChunkWarning {
                        tag: tag_name(&tag),
                        offset: pos,
                        reason: "ds64 chunk too small".into(),
                    });
                }
            }
            ChunkKind::Broadcast => {
                let payload = read_payload(reader, size)?;
                match BroadcastMetadata::parse(&payload) {
                    Ok(parsed) => bext = Some(parsed),
                    Err(reason) => warnings.push(ChunkWarning {
                        tag: tag_name(&tag),
                        offset: pos,
                        reason,
                    }),
                }
            }
            ChunkKind::List => {
                let payload = read_payload(reader, size)?;
                if let Some((entries, problem)) = TagListMetadata::parse_list(&payload) {
                    info.get_or_insert_with(TagListMetadata::default)
                        .extend(entries);
                    if let Some(reason) = problem {
                        warnings.push(ChunkWarning {
                            tag: tag_name(&tag),
                            offset: pos,
                            reason,
                        });
                    }
                }
            }
            ChunkKind::Other(other) => {
                let sniff_len = (size as usize).min(SNIFF_LEN);
                let head = read_payload(reader, sniff_len as u64)?;
                if xml::looks_like_xml(&head) {
                    if size > MAX_TEXT_CHUNK {
                        warnings.push(ChunkWarning {
                            tag: tag_name(&other),
                            offset: pos,
                            reason: format!("structured text chunk too large ({} bytes)", size),
                        });
                    } else {
                        reader.seek(SeekFrom::Start(payload_start))?;
                        let payload = read_payload(reader, size)?;
                        match StructuredTextMetadata::parse(&other, &payload) {
                            Some(parsed) => {
                                log::debug!(
                                    "read_wav: '{}' chunk classified as {:?} ({} entries)",
                                    tag_name(&other),
                                    parsed.kind,
                                    parsed.entries.len()
                                );
                                structured.push(parsed);
                            }
                            None => log::debug!(
                                "read_wav: '{}' chunk is not text, skipped",
                                tag_name(&other)
                            ),
                        }
                    }
                }
            }
        }

        // Pad to word boundary
        pos = match payload_end.checked_add(size & 1) {
            Some(next) => next,
            None => break,
        };
    }

    let mut format = format.ok_or(WavError::MissingChunk("fmt"))?;
    let (data_offset, data_length) = data_span.ok_or(WavError::MissingChunk("data"))?;

    format.data_offset = data_offset;
    format.data_length = data_length;
    format.sample_frames = if format.block_align > 0 {
        data_length / format.block_align as u64
    } else {
        0
    };
    format.is_rf64 = is_rf64;

    Ok(WavMetadata {
        format,
        bext,
        info,
        xml: structured,
        warnings,
    })
}

/// Read exactly `size` bytes at the current position
fn read_payload<R: Read>(reader: &mut R, size: u64) -> Result<Vec<u8>, WavError> {
    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Parse the `fmt ` chunk payload
fn parse_fmt_chunk(fmt_data: &[u8]) -> Result<AudioFormatInfo, WavError> {
    if fmt_data.len() < 16 {
        return Err(WavError::Corrupted("fmt chunk too small".into()));
    }

    Ok(AudioFormatInfo {
        format_tag: u16::from_le_bytes([fmt_data[0], fmt_data[1]]),
        channels: u16::from_le_bytes([fmt_data[2], fmt_data[3]]),
        sample_rate: u32::from_le_bytes([fmt_data[4], fmt_data[5], fmt_data[6], fmt_data[7]]),
        byte_rate: u32::from_le_bytes([fmt_data[8], fmt_data[9], fmt_data[10], fmt_data[11]]),
        block_align: u16::from_le_bytes([fmt_data[12], fmt_data[13]]),
        bits_per_sample: u16::from_le_bytes([fmt_data[14], fmt_data[15]]),
        sample_frames: 0,
        data_offset: 0,
        data_length: 0,
        fmt_chunk: fmt_data.to_vec(),
        is_rf64: false,
    })
}

/// Read the PCM region recorded in `format` from the stream
///
/// Reads the exact span the chunk walk found; calling it twice on the same
/// stream yields identical bytes.
pub fn read_pcm<R: Read + Seek>(reader: &mut R, format: &AudioFormatInfo) -> Result<Vec<u8>, WavError> {
    reader.seek(SeekFrom::Start(format.data_offset))?;
    let mut pcm = vec![0u8; format.data_length as usize];
    reader.read_exact(&mut pcm)?;
    Ok(pcm)
}


#[cfg(test)]
mod tests {
    use super::test_support::{pcm_ramp, WavBuilder};
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_basic_format() {
        let pcm = pcm_ramp(480, 2);
        let image = WavBuilder::new().fmt(2, 48000, 16).data(pcm.clone()).build();
        let meta = read_wav(&mut Cursor::new(image)).unwrap();

        assert_eq!(meta.format.channels, 2);
        assert_eq!(meta.format.sample_rate, 48000);
        assert_eq!(meta.format.bits_per_sample, 16);
        assert_eq!(meta.format.block_align, 4);
        assert_eq!(meta.format.sample_frames, 480);
        assert_eq!(meta.format.data_length, pcm.len() as u64);
        assert_eq!(meta.format.data_offset, 12 + 8 + 16 + 8);
        assert!(meta.format.is_pcm());
        assert!(meta.bext.is_none());
        assert!(meta.info.is_none());
        assert!(meta.warnings.is_empty());
    }

    #[test]
    fn test_pcm_reread_is_identical() {
        let pcm = pcm_ramp(100, 1);
        let image = WavBuilder::new()
            .fmt(1, 44100, 16)
            .bext("odd length padding test", 1, None)
            .data(pcm.clone())
            .build();
        let mut cursor = Cursor::new(image);
        let meta = read_wav(&mut cursor).unwrap();

        let first = read_pcm(&mut cursor, &meta.format).unwrap();
        let second = read_pcm(&mut cursor, &meta.format).unwrap();
        assert_eq!(first, pcm);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_non_riff() {
        let result = read_wav(&mut Cursor::new(b"not a real mp3 file at all".to_vec()));
        assert!(matches!(result, Err(WavError::NotRiff)));

        let image = WavBuilder::new().magic(b"RIFX").fmt(1, 48000, 16).build();
        assert!(matches!(read_wav(&mut Cursor::new(image)), Err(WavError::NotRiff)));
    }

    #[test]
    fn test_missing_data_chunk() {
        let image = WavBuilder::new().fmt(1, 48000, 16).bext("no data", 0, None).build();
        let result = read_wav(&mut Cursor::new(image));
        assert!(matches!(result, Err(WavError::MissingChunk("data"))));
    }

    #[test]
    fn test_missing_fmt_chunk() {
        let image = WavBuilder::new().data(pcm_ramp(10, 1)).build();
        let result = read_wav(&mut Cursor::new(image));
        assert!(matches!(result, Err(WavError::MissingChunk("fmt"))));
    }

    #[test]
    fn test_truncated_metadata_chunk_keeps_earlier_metadata() {
        let mut image = WavBuilder::new()
            .fmt(1, 48000, 16)
            .info(&[(b"IART", "Someone")])
            .data(pcm_ramp(10, 1))
            .build();
        // Trailing chunk whose declared length runs past the end of the stream
        image.extend_from_slice(b"bext");
        image.extend_from_slice(&602u32.to_le_bytes());
        image.extend_from_slice(&[0u8; 20]);

        let meta = read_wav(&mut Cursor::new(image)).unwrap();
        assert!(meta.is_partial());
        assert_eq!(meta.warnings[0].tag, "bext");
        assert_eq!(
            meta.info.as_ref().unwrap().get(&InfoTag::Artist),
            Some("Someone")
        );
        assert!(meta.bext.is_none());
    }

    #[test]
    fn test_truncated_data_chunk_is_fatal() {
        let mut image = WavBuilder::new().fmt(1, 48000, 16).build();
        image.extend_from_slice(b"data");
        image.extend_from_slice(&1000u32.to_le_bytes());
        image.extend_from_slice(&[0u8; 10]);
        assert!(matches!(
            read_wav(&mut Cursor::new(image)),
            Err(WavError::Corrupted(_))
        ));
    }

    #[test]
    fn test_xml_chunk_is_sniffed() {
        let xml = br#"<?xml version="1.0"?><BWFMetaEdit><Title>Door</Title></BWFMetaEdit>"#;
        let image = WavBuilder::new()
            .fmt(1, 48000, 16)
            .chunk(b"iXML", xml.to_vec())
            .chunk(b"junk", vec![0xFFu8; 32])
            .data(pcm_ramp(10, 1))
            .build();
        let meta = read_wav(&mut Cursor::new(image)).unwrap();
        assert_eq!(meta.xml.len(), 1);
        assert_eq!(meta.xml[0].kind, XmlKind::MetadataEditor);
        assert_eq!(meta.xml[0].get("Title"), Some("Door"));
    }

    #[test]
    fn test_rf64_data_size_from_ds64() {
        let pcm = pcm_ramp(64, 2);
        let mut ds64 = vec![0u8; 28];
        ds64[8..16].copy_from_slice(&(pcm.len() as u64).to_le_bytes());

        let mut image = WavBuilder::new()
            .magic(b"RF64")
            .chunk(b"ds64", ds64)
            .fmt(2, 48000, 16)
            .build();
        image.extend_from_slice(b"data");
        image.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        image.extend_from_slice(&pcm);

        let meta = read_wav(&mut Cursor::new(image)).unwrap();
        assert!(meta.format.is_rf64);
        assert_eq!(meta.format.data_length, pcm.len() as u64);
        assert_eq!(meta.format.sample_frames, 64);
    }

    #[test]
    fn test_rf64_huge_ds64_size_is_corrupted() {
        let mut ds64 = vec![0u8; 28];
        ds64[8..16].copy_from_slice(&(u64::MAX - 4).to_le_bytes());

        let mut image = WavBuilder::new()
            .magic(b"RF64")
            .chunk(b"ds64", ds64)
            .fmt(2, 48000, 16)
            .build();
        image.extend_from_slice(b"data");
        image.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        image.extend_from_slice(&pcm_ramp(16, 2));

        assert!(matches!(
            read_wav(&mut Cursor::new(image)),
            Err(WavError::Corrupted(_))
        ));
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("  Door\tslam\r\n  heavy  "), "Door slam heavy");
        assert_eq!(sanitize_text("bell\u{7}ring"), "bellring");
        assert_eq!(sanitize_text(""), "");
    }

    #[test]
    fn test_reads_hound_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..4800 {
            writer.write_sample(i as i32).unwrap();
        }
        writer.finalize().unwrap();

        let meta = read_wav_file(&path).unwrap();
        assert_eq!(meta.format.sample_rate, 48000);
        assert_eq!(meta.format.bits_per_sample, 24);
        assert_eq!(meta.format.sample_frames, 4800);
        assert_eq!(meta.format.data_length, 4800 * 3);
    }
}
