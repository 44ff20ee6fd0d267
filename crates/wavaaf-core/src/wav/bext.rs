//! Broadcast extension (`bext`) chunk, EBU Tech 3285
//!
//! Layout (offsets in bytes):
//! ```text
//!   0  Description           256
//! 256  Originator             32
//! 288  OriginatorReference    32
//! 320  OriginationDate        10
//! 330  OriginationTime         8
//! 338  TimeReference (u64)     8
//! 346  Version (u16)           2
//! 348  UMID                   64
//! 412  LoudnessValue (i16)     2   version >= 1
//! 414  LoudnessRange           2
//! 416  MaxTruePeakLevel        2
//! 418  MaxMomentaryLoudness    2
//! 420  MaxShortTermLoudness    2
//! 422  Reserved              180
//! 602  CodingHistory         ...
//! ```

use super::fixed_text;

/// Text and timing fields plus version; anything shorter is unusable
pub const BEXT_MIN_SIZE: usize = 348;

/// Text, timing, version and UMID
pub const BEXT_BASE_SIZE: usize = 412;

const UMID_LEN: usize = 64;
const LOUDNESS_END: usize = 422;

/// The five loudness measurements of a version 1+ `bext` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoudnessKind {
    IntegratedLoudness,
    LoudnessRange,
    MaxTruePeak,
    MaxMomentaryLoudness,
    MaxShortTermLoudness,
}

impl LoudnessKind {
    pub const ALL: [LoudnessKind; 5] = [
        LoudnessKind::IntegratedLoudness,
        LoudnessKind::LoudnessRange,
        LoudnessKind::MaxTruePeak,
        LoudnessKind::MaxMomentaryLoudness,
        LoudnessKind::MaxShortTermLoudness,
    ];

    /// Comment key suffix
    pub fn key(self) -> &'static str {
        match self {
            LoudnessKind::IntegratedLoudness => "loudness_value",
            LoudnessKind::LoudnessRange => "loudness_range",
            LoudnessKind::MaxTruePeak => "max_true_peak_level",
            LoudnessKind::MaxMomentaryLoudness => "max_momentary_loudness",
            LoudnessKind::MaxShortTermLoudness => "max_short_term_loudness",
        }
    }

    fn offset(self) -> usize {
        BEXT_BASE_SIZE
            + 2 * match self {
                LoudnessKind::IntegratedLoudness => 0,
                LoudnessKind::LoudnessRange => 1,
                LoudnessKind::MaxTruePeak => 2,
                LoudnessKind::MaxMomentaryLoudness => 3,
                LoudnessKind::MaxShortTermLoudness => 4,
            }
    }
}

/// One loudness measurement, stored on disk as hundredths of a unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loudness {
    pub kind: LoudnessKind,
    pub value: f64,
}

/// Parsed `bext` chunk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastMetadata {
    pub description: String,
    pub originator: String,
    pub originator_reference: String,
    pub origination_date: String,
    pub origination_time: String,
    /// Sample count since midnight of the first sample
    pub time_reference: u64,
    pub version: u16,
    /// Upper-case hex; empty when the field is all zero or absent
    pub umid: String,
    pub loudness: Vec<Loudness>,
}

impl BroadcastMetadata {
    /// Parse a `bext` payload
    ///
    /// Returns the reason as `Err` when the payload is too short to hold the
    /// fixed text and timing fields.
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        if data.len() < BEXT_MIN_SIZE {
            return Err(format!(
                "bext chunk too small ({} bytes, need {})",
                data.len(),
                BEXT_MIN_SIZE
            ));
        }

        let mut time_reference = [0u8; 8];
        time_reference.copy_from_slice(&data[338..346]);
        let version = u16::from_le_bytes([data[346], data[347]]);

        let umid = if data.len() >= BEXT_MIN_SIZE + UMID_LEN {
            let raw = &data[BEXT_MIN_SIZE..BEXT_MIN_SIZE + UMID_LEN];
            if raw.iter().all(|&b| b == 0) {
                String::new()
            } else {
                raw.iter().map(|b| format!("{:02X}", b)).collect()
            }
        } else {
            String::new()
        };

        let loudness = if version >= 1 && data.len() >= LOUDNESS_END {
            LoudnessKind::ALL
                .iter()
                .filter_map(|&kind| {
                    let off = kind.offset();
                    let raw = i16::from_le_bytes([data[off], data[off + 1]]);
                    // Reserved sentinels mean "not measured"
                    if raw == i16::MAX || raw == i16::MIN {
                        None
                    } else {
                        Some(Loudness {
                            kind,
                            value: raw as f64 / 100.0,
                        })
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            description: fixed_text(&data[0..256]),
            originator: fixed_text(&data[256..288]),
            originator_reference: fixed_text(&data[288..320]),
            origination_date: fixed_text(&data[320..330]),
            origination_time: fixed_text(&data[330..338]),
            time_reference: u64::from_le_bytes(time_reference),
            version,
            umid,
            loudness,
        })
    }

    /// Look up one loudness measurement
    pub fn loudness(&self, kind: LoudnessKind) -> Option<f64> {
        self.loudness.iter().find(|l| l.kind == kind).map(|l| l.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize, version: u16) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[..11].copy_from_slice(b"Door slam\t!");
        data[256..262].copy_from_slice(b"Studio");
        data[338..346].copy_from_slice(&48000u64.to_le_bytes());
        data[346..348].copy_from_slice(&version.to_le_bytes());
        data
    }

    #[test]
    fn test_text_and_timing_fields() {
        let meta = BroadcastMetadata::parse(&payload(602, 0)).unwrap();
        assert_eq!(meta.description, "Door slam !");
        assert_eq!(meta.originator, "Studio");
        assert_eq!(meta.time_reference, 48000);
        assert_eq!(meta.version, 0);
        assert!(meta.umid.is_empty());
        assert!(meta.loudness.is_empty());
    }

    #[test]
    fn test_loudness_requires_version_one() {
        let mut data = payload(602, 0);
        data[412..414].copy_from_slice(&(-2300i16).to_le_bytes());
        assert!(BroadcastMetadata::parse(&data).unwrap().loudness.is_empty());

        data[346..348].copy_from_slice(&1u16.to_le_bytes());
        let meta = BroadcastMetadata::parse(&data).unwrap();
        assert_eq!(meta.loudness(LoudnessKind::IntegratedLoudness), Some(-23.0));
        // Zero is a measurement, not absence
        assert_eq!(meta.loudness(LoudnessKind::LoudnessRange), Some(0.0));
    }

    #[test]
    fn test_loudness_sentinels_are_absent() {
        let mut data = payload(602, 2);
        data[414..416].copy_from_slice(&i16::MAX.to_le_bytes());
        data[416..418].copy_from_slice(&i16::MIN.to_le_bytes());
        let meta = BroadcastMetadata::parse(&data).unwrap();
        assert_eq!(meta.loudness(LoudnessKind::LoudnessRange), None);
        assert_eq!(meta.loudness(LoudnessKind::MaxTruePeak), None);
        assert_eq!(meta.loudness.len(), 3);
    }

    #[test]
    fn test_base_layout_without_loudness() {
        // Version 1 but the record stops after the UMID
        let mut data = payload(BEXT_BASE_SIZE, 1);
        data[348] = 0x06;
        data[349] = 0x0A;
        let meta = BroadcastMetadata::parse(&data).unwrap();
        assert!(meta.loudness.is_empty());
        assert!(meta.umid.starts_with("060A"));
        assert_eq!(meta.umid.len(), 128);
    }

    #[test]
    fn test_too_small_is_rejected() {
        assert!(BroadcastMetadata::parse(&[0u8; 300]).is_err());
    }
}
