//! Flattening of file metadata into master-object comments
//!
//! Keys are namespaced by origin: `bext_*`, `info_*`, `<xml kind>_*`,
//! `ucs_*`, `tc_*` and `file_*`. Empty values are never emitted.

use chrono::{DateTime, Utc};

use super::FileIdentity;
use crate::timecode::TimecodeInfo;
use crate::ucs::CategorizationResult;
use crate::wav::{BroadcastMetadata, WavMetadata};

/// Ordered comment list that skips empty values
#[derive(Debug, Default)]
struct CommentList(Vec<(String, String)>);

impl CommentList {
    fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.0.push((key.into(), value));
        }
    }
}

fn bext_comments(out: &mut CommentList, bext: &BroadcastMetadata) {
    out.push("bext_description", bext.description.as_str());
    out.push("bext_originator", bext.originator.as_str());
    out.push("bext_originator_reference", bext.originator_reference.as_str());
    out.push("bext_origination_date", bext.origination_date.as_str());
    out.push("bext_origination_time", bext.origination_time.as_str());
    out.push("bext_time_reference", bext.time_reference.to_string());
    out.push("bext_version", bext.version.to_string());
    out.push("bext_umid", bext.umid.as_str());
    for loudness in &bext.loudness {
        out.push(
            format!("bext_{}", loudness.kind.key()),
            format!("{:.2}", loudness.value),
        );
    }
}

fn ucs_comments(out: &mut CommentList, result: &CategorizationResult, threshold: f64) {
    let primary = &result.primary;
    out.push("ucs_id", primary.id.as_str());
    out.push("ucs_category", primary.category.as_str());
    out.push("ucs_subcategory", primary.subcategory.as_str());
    out.push("ucs_full_name", primary.full_name.as_str());
    out.push("ucs_score", format!("{:.1}", primary.score));
    out.push("ucs_match", result.tier.as_str());
    if result.is_low_confidence(threshold) {
        out.push("ucs_low_confidence", "true");
    }
    let alternates: Vec<String> = result
        .alternates
        .iter()
        .map(|alt| format!("{} ({:.1})", alt.id, alt.score))
        .collect();
    out.push("ucs_alternates", alternates.join(", "));
}

fn timecode_comments(out: &mut CommentList, timecode: &TimecodeInfo) {
    out.push("tc_rate", timecode.rate.label());
    out.push("tc_edit_rate", timecode.rate.rate().to_string());
    out.push("tc_start", timecode.start.to_string());
    out.push("tc_end", timecode.end.to_string());
    out.push("tc_duration", timecode.duration_label());
    out.push("tc_duration_frames", timecode.duration_frames.to_string());
    out.push("tc_drop_frame", timecode.start.drop_frame.to_string());
}

/// All comments for one file, in a stable order
pub fn metadata_comments(
    identity: &FileIdentity,
    metadata: &WavMetadata,
    categorization: Option<&CategorizationResult>,
    timecode: &TimecodeInfo,
    low_confidence_threshold: f64,
) -> Vec<(String, String)> {
    let mut out = CommentList::default();

    if let Some(name) = identity.path.file_name() {
        out.push("file_name", name.to_string_lossy());
    }
    out.push("file_size", identity.size.to_string());
    if let Some(modified) = identity.modified {
        out.push(
            "file_modified",
            DateTime::<Utc>::from(modified).to_rfc3339(),
        );
    }

    if let Some(bext) = &metadata.bext {
        bext_comments(&mut out, bext);
    }

    if let Some(info) = &metadata.info {
        for (tag, value) in info.iter() {
            out.push(format!("info_{}", tag.key()), value);
        }
    }

    for block in &metadata.xml {
        for (key, value) in block.prefixed_entries() {
            out.push(key, value);
        }
    }

    if let Some(result) = categorization {
        ucs_comments(&mut out, result, low_confidence_threshold);
    }

    timecode_comments(&mut out, timecode);

    out.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::RateSpec;
    use crate::ucs::{CategoryMatch, MatchTier};
    use crate::wav::test_support::{pcm_ramp, WavBuilder};
    use crate::wav::read_wav;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    fn lookup<'a>(comments: &'a [(String, String)], key: &str) -> Option<&'a str> {
        comments
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_namespaced_keys() {
        let image = WavBuilder::new()
            .fmt(1, 48000, 16)
            .bext("Heavy door slam", 1, Some([-2300, 500, -100, i16::MAX, -1800]))
            .info(&[(b"IART", "Foley Team"), (b"IXYZ", "custom")])
            .chunk(b"iXML", b"<BWFXML><PROJECT>Film</PROJECT></BWFXML>".to_vec())
            .data(pcm_ramp(48, 1))
            .build();
        let metadata = read_wav(&mut Cursor::new(image)).unwrap();

        let identity = FileIdentity {
            path: PathBuf::from("/audio/DOORClos_Heavy.wav"),
            size: 1234,
            modified: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
        };
        let categorization = CategorizationResult {
            primary: CategoryMatch {
                id: "DOORWood".into(),
                category: "DOORS".into(),
                subcategory: "WOOD".into(),
                full_name: "DOORS WOOD".into(),
                score: 17.0,
            },
            alternates: vec![CategoryMatch {
                id: "DOORClos".into(),
                category: "DOORS".into(),
                subcategory: "CLOSE".into(),
                full_name: "DOORS CLOSE".into(),
                score: 12.5,
            }],
            tier: MatchTier::Fuzzy,
        };
        let rate = RateSpec::parse("25").unwrap();
        let timecode = TimecodeInfo::resolve(48, 48000, &rate, false).unwrap();

        let comments = metadata_comments(&identity, &metadata, Some(&categorization), &timecode, 25.0);

        assert_eq!(lookup(&comments, "file_name"), Some("DOORClos_Heavy.wav"));
        assert_eq!(lookup(&comments, "file_modified"), Some("2023-11-14T22:13:20+00:00"));
        assert_eq!(lookup(&comments, "bext_description"), Some("Heavy door slam"));
        assert_eq!(lookup(&comments, "bext_originator"), Some("Tester"));
        assert_eq!(lookup(&comments, "bext_loudness_value"), Some("-23.00"));
        assert_eq!(lookup(&comments, "bext_max_momentary_loudness"), None);
        assert_eq!(lookup(&comments, "bext_umid"), None);
        assert_eq!(lookup(&comments, "info_artist"), Some("Foley Team"));
        assert_eq!(lookup(&comments, "info_tag_IXYZ"), Some("custom"));
        assert_eq!(lookup(&comments, "axml_PROJECT"), Some("Film"));
        assert_eq!(lookup(&comments, "ucs_id"), Some("DOORWood"));
        assert_eq!(lookup(&comments, "ucs_score"), Some("17.0"));
        assert_eq!(lookup(&comments, "ucs_low_confidence"), Some("true"));
        assert_eq!(lookup(&comments, "ucs_alternates"), Some("DOORClos (12.5)"));
        assert_eq!(lookup(&comments, "tc_rate"), Some("25"));
        assert_eq!(lookup(&comments, "tc_start"), Some("00:00:00:00"));
        assert_eq!(lookup(&comments, "tc_drop_frame"), Some("false"));
        assert!(comments.iter().all(|(_, v)| !v.is_empty()));
    }

    #[test]
    fn test_without_optional_metadata() {
        let image = WavBuilder::new().fmt(2, 44100, 16).data(pcm_ramp(10, 2)).build();
        let metadata = read_wav(&mut Cursor::new(image)).unwrap();
        let identity = FileIdentity {
            path: PathBuf::from("/audio/plain.wav"),
            size: 84,
            modified: None,
        };
        let rate = RateSpec::parse("24").unwrap();
        let timecode = TimecodeInfo::resolve(10, 44100, &rate, false).unwrap();

        let comments = metadata_comments(&identity, &metadata, None, &timecode, 25.0);
        assert!(comments.iter().all(|(k, _)| !k.starts_with("bext_")
            && !k.starts_with("info_")
            && !k.starts_with("ucs_")));
        assert_eq!(lookup(&comments, "tc_end"), Some("00:00:00:00"));
    }
}
