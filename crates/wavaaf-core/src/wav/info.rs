//! `LIST`/`INFO` attribution tags

use super::{sanitize_text, tag_name};

/// Four-character INFO codes with a fixed meaning
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InfoTag {
    Artist,
    Comment,
    Copyright,
    CreationDate,
    Engineer,
    Genre,
    Keywords,
    Name,
    Product,
    Subject,
    Software,
    Source,
    SourceForm,
    Technician,
    /// Preserved under its raw code
    Unknown(String),
}

impl InfoTag {
    pub fn from_code(code: &[u8]) -> Self {
        match code {
            b"IART" => InfoTag::Artist,
            b"ICMT" => InfoTag::Comment,
            b"ICOP" => InfoTag::Copyright,
            b"ICRD" => InfoTag::CreationDate,
            b"IENG" => InfoTag::Engineer,
            b"IGNR" => InfoTag::Genre,
            b"IKEY" => InfoTag::Keywords,
            b"INAM" => InfoTag::Name,
            b"IPRD" => InfoTag::Product,
            b"ISBJ" => InfoTag::Subject,
            b"ISFT" => InfoTag::Software,
            b"ISRC" => InfoTag::Source,
            b"ISRF" => InfoTag::SourceForm,
            b"ITCH" => InfoTag::Technician,
            other => InfoTag::Unknown(tag_name(other)),
        }
    }

    /// Comment key suffix (`info_<key>`)
    pub fn key(&self) -> String {
        let known = match self {
            InfoTag::Artist => "artist",
            InfoTag::Comment => "comment",
            InfoTag::Copyright => "copyright",
            InfoTag::CreationDate => "creation_date",
            InfoTag::Engineer => "engineer",
            InfoTag::Genre => "genre",
            InfoTag::Keywords => "keywords",
            InfoTag::Name => "title",
            InfoTag::Product => "product",
            InfoTag::Subject => "subject",
            InfoTag::Software => "software",
            InfoTag::Source => "source",
            InfoTag::SourceForm => "source_form",
            InfoTag::Technician => "technician",
            InfoTag::Unknown(code) => return format!("tag_{}", code.trim()),
        };
        known.to_string()
    }
}

/// Ordered INFO entries; a repeated code keeps its first position and the
/// last value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagListMetadata {
    entries: Vec<(InfoTag, String)>,
}

impl TagListMetadata {
    /// Parse a `LIST` payload
    ///
    /// Returns `None` for list types other than `INFO`. Otherwise returns the
    /// entries parsed so far and, if a sub-record overran the list, the reason
    /// parsing stopped.
    pub(crate) fn parse_list(body: &[u8]) -> Option<(Vec<(InfoTag, String)>, Option<String>)> {
        if body.len() < 4 || &body[0..4] != b"INFO" {
            return None;
        }

        let mut entries = Vec::new();
        let mut pos = 4;
        while pos + 8 <= body.len() {
            let code = &body[pos..pos + 4];
            let size =
                u32::from_le_bytes([body[pos + 4], body[pos + 5], body[pos + 6], body[pos + 7]]) as usize;
            let start = pos + 8;
            let end = match start.checked_add(size) {
                Some(end) if end <= body.len() => end,
                _ => {
                    return Some((
                        entries,
                        Some(format!("INFO sub-record '{}' overruns the list", tag_name(code))),
                    ))
                }
            };

            let raw = &body[start..end];
            let text_end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let value = sanitize_text(&String::from_utf8_lossy(&raw[..text_end]));
            if !value.is_empty() {
                entries.push((InfoTag::from_code(code), value));
            }

            pos = end + (size & 1);
        }

        Some((entries, None))
    }

    pub(crate) fn extend(&mut self, entries: Vec<(InfoTag, String)>) {
        for (tag, value) in entries {
            self.insert(tag, value);
        }
    }

    pub fn insert(&mut self, tag: InfoTag, value: String) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((tag, value)),
        }
    }

    pub fn get(&self, tag: &InfoTag) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InfoTag, &str)> {
        self.entries.iter().map(|(t, v)| (t, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
