//! Embedded XML chunks (EBUCore, BWF MetaEdit, Pro Tools, aXML/iXML)
//!
//! Any chunk the reader does not know by tag is sniffed: if the payload
//! starts with `<` after whitespace and an optional UTF-8 BOM it is treated
//! as structured text and flattened into key/value pairs.

use std::sync::OnceLock;

use regex::Regex;

use super::{sanitize_text, tag_name};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Namespace kind of a structured-text chunk, chosen by its root element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmlKind {
    /// `ebuCoreMain`
    BroadcastCore,
    /// `BWFMetaEdit`
    MetadataEditor,
    /// `ProTools`
    SessionTool,
    /// `axml`, `BWFXML`
    GenericAnnotation,
    /// Valid text with any other root
    Unclassified,
}

impl XmlKind {
    /// Key prefix used in flattened comments
    pub fn prefix(self) -> &'static str {
        match self {
            XmlKind::BroadcastCore => "ebucore",
            XmlKind::MetadataEditor => "bwfmetaedit",
            XmlKind::SessionTool => "protools",
            XmlKind::GenericAnnotation => "axml",
            XmlKind::Unclassified => "xml",
        }
    }

    fn from_root(root: Option<&str>) -> Self {
        // Compare the local name only; EBUCore is usually `ebucore:ebuCoreMain`
        let local = root.map(|r| r.rsplit(':').next().unwrap_or(r));
        match local {
            Some("ebuCoreMain") => XmlKind::BroadcastCore,
            Some("BWFMetaEdit") => XmlKind::MetadataEditor,
            Some("ProTools") => XmlKind::SessionTool,
            Some("axml") | Some("BWFXML") => XmlKind::GenericAnnotation,
            _ => XmlKind::Unclassified,
        }
    }
}

/// Flattened contents of one structured-text chunk
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredTextMetadata {
    pub kind: XmlKind,
    /// Tag of the chunk it came from (`iXML`, `axml`...)
    pub chunk: String,
    /// Element and attribute values in document order; last value wins
    pub entries: Vec<(String, String)>,
    /// True if the document was not well formed and values were salvaged
    pub salvaged: bool,
}

impl StructuredTextMetadata {
    /// Classify and flatten a chunk payload; `None` if it is not UTF-8 text
    pub(crate) fn parse(tag: &[u8; 4], payload: &[u8]) -> Option<Self> {
        let body = payload.strip_prefix(UTF8_BOM).unwrap_or(payload);
        let text = std::str::from_utf8(body).ok()?;
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

        let kind = XmlKind::from_root(root_element_name(text));

        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let (entries, salvaged) = match roxmltree::Document::parse_with_options(text, options) {
            Ok(doc) => (flatten_document(&doc), false),
            Err(e) => {
                log::debug!(
                    "StructuredTextMetadata::parse: '{}' is not well formed ({}), salvaging",
                    tag_name(tag),
                    e
                );
                (salvage(text), true)
            }
        };

        Some(Self {
            kind,
            chunk: tag_name(tag),
            entries,
            salvaged,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Keys with the namespace prefix applied (`ebucore_title`)
    pub fn prefixed_entries(&self) -> impl Iterator<Item = (String, &str)> {
        self.entries
            .iter()
            .map(move |(k, v)| (format!("{}_{}", self.kind.prefix(), k), v.as_str()))
    }
}

/// Check whether a payload head looks like XML
pub(crate) fn looks_like_xml(head: &[u8]) -> bool {
    let body = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}

/// Name of the first element, skipping the prolog
///
/// Works on malformed documents too, so classification does not depend on
/// the document parsing.
fn root_element_name(text: &str) -> Option<&str> {
    let mut rest = text;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start..];
        if let Some(after) = rest.strip_prefix("<?") {
            rest = &after[after.find("?>")? + 2..];
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = &after[after.find("-->")? + 3..];
        } else if let Some(after) = rest.strip_prefix("<!") {
            rest = &after[after.find('>')? + 1..];
        } else {
            let name = &rest[1..];
            let end = name
                .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .unwrap_or(name.len());
            return Some(&name[..end]).filter(|n| !n.is_empty());
        }
    }
}

fn insert(entries: &mut Vec<(String, String)>, key: String, value: String) {
    if value.is_empty() {
        return;
    }
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

fn flatten_document(doc: &roxmltree::Document) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        let name = node.tag_name().name();
        if let Some(text) = node.text() {
            insert(&mut entries, name.to_string(), sanitize_text(text));
        }
        for attr in node.attributes() {
            insert(
                &mut entries,
                format!("{}_{}", name, attr.name()),
                sanitize_text(attr.value()),
            );
        }
    }
    entries
}

fn salvage(text: &str) -> Vec<(String, String)> {
    static ELEMENT: OnceLock<Regex> = OnceLock::new();
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();

    let element = ELEMENT.get_or_init(|| {
        Regex::new(r"<([A-Za-z_][\w.:-]*)[^<>]*>([^<]+)</[^>]+>").expect("valid element pattern")
    });
    let attribute = ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w.-]*)="([^"]+)""#).expect("valid attribute pattern")
    });

    let mut entries = Vec::new();
    for caps in element.captures_iter(text) {
        let name = &caps[1];
        let local = name.rsplit(':').next().unwrap_or(name);
        insert(&mut entries, local.to_string(), sanitize_text(&caps[2]));
    }
    for caps in attribute.captures_iter(text) {
        insert(
            &mut entries,
            format!("attr_{}", &caps[1]),
            sanitize_text(&caps[2]),
        );
    }
    entries
}
