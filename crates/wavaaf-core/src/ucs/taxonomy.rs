//! UCS category table
//!
//! Built once per process (compiled-in table or an external YAML/CSV file)
//! and shared read-only behind an `Arc`. Lower-cased forms used by the fuzzy
//! scorer are prepared at load time so lookups never allocate per row.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Compiled-in UCS table
const BUILTIN_TAXONOMY: &str = include_str!("../../data/taxonomy.yaml");

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Failed to read taxonomy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid taxonomy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid taxonomy CSV: {0}")]
    Csv(String),

    #[error("Unsupported taxonomy file type: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Taxonomy contains no usable rows")]
    Empty,
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;

/// One UCS category/subcategory pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    /// CatID, e.g. `DOORWood`
    pub id: String,
    pub category: String,
    pub subcategory: String,
    /// Defaults to "CATEGORY SUBCATEGORY"
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Lower-cased row data for fuzzy scoring
#[derive(Debug, Clone)]
pub(crate) struct PreparedRow {
    pub full_name: String,
    pub category: String,
    pub subcategory: String,
    pub keywords: Vec<String>,
    pub name_words: HashSet<String>,
    pub category_words: HashSet<String>,
    pub subcategory_words: HashSet<String>,
}

impl PreparedRow {
    fn new(row: &CategoryRow) -> Self {
        let full_name = row.full_name.to_lowercase();
        let category = row.category.to_lowercase();
        let subcategory = row.subcategory.to_lowercase();
        let words = |s: &str| s.split_whitespace().map(str::to_string).collect::<HashSet<_>>();
        Self {
            name_words: words(&full_name),
            category_words: words(&category),
            subcategory_words: words(&subcategory),
            keywords: row
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            full_name,
            category,
            subcategory,
        }
    }
}

/// Immutable category table
#[derive(Debug, Clone)]
pub struct Taxonomy {
    rows: Vec<CategoryRow>,
    prepared: Vec<PreparedRow>,
    /// Row indices ordered by id length, longest first (table order on ties)
    by_id_length: Vec<usize>,
}

impl Taxonomy {
    /// Build from rows, dropping rows without id or category and repeated ids
    pub fn from_rows(rows: Vec<CategoryRow>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.id = row.id.trim().to_string();
            if row.id.is_empty() || row.category.trim().is_empty() {
                continue;
            }
            if !seen.insert(row.id.clone()) {
                log::warn!("Taxonomy::from_rows: duplicate id '{}' ignored", row.id);
                continue;
            }
            if row.full_name.trim().is_empty() {
                row.full_name = format!("{} {}", row.category, row.subcategory)
                    .trim()
                    .to_string();
            }
            kept.push(row);
        }

        if kept.is_empty() {
            return Err(TaxonomyError::Empty);
        }

        let prepared = kept.iter().map(PreparedRow::new).collect();
        let mut by_id_length: Vec<usize> = (0..kept.len()).collect();
        by_id_length.sort_by(|&a, &b| kept[b].id.len().cmp(&kept[a].id.len()));

        Ok(Self {
            rows: kept,
            prepared,
            by_id_length,
        })
    }

    /// The compiled-in table
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_TAXONOMY)
    }

    /// Load an external table; `.yaml`/`.yml` or the UCS `.csv` export
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let taxonomy = match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("csv") => Self::from_csv_str(&content)?,
            _ => return Err(TaxonomyError::UnsupportedFormat(path.to_path_buf())),
        };

        log::info!(
            "Taxonomy::load: {} categories from {:?}",
            taxonomy.len(),
            path
        );
        Ok(taxonomy)
    }

    /// Parse a YAML list of rows
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let rows: Vec<CategoryRow> = serde_yaml::from_str(content)?;
        Self::from_rows(rows)
    }

    /// Parse the UCS CSV export
    ///
    /// Columns are found by header name: `CatID`/`ID`, `Category`,
    /// `SubCategory`, `FullName`/`CatShort`, `Explanations`/`Description`,
    /// `Synonyms - Comma Separated`/`Keywords`.
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut records = parse_csv(content).into_iter();
        let header = records
            .next()
            .ok_or_else(|| TaxonomyError::Csv("missing header row".into()))?;

        let column = |names: &[&str]| {
            names.iter().find_map(|name| {
                header
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name))
            })
        };
        let id_col = column(&["CatID", "ID"])
            .ok_or_else(|| TaxonomyError::Csv("no CatID/ID column".into()))?;
        let category_col = column(&["Category"])
            .ok_or_else(|| TaxonomyError::Csv("no Category column".into()))?;
        let subcategory_col = column(&["SubCategory"]);
        let full_name_col = column(&["FullName"]);
        let description_col = column(&["Explanations", "Description"]);
        let keywords_col = column(&["Synonyms - Comma Separated", "Keywords"]);

        let rows = records
            .map(|record| {
                let field = |col: Option<usize>| {
                    col.and_then(|c| record.get(c))
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default()
                };
                CategoryRow {
                    id: field(Some(id_col)),
                    category: field(Some(category_col)),
                    subcategory: field(subcategory_col),
                    full_name: field(full_name_col),
                    description: field(description_col),
                    keywords: field(keywords_col)
                        .split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect(),
                }
            })
            .collect();

        Self::from_rows(rows)
    }

    pub fn rows(&self) -> &[CategoryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CategoryRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Row with matching category and subcategory (case-insensitive)
    pub fn find_by_names(&self, category: &str, subcategory: &str) -> Option<&CategoryRow> {
        self.rows.iter().find(|r| {
            r.category.eq_ignore_ascii_case(category.trim())
                && r.subcategory.eq_ignore_ascii_case(subcategory.trim())
        })
    }

    /// Longest id that is a literal, case-sensitive prefix of `stem`
    pub fn longest_prefix(&self, stem: &str) -> Option<&CategoryRow> {
        self.by_id_length
            .iter()
            .map(|&i| &self.rows[i])
            .find(|row| stem.starts_with(row.id.as_str()))
    }

    pub(crate) fn prepared(&self) -> impl Iterator<Item = (&CategoryRow, &PreparedRow)> {
        self.rows.iter().zip(self.prepared.iter())
    }
}

/// Split CSV text into records
///
/// Handles quoted fields with embedded commas, doubled quotes and line breaks.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if record.iter().any(|f| !f.is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
