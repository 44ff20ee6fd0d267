//! Universal Category System (UCS) categorization
//!
//! Maps a file's name, description and embedded metadata to a UCS category.
//! The table is loaded once ([`Taxonomy`]) and shared by all workers; the
//! [`CategoryMatcher`] itself holds no mutable state.

mod matcher;
mod taxonomy;

pub use matcher::{
    CategoryMatcher, MatchOptions, MatchText, MetadataHints, ALTERNATE_RATIO, EXACT_SCORE,
    MAX_ALTERNATES,
};
pub use taxonomy::{CategoryRow, Taxonomy, TaxonomyError};

use serde::Serialize;

/// Scores below this are reported for manual review
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 25.0;

/// One candidate category with its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMatch {
    pub id: String,
    pub category: String,
    pub subcategory: String,
    pub full_name: String,
    pub score: f64,
}

impl CategoryMatch {
    pub fn from_row(row: &CategoryRow, score: f64) -> Self {
        Self {
            id: row.id.clone(),
            category: row.category.clone(),
            subcategory: row.subcategory.clone(),
            full_name: row.full_name.clone(),
            score,
        }
    }
}

/// Which tier produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    MetadataOverride,
    ExactPrefix,
    Fuzzy,
}

impl MatchTier {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchTier::MetadataOverride => "metadata",
            MatchTier::ExactPrefix => "exact",
            MatchTier::Fuzzy => "fuzzy",
        }
    }
}

/// Primary category plus close alternates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorizationResult {
    pub primary: CategoryMatch,
    pub alternates: Vec<CategoryMatch>,
    pub tier: MatchTier,
}

impl CategorizationResult {
    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.primary.score < threshold
    }
}
