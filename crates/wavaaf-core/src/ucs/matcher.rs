//! Three-tier category matching
//!
//! 1. explicit UCS fields carried in the file's own metadata
//! 2. a taxonomy id as literal filename prefix (`DOORWood_slam_01.wav`)
//! 3. weighted keyword scoring over filename and description

use std::collections::HashSet;
use std::sync::Arc;

use super::taxonomy::{CategoryRow, PreparedRow, Taxonomy};
use super::{CategorizationResult, CategoryMatch, MatchTier};
use crate::wav::WavMetadata;

/// Score given to metadata overrides and exact prefix hits
pub const EXACT_SCORE: f64 = 100.0;

/// Alternates must reach this fraction of the primary score
pub const ALTERNATE_RATIO: f64 = 0.7;

pub const MAX_ALTERNATES: usize = 5;

const FULL_NAME_WEIGHT: f64 = 10.0;
const CATEGORY_WEIGHT: f64 = 5.0;
const SUBCATEGORY_WEIGHT: f64 = 7.0;
const KEYWORD_WEIGHT: f64 = 3.0;
const NAME_WORD_WEIGHT: f64 = 2.0;
const CATEGORY_WORD_WEIGHT: f64 = 1.5;
const PARTIAL_WORD_WEIGHT: f64 = 0.5;

/// Matching behaviour, taken from the run configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Metadata override and filename prefix only, no fuzzy scoring
    pub exact_only: bool,
    /// Fuzzy results below this score are discarded
    pub min_score: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            exact_only: false,
            min_score: 0.0,
        }
    }
}

/// Key/value pairs from INFO and XML chunks that may carry UCS fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataHints {
    pairs: Vec<(String, String)>,
}

impl MetadataHints {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Collect candidate pairs from a parsed file
    pub fn collect(metadata: &WavMetadata) -> Self {
        let mut pairs = Vec::new();
        if let Some(info) = &metadata.info {
            for (tag, value) in info.iter() {
                pairs.push((tag.key(), value.to_string()));
            }
        }
        for block in &metadata.xml {
            for (key, value) in &block.entries {
                pairs.push((key.clone(), value.clone()));
            }
        }
        Self { pairs }
    }

    fn find(&self, matches: impl Fn(&str) -> bool) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| !v.trim().is_empty() && matches(&k.to_ascii_lowercase()))
            .map(|(_, v)| v.trim())
    }

    fn ucs_id(&self) -> Option<&str> {
        self.find(|k| k.ends_with("catid") || k.ends_with("ucs_id") || k.ends_with("ucsid"))
    }

    fn subcategory(&self) -> Option<&str> {
        self.find(|k| k.ends_with("subcategory") || k.ends_with("sub_category"))
    }

    fn category(&self) -> Option<&str> {
        self.find(|k| {
            (k == "category" || k.ends_with("_category"))
                && !k.ends_with("sub_category")
        })
    }
}

/// Lower-cased analysis text with its distinct words
#[derive(Debug, Clone)]
pub struct MatchText {
    text: String,
    words: Vec<String>,
}

impl MatchText {
    /// Normalise a filename and description for fuzzy scoring
    pub fn new(filename: &str, description: &str) -> Self {
        let mut name = filename.to_lowercase();
        for ext in [".wave", ".wav", ".bwf"] {
            if let Some(stripped) = name.strip_suffix(ext) {
                name = stripped.to_string();
                break;
            }
        }

        let joined = format!("{} {}", name, description.to_lowercase());
        let text: String = joined
            .chars()
            .map(|c| if matches!(c, '_' | '-' | '.') { ' ' } else { c })
            .collect();

        let mut seen = HashSet::new();
        let words = text
            .split_whitespace()
            .filter(|w| seen.insert(*w))
            .map(str::to_string)
            .collect();

        Self { text, words }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Distinct words longer than `min_chars` characters
    fn words_longer_than(&self, min_chars: usize) -> impl Iterator<Item = &String> {
        self.words.iter().filter(move |w| char_len(w) > min_chars)
    }
}

fn char_len(word: &str) -> usize {
    word.chars().count()
}

fn contains_nonempty(text: &str, needle: &str) -> bool {
    !needle.is_empty() && text.contains(needle)
}

/// Fuzzy score of one row against the analysis text
pub(crate) fn score_row(text: &MatchText, row: &PreparedRow) -> f64 {
    let mut score = 0.0;

    if contains_nonempty(&text.text, &row.full_name) {
        score += FULL_NAME_WEIGHT;
    }
    if contains_nonempty(&text.text, &row.category) {
        score += CATEGORY_WEIGHT;
    }
    if contains_nonempty(&text.text, &row.subcategory) {
        score += SUBCATEGORY_WEIGHT;
    }
    score += row
        .keywords
        .iter()
        .filter(|k| text.text.contains(k.as_str()))
        .count() as f64
        * KEYWORD_WEIGHT;

    // Each word earns at most one exact-word credit
    for word in text.words_longer_than(2) {
        if row.name_words.contains(word) {
            score += NAME_WORD_WEIGHT;
        } else if row.category_words.contains(word) || row.subcategory_words.contains(word) {
            score += CATEGORY_WORD_WEIGHT;
        }
    }

    for word in text.words_longer_than(3) {
        for name_word in row.name_words.iter().filter(|n| char_len(n) > 3) {
            if word.contains(name_word.as_str()) || name_word.contains(word.as_str()) {
                score += PARTIAL_WORD_WEIGHT;
            }
        }
    }

    score
}

/// Matches free text against a shared taxonomy
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    taxonomy: Arc<Taxonomy>,
    options: MatchOptions,
}

impl CategoryMatcher {
    pub fn new(taxonomy: Arc<Taxonomy>, options: MatchOptions) -> Self {
        Self { taxonomy, options }
    }

    /// Run all tiers in order; `None` if nothing qualifies
    pub fn categorize(
        &self,
        filename: &str,
        description: &str,
        hints: &MetadataHints,
    ) -> Option<CategorizationResult> {
        if let Some(result) = self.from_metadata(hints) {
            log::debug!(
                "categorize: {} -> {} from embedded metadata",
                filename,
                result.primary.id
            );
            return Some(result);
        }

        let stem = std::path::Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        if let Some(result) = self.exact_prefix(stem) {
            log::debug!("categorize: {} -> {} by prefix", filename, result.primary.id);
            return Some(result);
        }

        if self.options.exact_only {
            return None;
        }

        self.fuzzy(&MatchText::new(filename, description))
    }

    /// Tier 0: explicit UCS fields in INFO or XML metadata
    pub fn from_metadata(&self, hints: &MetadataHints) -> Option<CategorizationResult> {
        let category = hints.category();
        let subcategory = hints.subcategory();

        let primary = if let Some(id) = hints.ucs_id() {
            match self.taxonomy.get(id) {
                Some(row) => CategoryMatch::from_row(row, EXACT_SCORE),
                None => CategoryMatch {
                    id: id.to_string(),
                    category: category.unwrap_or_default().to_string(),
                    subcategory: subcategory.unwrap_or_default().to_string(),
                    full_name: String::new(),
                    score: EXACT_SCORE,
                },
            }
        } else {
            let (category, subcategory) = (category?, subcategory?);
            match self.taxonomy.find_by_names(category, subcategory) {
                Some(row) => CategoryMatch::from_row(row, EXACT_SCORE),
                None => CategoryMatch {
                    id: String::new(),
                    category: category.to_string(),
                    subcategory: subcategory.to_string(),
                    full_name: format!("{} {}", category, subcategory),
                    score: EXACT_SCORE,
                },
            }
        };

        Some(CategorizationResult {
            primary,
            alternates: Vec::new(),
            tier: MatchTier::MetadataOverride,
        })
    }

    /// Tier 1: longest taxonomy id that prefixes the filename stem
    pub fn exact_prefix(&self, stem: &str) -> Option<CategorizationResult> {
        let row = self.taxonomy.longest_prefix(stem)?;
        Some(CategorizationResult {
            primary: CategoryMatch::from_row(row, EXACT_SCORE),
            alternates: Vec::new(),
            tier: MatchTier::ExactPrefix,
        })
    }

    /// Tier 2: weighted scoring over every row
    pub fn fuzzy(&self, text: &MatchText) -> Option<CategorizationResult> {
        let mut scored: Vec<(f64, &CategoryRow)> = self
            .taxonomy
            .prepared()
            .map(|(row, prepared)| (score_row(text, prepared), row))
            .filter(|(score, _)| *score > 0.0 && *score >= self.options.min_score)
            .collect();

        // Stable: equal scores keep table order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut ranked = scored.into_iter();
        let (top_score, top_row) = ranked.next()?;
        let alternates = ranked
            .take_while(|(score, _)| *score >= top_score * ALTERNATE_RATIO)
            .take(MAX_ALTERNATES)
            .map(|(score, row)| CategoryMatch::from_row(row, score))
            .collect();

        Some(CategorizationResult {
            primary: CategoryMatch::from_row(top_row, top_score),
            alternates,
            tier: MatchTier::Fuzzy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(exact_only: bool) -> CategoryMatcher {
        CategoryMatcher::new(
            Arc::new(Taxonomy::builtin().unwrap()),
            MatchOptions {
                exact_only,
                min_score: 0.0,
            },
        )
    }

    #[test]
    fn test_exact_prefix_uses_longest_id() {
        let m = matcher(false);
        let result = m
            .categorize("DOORClos_Heavy.wav", "", &MetadataHints::default())
            .unwrap();
        assert_eq!(result.primary.id, "DOORClos");
        assert_eq!(result.primary.score, 100.0);
        assert_eq!(result.tier, MatchTier::ExactPrefix);
        assert!(result.alternates.is_empty());

        let result = m.categorize("AMBMiscBG.wav", "", &MetadataHints::default()).unwrap();
        assert_eq!(result.primary.id, "AMBMisc");

        // WIND is also a prefix here
        let result = m
            .categorize("WINDWOpen_sash.wav", "", &MetadataHints::default())
            .unwrap();
        assert_eq!(result.primary.id, "WINDWOpen");
    }

    #[test]
    fn test_fuzzy_wooden_door() {
        let m = matcher(false);
        let result = m
            .categorize("random_test.wav", "wooden door slam", &MetadataHints::default())
            .unwrap();
        assert_eq!(result.tier, MatchTier::Fuzzy);
        assert!(result.primary.id.starts_with("DOOR"), "{}", result.primary.id);
        assert!(result.primary.score < 25.0);
    }

    #[test]
    fn test_alternates_bounded_and_exclude_primary() {
        let m = matcher(false);
        let result = m
            .categorize("door_slam_wood.wav", "wooden door creak knock slam", &MetadataHints::default())
            .unwrap();
        assert!(result.alternates.len() <= MAX_ALTERNATES);
        for alt in &result.alternates {
            assert_ne!(alt.id, result.primary.id);
            assert!(alt.score >= result.primary.score * ALTERNATE_RATIO);
            assert!(alt.score <= result.primary.score);
        }
    }

    #[test]
    fn test_match_text_strips_broadcast_extension() {
        let text = MatchText::new("Door_Slam.BWF", "");
        assert_eq!(text.as_str().trim(), "door slam");
        assert_eq!(text.words, vec!["door", "slam"]);
    }

    #[test]
    fn test_word_length_counts_characters() {
        // "été" is three characters but five bytes
        let text = MatchText::new("été_fenêtre.wav", "");
        let long: Vec<&String> = text.words_longer_than(3).collect();
        assert_eq!(long, vec!["fenêtre"]);
        assert_eq!(text.words_longer_than(2).count(), 2);
    }

    #[test]
    fn test_score_monotonic_in_keywords() {
        let taxonomy = Taxonomy::builtin().unwrap();
        let (_, door) = taxonomy
            .prepared()
            .find(|(row, _)| row.id == "DOORWood")
            .unwrap();

        let base = score_row(&MatchText::new("take_01.wav", "heavy"), door);
        let one = score_row(&MatchText::new("take_01.wav", "heavy slam"), door);
        let two = score_row(&MatchText::new("take_01.wav", "heavy slam creak"), door);
        assert!(one > base);
        assert!(two > one);
    }

    #[test]
    fn test_exact_only_mode() {
        let m = matcher(true);
        let hints = MetadataHints::default();
        assert!(m
            .categorize("chicken_cackle_01.wav", "Animals, birds, chicken cackle", &hints)
            .is_none());

        let result = m
            .categorize("TOONAnml_chicken_cackle.wav", "Animals, birds, chicken cackle", &hints)
            .unwrap();
        assert_eq!(result.primary.id, "TOONAnml");

        let fuzzy = matcher(false)
            .categorize("chicken_cackle_01.wav", "Animals, birds, chicken cackle", &hints)
            .unwrap();
        assert_eq!(fuzzy.primary.id, "BIRDFowl");
    }

    #[test]
    fn test_min_score_filters_weak_rows() {
        let m = CategoryMatcher::new(
            Arc::new(Taxonomy::builtin().unwrap()),
            MatchOptions {
                exact_only: false,
                min_score: 50.0,
            },
        );
        assert!(m
            .categorize("random_test.wav", "wooden door slam", &MetadataHints::default())
            .is_none());
    }

    #[test]
    fn test_metadata_category_override() {
        let m = matcher(false);
        let hints = MetadataHints::new(vec![
            ("Category".into(), "TESTCAT".into()),
            ("SubCategory".into(), "TESTSUB".into()),
        ]);
        let result = m.categorize("random_sound.wav", "some description", &hints).unwrap();
        assert_eq!(result.tier, MatchTier::MetadataOverride);
        assert_eq!(result.primary.category, "TESTCAT");
        assert_eq!(result.primary.subcategory, "TESTSUB");
        assert_eq!(result.primary.score, 100.0);
    }

    #[test]
    fn test_metadata_ucs_id_preferred() {
        let m = matcher(false);
        let hints = MetadataHints::new(vec![
            ("UCS_ID".into(), "MYID".into()),
            ("Category".into(), "C".into()),
            ("SubCategory".into(), "S".into()),
        ]);
        let result = m.categorize("random_sound.wav", "desc", &hints).unwrap();
        assert_eq!(result.primary.id, "MYID");
        assert_eq!(result.primary.score, 100.0);

        // Known ids pick up their names from the table
        let hints = MetadataHints::new(vec![("CatID".into(), "DOORWood".into())]);
        let result = m.categorize("random_sound.wav", "", &hints).unwrap();
        assert_eq!(result.primary.category, "DOORS");
    }

    #[test]
    fn test_category_without_subcategory_is_not_an_override() {
        let m = matcher(true);
        let hints = MetadataHints::new(vec![("Category".into(), "DOORS".into())]);
        assert!(m.categorize("random_sound.wav", "", &hints).is_none());
    }

    #[test]
    fn test_match_text_normalisation() {
        let text = MatchText::new("Door_Slam-01.take.WAV", "Heavy  Door");
        assert_eq!(text.as_str(), "door slam 01 take heavy  door");
        assert_eq!(text.words, vec!["door", "slam", "01", "take", "heavy"]);
    }
}
