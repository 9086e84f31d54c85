//! Lexicon catalog loading and lookup.
//!
//! Vocabulary lists are JSON objects mapping an item identifier to its
//! static attributes. Several lists (one per proficiency level) are merged
//! into a single [`Lexicon`] once per session; later files win on key
//! collisions.

use crate::types::*;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the level number in level file patterns
pub const LEVEL_PLACEHOLDER: &str = "{level}";

impl Lexicon {
    pub fn new(items: BTreeMap<String, LexicalItem>) -> Self {
        Self { items }
    }

    pub fn get(&self, id: &str) -> Option<&LexicalItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.items.keys()
    }

    /// Catalog frequency for an item, [`DEFAULT_FREQUENCY`] when unknown
    pub fn frequency_of(&self, id: &str) -> f64 {
        self.items
            .get(id)
            .and_then(|item| item.frequency)
            .unwrap_or(DEFAULT_FREQUENCY)
    }

    /// Merge another lexicon into this one, overriding existing keys
    pub fn merge(&mut self, other: Lexicon) {
        self.items.extend(other.items);
    }

    /// Parse a single vocabulary file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let lexicon: Lexicon = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded {} items from {:?}", lexicon.len(), path);
        Ok(lexicon)
    }

    /// Load and merge explicit vocabulary files
    ///
    /// Unlike level loading, a missing file here is an error: the caller
    /// asked for it by name.
    pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut lexicon = Lexicon::default();
        for path in paths {
            lexicon.merge(Self::load_file(path.as_ref())?);
        }
        tracing::info!(
            "Loaded lexicon with {} items from {} files",
            lexicon.len(),
            paths.len()
        );
        Ok(lexicon)
    }

    /// Load and merge per-level vocabulary files from a directory
    ///
    /// `pattern` names each file with a `{level}` placeholder, e.g.
    /// `ap_vocab_hsk{level}.json`. Levels without a file are skipped with a
    /// warning.
    pub fn load_levels(dir: &Path, pattern: &str, first: u32, last: u32) -> Result<Self> {
        if !pattern.contains(LEVEL_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "Level file pattern '{}' has no {} placeholder",
                pattern, LEVEL_PLACEHOLDER
            )));
        }

        let mut lexicon = Lexicon::default();
        for level in first..=last {
            let path = level_path(dir, pattern, level);
            if !path.exists() {
                tracing::warn!("Vocabulary file not found: {:?}", path);
                continue;
            }
            lexicon.merge(Self::load_file(&path)?);
        }

        tracing::info!(
            "Loaded lexicon with {} items for levels {}-{}",
            lexicon.len(),
            first,
            last
        );
        Ok(lexicon)
    }

    /// Validate catalog entries
    ///
    /// Returns a list of problems; an empty list means the catalog is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (id, item) in &self.items {
            if id.trim().is_empty() {
                errors.push("Catalog contains an empty identifier".to_string());
            }
            if let Some(freq) = item.frequency {
                if !freq.is_finite() || freq < 0.0 {
                    errors.push(format!("Item '{}': invalid frequency {}", id, freq));
                }
            }
            if item.definitions.iter().any(|d| d.trim().is_empty()) {
                errors.push(format!("Item '{}': contains an empty definition", id));
            }
        }

        errors
    }
}

/// Resolve the file for one level
pub fn level_path(dir: &Path, pattern: &str, level: u32) -> PathBuf {
    dir.join(pattern.replace(LEVEL_PLACEHOLDER, &level.to_string()))
}

/// Build the presentation view of an item
///
/// Never fails: an identifier missing from the catalog yields a card whose
/// display form is the identifier itself and whose definitions are empty.
pub fn build_flashcard(word: &str, lexicon: &Lexicon, store: &ProgressStore) -> Flashcard {
    let progress = store.get(word).cloned();

    match lexicon.get(word) {
        Some(item) => Flashcard {
            word: word.to_string(),
            simplified: item
                .simplified
                .clone()
                .unwrap_or_else(|| word.to_string()),
            traditional: item.traditional.clone(),
            pinyin: item.pinyin.clone(),
            definitions: item.definitions.clone(),
            frequency: item.frequency,
            progress,
        },
        None => {
            tracing::debug!("'{}' not in catalog, showing bare identifier", word);
            Flashcard {
                word: word.to_string(),
                simplified: word.to_string(),
                traditional: String::new(),
                pinyin: String::new(),
                definitions: Vec::new(),
                frequency: None,
                progress,
            }
        }
    }
}
