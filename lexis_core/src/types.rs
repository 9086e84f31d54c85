//! Core domain types for the Lexis scheduler.
//!
//! This module defines the fundamental types used throughout the system:
//! - Lexical items and the lexicon catalog
//! - Per-item progress records and the progress store
//! - Recall scores and lottery selections
//! - Flashcards and review events

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Frequency assumed for items whose catalog entry has none
pub const DEFAULT_FREQUENCY: f64 = 0.000_001;

/// Ease factor given to freshly seeded records
pub const INITIAL_EASE: f64 = 2.5;

/// Lowest ease factor any update may produce
pub const MIN_EASE: f64 = 1.3;

// ============================================================================
// Catalog Types
// ============================================================================

/// Static attributes of a vocabulary item, keyed by its identifier in the lexicon
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LexicalItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplified: Option<String>,
    #[serde(default)]
    pub traditional: String,
    #[serde(default)]
    pub pinyin: String,
    #[serde(default)]
    pub definitions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

/// The merged vocabulary catalog for a session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lexicon {
    pub items: BTreeMap<String, LexicalItem>,
}

// ============================================================================
// Progress Types
// ============================================================================

/// Scheduling state for one item the learner has met
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    /// Consecutive successful active reviews since the last lapse
    #[serde(rename = "n")]
    pub repetitions: u32,
    #[serde(rename = "ef")]
    pub ease: f64,
    pub interval: u32,
    pub due: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<NaiveDate>,
    /// Signal computed by the most recent passive update
    #[serde(
        rename = "phantom_last_score",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_phantom_score: Option<f64>,
}

impl ProgressRecord {
    /// A record for an item introduced today, due immediately
    pub fn seeded(today: NaiveDate) -> Self {
        Self {
            repetitions: 0,
            ease: INITIAL_EASE,
            interval: 0,
            due: today,
            date_added: Some(today),
            last_phantom_score: None,
        }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.due <= today
    }
}

/// One learner's progress, keyed by item identifier
///
/// Backed by a `BTreeMap` so iteration (and therefore due ordering and
/// seeded lottery draws) is deterministic.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressStore {
    pub records: BTreeMap<String, ProgressRecord>,
}

// ============================================================================
// Scores and Selection
// ============================================================================

/// A recall-quality rating in 0..=5
///
/// - 0: total blackout
/// - 1: incorrect, but felt familiar after seeing the answer
/// - 2: incorrect, but easy once the answer was shown
/// - 3: correct, but hard recall
/// - 4: correct with hesitation
/// - 5: perfect recall
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RecallScore(u8);

impl RecallScore {
    pub const MAX: u8 = 5;

    /// Validate a raw score
    pub fn new(raw: i64) -> Result<Self> {
        if (0..=Self::MAX as i64).contains(&raw) {
            Ok(Self(raw as u8))
        } else {
            Err(Error::InvalidScore(raw))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Scores of 3 and above count as successful recall
    pub fn is_pass(self) -> bool {
        self.0 >= 3
    }
}

impl TryFrom<i64> for RecallScore {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<RecallScore> for u8 {
    fn from(score: RecallScore) -> u8 {
        score.0
    }
}

/// How the lottery draws within a partition
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Each identifier appears at most once per draw
    #[default]
    WithoutReplacement,
    /// Independent draws; the same identifier may repeat
    WithReplacement,
}

/// Result of one new-item lottery
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewItemSelection {
    /// Items with no progress record yet
    pub unseen: Vec<String>,
    /// Items already in the store, drawn as refreshers
    pub seen: Vec<String>,
}

impl NewItemSelection {
    pub fn len(&self) -> usize {
        self.unseen.len() + self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unseen.is_empty() && self.seen.is_empty()
    }

    /// Unseen picks followed by seen picks
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.unseen.iter().chain(self.seen.iter())
    }
}

// ============================================================================
// Presentation Types
// ============================================================================

/// Everything a driver needs to present one item
#[derive(Clone, Debug, Serialize)]
pub struct Flashcard {
    pub word: String,
    pub simplified: String,
    pub traditional: String,
    pub pinyin: String,
    pub definitions: Vec<String>,
    pub frequency: Option<f64>,
    pub progress: Option<ProgressRecord>,
}

impl Flashcard {
    /// First definition, or "unknown" when the catalog has none
    pub fn primary_definition(&self) -> &str {
        self.definitions
            .first()
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

// ============================================================================
// Review Log Types
// ============================================================================

/// Whether a review was deliberate or incidental
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    Active,
    Passive,
}

/// A recorded schedule update
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: Uuid,
    pub word: String,
    pub kind: ReviewKind,
    pub score: u8,
    pub reviewed_on: NaiveDate,
    pub recorded_at: DateTime<Utc>,
    pub interval: u32,
    pub ease: f64,
    pub due: NaiveDate,
    pub phantom_score: Option<f64>,
}

impl ReviewEvent {
    /// Snapshot a record right after it was updated
    pub fn capture(
        word: &str,
        kind: ReviewKind,
        score: RecallScore,
        reviewed_on: NaiveDate,
        record: &ProgressRecord,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            word: word.to_string(),
            kind,
            score: score.value(),
            reviewed_on,
            recorded_at: Utc::now(),
            interval: record.interval,
            ease: record.ease,
            due: record.due,
            phantom_score: match kind {
                ReviewKind::Passive => record.last_phantom_score,
                ReviewKind::Active => None,
            },
        }
    }
}
