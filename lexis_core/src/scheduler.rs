//! Review-interval updates and the due-item query.
//!
//! Active reviews follow SM-2:
//! - Scores below 3 are lapses: repetitions reset, interval back to 1 day
//! - Passing scores grow the interval (1 day, 6 days, then interval × ease)
//!   and adjust ease by `0.1 - (5-q) * (0.08 + (5-q) * 0.02)`, floored at 1.3
//!
//! Passive reviews happen when a known item shows up inside the example
//! sentence of another item's review. They reuse the recall score as a
//! weaker signal: weak recall halves the interval and shaves ease, but
//! never resets repetitions.
//!
//! Intervals are rounded with `f64::round` (half away from zero); ease is
//! stored rounded to two decimals.

use crate::types::*;
use crate::{Lexicon, Result};
use chrono::{Duration, NaiveDate};

/// Keeps the rarity bonus finite for zero frequencies
const FREQUENCY_EPSILON: f64 = 1e-9;

/// Cap on each passive bonus term
const MAX_PASSIVE_BONUS: f64 = 0.5;

/// Ease lost on a passive lapse
const PASSIVE_EASE_PENALTY: f64 = 0.1;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Ease after a passing score, floored at [`MIN_EASE`]
fn adjusted_ease(ease: f64, score: RecallScore) -> f64 {
    let q = f64::from(RecallScore::MAX - score.value());
    (ease + (0.1 - q * (0.08 + q * 0.02))).max(MIN_EASE)
}

/// Interval after a passing score, chosen by the repetition count
fn grown_interval(repetitions: u32, interval: u32, ease: f64) -> u32 {
    match repetitions {
        0 => 1,
        1 => 6,
        _ => ((f64::from(interval) * ease).round() as u32).max(1),
    }
}

fn due_after(today: NaiveDate, interval: u32) -> NaiveDate {
    today + Duration::days(i64::from(interval))
}

/// Apply an active review score to a record
///
/// The score is validated before anything is touched; an out-of-range score
/// leaves the record exactly as it was.
pub fn update_active(record: &mut ProgressRecord, score: i64, today: NaiveDate) -> Result<()> {
    let score = RecallScore::new(score)?;

    if score.is_pass() {
        // Interval grows with the ease the item had going into this review
        record.interval = grown_interval(record.repetitions, record.interval, record.ease);
        record.ease = round2(adjusted_ease(record.ease, score));
        record.repetitions += 1;
    } else {
        record.repetitions = 0;
        record.interval = 1;
    }

    record.due = due_after(today, record.interval);

    tracing::debug!(
        "Active review (score {}): n={}, ef={:.2}, interval={}, due {}",
        score.value(),
        record.repetitions,
        record.ease,
        record.interval,
        record.due
    );
    Ok(())
}

/// Signal strength of an incidental exposure
///
/// Scores of 2 and below override the weighted formula with a fixed
/// failure signal (-1 for 2, -2 below).
pub fn phantom_score(
    record: &ProgressRecord,
    score: RecallScore,
    frequency: f64,
    today: NaiveDate,
) -> f64 {
    match score.value() {
        0 | 1 => return -2.0,
        2 => return -1.0,
        _ => {}
    }

    let frequency = if frequency.is_finite() && frequency >= 0.0 {
        frequency
    } else {
        DEFAULT_FREQUENCY
    };

    let days_overdue = (today - record.due).num_days().max(0);
    let freq_bonus = (0.001 / (frequency + FREQUENCY_EPSILON)).clamp(0.0, MAX_PASSIVE_BONUS);
    let decay_bonus = (days_overdue as f64 / 10.0).clamp(0.0, MAX_PASSIVE_BONUS);
    let recall_weight = f64::from(score.value()) / f64::from(RecallScore::MAX);

    recall_weight * 3.0 + freq_bonus + decay_bonus
}

/// Apply a passive review to a record, returning the phantom score used
pub fn apply_passive(
    record: &mut ProgressRecord,
    score: RecallScore,
    frequency: f64,
    today: NaiveDate,
) -> f64 {
    let phantom = phantom_score(record, score, frequency, today);

    if phantom < 0.0 {
        record.interval = (record.interval / 2).max(1);
        record.ease = round2((record.ease - PASSIVE_EASE_PENALTY).max(MIN_EASE));
    } else {
        // Ease moves first here, so the multiplier already reflects this exposure
        let ease = adjusted_ease(record.ease, score);
        record.interval = grown_interval(record.repetitions, record.interval, ease);
        record.ease = round2(ease);
        record.repetitions += 1;
    }

    record.due = due_after(today, record.interval);
    record.last_phantom_score = Some(round2(phantom));

    phantom
}

/// Passive update of one item in the store
///
/// Returns `Ok(false)` without touching anything when the item has no
/// record: passive signals never create progress.
pub fn update_passive(
    store: &mut ProgressStore,
    id: &str,
    score: i64,
    frequency: f64,
    today: NaiveDate,
) -> Result<bool> {
    let score = RecallScore::new(score)?;

    let Some(record) = store.get_mut(id) else {
        tracing::debug!("Passive review skipped for '{}': no record", id);
        return Ok(false);
    };

    let phantom = apply_passive(record, score, frequency, today);

    tracing::debug!(
        "Passive review of '{}' (score {}, phantom {:.2}): n={}, ef={:.2}, interval={}",
        id,
        score.value(),
        phantom,
        record.repetitions,
        record.ease,
        record.interval
    );
    Ok(true)
}

/// Passively review every known item appearing in a sentence
///
/// `exclude` lists items that must not be credited here: the item under
/// active review, and anything else the caller will schedule itself.
/// Returns the identifiers touched, in store order.
pub fn passive_review_sentence(
    sentence: &str,
    store: &mut ProgressStore,
    lexicon: &Lexicon,
    score: RecallScore,
    exclude: &[&str],
    today: NaiveDate,
) -> Vec<String> {
    let hits: Vec<String> = store
        .ids()
        .filter(|id| !id.is_empty() && !exclude.contains(&id.as_str()))
        .filter(|id| sentence.contains(id.as_str()))
        .cloned()
        .collect();

    for id in &hits {
        let frequency = lexicon.frequency_of(id);
        if let Some(record) = store.get_mut(id) {
            apply_passive(record, score, frequency, today);
        }
    }

    if !hits.is_empty() {
        tracing::info!("Passively reviewed {} items: {:?}", hits.len(), hits);
    }
    hits
}

/// Identifiers eligible for active review today, in lexical order
pub fn due_items(store: &ProgressStore, today: NaiveDate) -> Vec<String> {
    store
        .records
        .iter()
        .filter(|(_, record)| record.is_due(today))
        .map(|(id, _)| id.clone())
        .collect()
}
