//! Daily new-item lottery.
//!
//! Each day up to `daily_quota` items enter the schedule. The catalog is
//! split into unseen items (no progress record) and seen items (a record
//! from an earlier day). Up to `unseen_slots` picks come from the unseen
//! side and the rest from the seen side, each drawn with probability
//! proportional to corpus frequency.
//!
//! An unseen side smaller than its slot count leaves those slots empty;
//! they are not handed to the seen side.

use crate::config::ScheduleConfig;
use crate::types::*;
use crate::Lexicon;
use chrono::NaiveDate;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

/// Lottery weight for a catalog frequency
///
/// Absent, zero, negative and non-finite frequencies all fall back to
/// [`DEFAULT_FREQUENCY`] so every item stays drawable.
pub fn lottery_weight(frequency: Option<f64>) -> f64 {
    match frequency {
        Some(f) if f.is_finite() && f > 0.0 => f,
        _ => DEFAULT_FREQUENCY,
    }
}

/// Frequency-proportional sample of up to `k` identifiers
pub fn weighted_sample<R: Rng + ?Sized>(
    items: &[(&String, f64)],
    k: usize,
    mode: SamplingMode,
    rng: &mut R,
) -> Vec<String> {
    let k = k.min(items.len());
    if k == 0 {
        return Vec::new();
    }

    match mode {
        SamplingMode::WithReplacement => {
            match WeightedIndex::<f64>::new(items.iter().map(|(_, w)| *w)) {
                Ok(dist) => (0..k)
                    .map(|_| items[dist.sample(rng)].0.clone())
                    .collect(),
                Err(e) => {
                    tracing::warn!("Lottery weights rejected: {}", e);
                    Vec::new()
                }
            }
        }
        SamplingMode::WithoutReplacement => {
            match items.choose_multiple_weighted(rng, k, |(_, w)| *w) {
                Ok(picks) => picks.map(|(id, _)| (*id).clone()).collect(),
                Err(e) => {
                    tracing::warn!("Lottery weights rejected: {}", e);
                    Vec::new()
                }
            }
        }
    }
}

/// Draw today's new items
///
/// Items whose record was created today are excluded from both sides, and
/// records created today count against the quota.
pub fn select_new_items<R: Rng + ?Sized>(
    lexicon: &Lexicon,
    store: &ProgressStore,
    config: &ScheduleConfig,
    today: NaiveDate,
    rng: &mut R,
) -> NewItemSelection {
    let added_today = store.added_on(today);
    if added_today >= config.daily_quota {
        tracing::info!(
            "Already introduced {} items today (quota {}), no lottery",
            added_today,
            config.daily_quota
        );
        return NewItemSelection::default();
    }

    let mut unseen = Vec::new();
    let mut seen = Vec::new();
    for (id, item) in &lexicon.items {
        let weight = lottery_weight(item.frequency);
        match store.get(id) {
            None => unseen.push((id, weight)),
            Some(record) if record.date_added != Some(today) => seen.push((id, weight)),
            Some(_) => {}
        }
    }

    let remaining = config.daily_quota - added_today;
    let unseen_k = remaining.min(config.unseen_slots);
    let seen_k = remaining - unseen_k;

    let selection = NewItemSelection {
        unseen: weighted_sample(&unseen, unseen_k, config.sampling, rng),
        seen: weighted_sample(&seen, seen_k, config.sampling, rng),
    };

    tracing::info!(
        "Lottery picked {} unseen of {} and {} seen of {} ({:?})",
        selection.unseen.len(),
        unseen.len(),
        selection.seen.len(),
        seen.len(),
        config.sampling
    );
    selection
}

/// Create records for the unseen picks of a selection
///
/// Repeated picks and items that already have a record are skipped.
/// Returns the identifiers that received a new record.
pub fn seed_new_items(
    store: &mut ProgressStore,
    selection: &NewItemSelection,
    today: NaiveDate,
) -> Vec<String> {
    let mut created = Vec::new();
    let mut visited = BTreeSet::new();

    for id in &selection.unseen {
        if !visited.insert(id.as_str()) || store.contains(id) {
            continue;
        }
        store.insert(id.clone(), ProgressRecord::seeded(today));
        created.push(id.clone());
    }

    tracing::debug!("Seeded {} new records", created.len());
    created
}
