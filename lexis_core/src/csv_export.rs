//! Review log export to CSV.
//!
//! Rolls the JSONL review log into an append-only CSV history and archives
//! the log, so the log stays small and the history is spreadsheet-friendly.

use crate::{Result, ReviewEvent, ReviewKind};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Suffix appended to a review log once its events are in the CSV
pub const PROCESSED_SUFFIX: &str = "processed";

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    word: String,
    kind: &'static str,
    score: u8,
    reviewed_on: String,
    recorded_at: String,
    interval: u32,
    ease: f64,
    due: String,
    phantom_score: Option<f64>,
}

impl From<&ReviewEvent> for CsvRow {
    fn from(event: &ReviewEvent) -> Self {
        CsvRow {
            id: event.id.to_string(),
            word: event.word.clone(),
            kind: match event.kind {
                ReviewKind::Active => "active",
                ReviewKind::Passive => "passive",
            },
            score: event.score,
            reviewed_on: event.reviewed_on.to_string(),
            recorded_at: event.recorded_at.to_rfc3339(),
            interval: event.interval,
            ease: event.ease,
            due: event.due.to_string(),
            phantom_score: event.phantom_score,
        }
    }
}

/// Archive path for a processed log
pub fn processed_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(".");
    name.push(PROCESSED_SUFFIX);
    PathBuf::from(name)
}

/// Append the review log to the CSV history and archive the log
///
/// The CSV is fsynced before the log is renamed, so a crash in between
/// leaves the log in place (events may then be exported twice, never lost).
/// Returns the number of events exported.
pub fn log_to_csv_and_archive(log_path: &Path, csv_path: &Path) -> Result<usize> {
    let events = crate::review_log::read_events(log_path)?;

    if events.is_empty() {
        tracing::info!("No review events to export");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Headers only for a fresh file
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for event in &events {
        writer.serialize(CsvRow::from(event))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} review events to {:?}", events.len(), csv_path);

    let archived = processed_path(log_path);
    std::fs::rename(log_path, &archived)?;
    tracing::info!("Archived review log to {:?}", archived);

    Ok(events.len())
}

/// Remove archived review logs from a directory
pub fn cleanup_processed_logs(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().is_some_and(|ext| ext == PROCESSED_SUFFIX) {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed processed review log: {:?}", path);
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed review logs", count);
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review_log::{JsonlReviewLog, ReviewSink};
    use crate::{ProgressRecord, RecallScore};
    use chrono::NaiveDate;
    use std::fs::File;

    fn event(word: &str, kind: ReviewKind) -> ReviewEvent {
        let today = NaiveDate::from_ymd_opt(2025, 4, 19).unwrap();
        let mut record = ProgressRecord::seeded(today);
        record.last_phantom_score = Some(2.9);
        ReviewEvent::capture(word, kind, RecallScore::new(5).unwrap(), today, &record)
    }

    #[test]
    fn test_export_creates_csv_and_archives() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("reviews.wal");
        let csv_path = temp_dir.path().join("reviews.csv");

        let mut log = JsonlReviewLog::new(&log_path);
        log.append(&event("月", ReviewKind::Active)).unwrap();
        log.append(&event("日", ReviewKind::Passive)).unwrap();

        let count = log_to_csv_and_archive(&log_path, &csv_path).unwrap();

        assert_eq!(count, 2);
        assert!(csv_path.exists());
        assert!(!log_path.exists());
        assert!(processed_path(&log_path).exists());

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[1], "word");
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][2], "active");
        assert_eq!(&rows[0][9], "");
        assert_eq!(&rows[1][2], "passive");
        assert_eq!(&rows[1][9], "2.9");
    }

    #[test]
    fn test_export_appends_without_repeating_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("reviews.wal");
        let csv_path = temp_dir.path().join("reviews.csv");

        let mut log = JsonlReviewLog::new(&log_path);
        log.append(&event("山", ReviewKind::Active)).unwrap();
        assert_eq!(log_to_csv_and_archive(&log_path, &csv_path).unwrap(), 1);

        let mut log = JsonlReviewLog::new(&log_path);
        log.append(&event("水", ReviewKind::Active)).unwrap();
        assert_eq!(log_to_csv_and_archive(&log_path, &csv_path).unwrap(), 1);

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }

    #[test]
    fn test_empty_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("reviews.wal");
        let csv_path = temp_dir.path().join("reviews.csv");
        File::create(&log_path).unwrap();

        assert_eq!(log_to_csv_and_archive(&log_path, &csv_path).unwrap(), 0);
        assert!(!csv_path.exists());
    }

    #[test]
    fn test_cleanup_processed_logs() {
        let temp_dir = tempfile::tempdir().unwrap();
        File::create(temp_dir.path().join("reviews.wal.processed")).unwrap();
        File::create(temp_dir.path().join("old.wal.processed")).unwrap();
        File::create(temp_dir.path().join("reviews.wal")).unwrap();

        let count = cleanup_processed_logs(temp_dir.path()).unwrap();

        assert_eq!(count, 2);
        assert!(temp_dir.path().join("reviews.wal").exists());
    }
}
