//! Progress store persistence with file locking.
//!
//! The store is a single JSON object mapping item identifiers to their
//! progress records. Reads take a shared lock; writes go through a locked
//! temp file that is renamed over the original.

use crate::types::*;
use crate::{Error, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

impl ProgressStore {
    pub fn get(&self, id: &str) -> Option<&ProgressRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ProgressRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, record: ProgressRecord) {
        self.records.insert(id.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    /// Number of records first created on `day`
    pub fn added_on(&self, day: NaiveDate) -> usize {
        self.records
            .values()
            .filter(|r| r.date_added == Some(day))
            .count()
    }

    /// Load the store from a file with shared locking
    ///
    /// A missing file is a first run and yields an empty store. A file that
    /// exists but cannot be parsed is an error, so a later save never
    /// overwrites a learner's history with an empty map.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No progress file at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            return Err(Error::Io(e));
        }

        file.unlock()?;

        if contents.trim().is_empty() {
            tracing::warn!("Progress file {:?} is empty, starting empty", path);
            return Ok(Self::default());
        }

        let store = serde_json::from_str::<ProgressStore>(&contents).map_err(|e| {
            Error::State(format!("Failed to parse progress file {:?}: {}", path, e))
        })?;

        tracing::debug!("Loaded {} progress records from {:?}", store.len(), path);
        Ok(store)
    }

    /// Save the store to a file with exclusive locking
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "progress path missing parent")
        })?)?;

        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            // Pretty output keeps the file hand-editable
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} progress records to {:?}", self.len(), path);
        Ok(())
    }

    /// Load the store, modify it, and save it back
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProgressStore) -> Result<T>,
    {
        let mut store = Self::load(path)?;
        let out = f(&mut store)?;
        store.save(path)?;
        Ok(out)
    }
}
