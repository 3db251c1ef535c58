use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::{NamedTempFile, PersistError};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::runner::{RankRecord, HISTORY_COLUMNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendSummary {
    pub existing_rows: usize,
    pub appended_rows: usize,
}

/// Appends rewrite the whole file through a temp file in the same directory and
/// an atomic rename. There is no locking: two concurrent appends race and the
/// later rename wins.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, records: &[RankRecord]) -> AppResult<AppendSummary> {
        self.append_with(records, |staged, path| staged.persist(path).map(drop))
    }

    fn append_with<F>(&self, records: &[RankRecord], persist: F) -> AppResult<AppendSummary>
    where
        F: FnOnce(NamedTempFile, &Path) -> Result<(), PersistError>,
    {
        let existing = self.existing_rows()?;
        let dir = self.directory();
        fs::create_dir_all(&dir)?;

        let mut staged = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(staged.as_file_mut());
            writer.write_record(HISTORY_COLUMNS)?;
            for row in &existing {
                writer.write_record(row)?;
            }
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        staged.as_file().sync_all()?;

        if let Ok(metadata) = fs::metadata(&self.path) {
            fs::set_permissions(staged.path(), metadata.permissions())?;
        }
        // A failed rename drops the staged file, which removes it.
        persist(staged, &self.path).map_err(|err| AppError::Io(err.error))?;

        let summary = AppendSummary {
            existing_rows: existing.len(),
            appended_rows: records.len(),
        };
        info!(
            path = %self.path.display(),
            existing = summary.existing_rows,
            appended = summary.appended_rows,
            "history store updated"
        );
        Ok(summary)
    }

    pub fn records(&self) -> AppResult<Vec<RankRecord>> {
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(reader) => reader,
            Err(err) if is_not_found(&err) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::new();
        for record in reader.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }

    fn existing_rows(&self) -> AppResult<Vec<csv::StringRecord>> {
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(reader) => reader,
            Err(err) if is_not_found(&err) => {
                debug!(path = %self.path.display(), "no history store yet; creating one");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        if headers.iter().ne(HISTORY_COLUMNS.iter().copied()) {
            return Err(AppError::Store(format!(
                "{} has columns [{}], expected [{}]",
                self.path.display(),
                headers.iter().collect::<Vec<_>>().join(", "),
                HISTORY_COLUMNS.join(", ")
            )));
        }

        let mut rows = Vec::new();
        for row in reader.records() {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn is_not_found(err: &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound)
}
