use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::errors::AppResult;

const JOURNAL_FILE: &str = "run-journal.jsonl";
const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;

#[derive(Clone, Debug)]
pub struct RunJournal {
    path: PathBuf,
    max_file_bytes: u64,
    max_file_count: usize,
    write_lock: Arc<Mutex<()>>,
}

impl RunJournal {
    pub fn new<P: AsRef<Path>>(dir: P) -> AppResult<Self> {
        Self::with_limits(dir, DEFAULT_MAX_BYTES, DEFAULT_MAX_FILES)
    }

    pub fn with_limits<P: AsRef<Path>>(
        dir: P,
        max_file_bytes: u64,
        max_file_count: usize,
    ) -> AppResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            max_file_bytes,
            max_file_count: max_file_count.max(1),
            write_lock: Default::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, name: impl Into<String>, payload: serde_json::Value) -> AppResult<()> {
        let mut line = serde_json::to_vec(&JournalEvent::new(name.into(), payload))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock();
        self.rotate_if_needed(line.len() as u64)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if current_size == 0 || current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count <= 1 {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            return Ok(());
        }

        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f").to_string();
        fs::rename(&self.path, self.rotation_target(&stamp))?;
        self.prune_rotations()
    }

    // Sequence suffix keeps rotations within the same millisecond apart and sortable.
    fn rotation_target(&self, stamp: &str) -> PathBuf {
        let mut seq = 0u32;
        loop {
            let candidate = self
                .parent()
                .join(format!("{}-{}-{:03}.jsonl", self.stem(), stamp, seq));
            if !candidate.exists() {
                return candidate;
            }
            seq += 1;
        }
    }

    fn prune_rotations(&self) -> AppResult<()> {
        let prefix = format!("{}-", self.stem());
        let mut rotations = fs::read_dir(self.parent())?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                (name.starts_with(&prefix) && name.ends_with(".jsonl")).then(|| entry.path())
            })
            .collect::<Vec<_>>();

        // Rotated names embed a sortable timestamp.
        rotations.sort();
        let allowed = self.max_file_count - 1;
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for path in rotations.into_iter().take(excess) {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "run-journal".into())
    }
}

#[derive(Debug, Serialize)]
struct JournalEvent {
    name: String,
    timestamp: DateTime<Utc>,
    payload: serde_json::Value,
}

impl JournalEvent {
    fn new(name: String, payload: serde_json::Value) -> Self {
        Self {
            name,
            timestamp: Utc::now(),
            payload,
        }
    }
}
