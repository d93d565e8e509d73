//! Reminder collection storage implementations.
//!
//! Stores only ever see the whole collection: `load_all` then `save_all`.
//! Serializing those cycles is the queue's job, not the store's.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::types::ReminderJob;

/// Whole-collection store abstraction.
///
/// Implementations may block; callers run them off the async executor.
pub trait JobStore: Send + Sync {
    /// Load every record. A missing or empty backing store is an empty collection.
    fn load_all(&self) -> Result<Vec<ReminderJob>, JobStoreError>;

    /// Replace the whole collection. Must be atomic from the caller's view.
    fn save_all(&self, jobs: &[ReminderJob]) -> Result<(), JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn load_all(&self) -> Result<Vec<ReminderJob>, JobStoreError> {
        (**self).load_all()
    }

    fn save_all(&self, jobs: &[ReminderJob]) -> Result<(), JobStoreError> {
        (**self).save_all(jobs)
    }
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<std::io::Error> for JobStoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// In-memory store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<Vec<ReminderJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobStore for InMemoryJobStore {
    fn load_all(&self) -> Result<Vec<ReminderJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::Poisoned)?;
        Ok(jobs.clone())
    }

    fn save_all(&self, jobs: &[ReminderJob]) -> Result<(), JobStoreError> {
        let mut stored = self.jobs.write().map_err(|_| JobStoreError::Poisoned)?;
        *stored = jobs.to_vec();
        Ok(())
    }
}

/// Flat JSON file holding the full array of records.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous collection intact.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "reminders.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Move an unreadable file aside so the next save does not destroy it.
    fn quarantine(&self, reason: &str) {
        let target = self.sibling(".corrupt");
        match fs::rename(&self.path, &target) {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                moved_to = %target.display(),
                reason,
                "reminder store unreadable; quarantined and treated as empty"
            ),
            Err(e) => tracing::error!(
                path = %self.path.display(),
                error = %e,
                reason,
                "reminder store unreadable and could not be quarantined"
            ),
        }
    }
}

impl JobStore for FileJobStore {
    fn load_all(&self) -> Result<Vec<ReminderJob>, JobStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(records)) => records,
            Ok(_) => {
                self.quarantine("top-level value is not an array");
                return Ok(Vec::new());
            }
            Err(e) => {
                self.quarantine(&e.to_string());
                return Ok(Vec::new());
            }
        };

        let mut jobs = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            if record.is_null() {
                continue;
            }
            match serde_json::from_value::<ReminderJob>(record) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(index, error = %e, "skipping malformed reminder record"),
            }
        }
        Ok(jobs)
    }

    fn save_all(&self, jobs: &[ReminderJob]) -> Result<(), JobStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.sibling(".tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, jobs)
                .map_err(|e| JobStoreError::Serialization(e.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
