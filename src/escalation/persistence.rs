//! Storage for the recent block-reason fingerprints.
//!
//! The file format is one fingerprint per line, oldest first. Writes go to a
//! temporary file that is renamed over the history file while an exclusive
//! lock is held, so concurrent hook processes never observe a torn file.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

use crate::error::{Result, ReviewLoopError};

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// Persistent, ordered list of recent block fingerprints.
pub trait HistoryStore: Send + Sync {
    /// Load the stored fingerprints, oldest first. A missing store is empty.
    fn load(&self) -> Result<Vec<String>>;

    /// Replace the stored fingerprints.
    fn save(&self, entries: &[String]) -> Result<()>;

    /// Remove every stored fingerprint.
    fn clear(&self) -> Result<()>;

    /// Human-readable location of the store.
    fn location(&self) -> String;
}

/// [`HistoryStore`] backed by a newline-separated file.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn lock_file(&self) -> Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.error(&e))?;
        }
        let lock = File::create(self.sibling(LOCK_SUFFIX)).map_err(|e| self.error(&e))?;
        FileExt::lock_exclusive(&lock)
            .map_err(|e| ReviewLoopError::history(&self.path, format!("Failed to acquire lock: {e}")))?;
        Ok(lock)
    }

    fn error(&self, e: &io::Error) -> ReviewLoopError {
        ReviewLoopError::history(&self.path, e.to_string())
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self) -> Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error(&e)),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| self.error(&e))?;

        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn save(&self, entries: &[String]) -> Result<()> {
        let _lock = self.lock_file()?;

        let tmp_path = self.sibling(TMP_SUFFIX);
        let mut contents = entries.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        let mut tmp_file = File::create(&tmp_path).map_err(|e| self.error(&e))?;
        tmp_file
            .write_all(contents.as_bytes())
            .and_then(|()| tmp_file.sync_all())
            .map_err(|e| self.error(&e))?;

        fs::rename(&tmp_path, &self.path).map_err(|e| self.error(&e))
    }

    fn clear(&self) -> Result<()> {
        let _lock = self.lock_file()?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(&e)),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process [`HistoryStore`], used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<String>>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entries(entries: &[&str]) -> Self {
        Self {
            entries: Mutex::new(entries.iter().map(|e| (*e).to_string()).collect()),
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Vec<String>>> {
        self.entries
            .lock()
            .map_err(|_| ReviewLoopError::history("<memory>", "history lock poisoned"))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.guard()?.clone())
    }

    fn save(&self, entries: &[String]) -> Result<()> {
        *self.guard()? = entries.to_vec();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.guard()?.clear();
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
