//! History persistence
//!
//! Stores load and save the whole history at once. Loading never fails: a
//! missing or corrupt file yields an empty history and a warning, and
//! unreadable records inside a valid array are skipped one by one. Saving
//! reports failure to the caller, which keeps working in memory.

use crate::error::EngineError;
use crate::history::History;
use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Whole-history persistence collaborator
pub trait HistoryStore {
    /// Load the stored history, empty on absence or corruption
    fn load(&self) -> History;

    /// Replace the stored history
    fn save(&self, history: &History) -> Result<(), EngineError>;
}

/// JSON file store holding the history as a record array
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load without swallowing errors; `Ok(None)` when the file is absent
    pub fn try_load(&self) -> Result<Option<History>, EngineError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(History::from_json(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> History {
        match self.try_load() {
            Ok(Some(history)) => {
                debug!(path = %self.path.display(), records = history.len(), "history loaded");
                history
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no history file, starting empty");
                History::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to load history, starting empty");
                History::new()
            }
        }
    }

    fn save(&self, history: &History) -> Result<(), EngineError> {
        let json = history.to_json()?;
        // write-then-rename so a failed write never truncates the old file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                EngineError::PersistenceError(format!("{}: {e}", self.path.display()))
            })?;
        info!(path = %self.path.display(), records = history.len(), "history saved");
        Ok(())
    }
}

/// In-memory store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: RefCell<Option<History>>,
    saves: RefCell<usize>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `history`
    pub fn with_history(history: History) -> Self {
        Self {
            saved: RefCell::new(Some(history)),
            ..Self::default()
        }
    }

    /// Store whose saves always fail
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }

    pub fn snapshot(&self) -> Option<History> {
        self.saved.borrow().clone()
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> History {
        self.saved.borrow().clone().unwrap_or_default()
    }

    fn save(&self, history: &History) -> Result<(), EngineError> {
        if self.fail_saves {
            return Err(EngineError::PersistenceError("memory store is read-only".to_string()));
        }
        *self.saved.borrow_mut() = Some(history.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn load(&self) -> History {
        (**self).load()
    }

    fn save(&self, history: &History) -> Result<(), EngineError> {
        (**self).save(history)
    }
}
