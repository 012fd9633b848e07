//! Backing stores for the cache's preference document.
//!
//! A preference store holds a flat map of string keys to JSON values and
//! applies each [`Edit`] as a single all-or-nothing commit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, warn};

use super::CacheError;

/// A batch of changes committed atomically.
#[derive(Debug, Default, Clone)]
pub struct Edit {
    ops: Vec<EditOp>,
}

#[derive(Debug, Clone)]
enum EditOp {
    Put(String, Value),
    Remove(String),
    Clear,
}

impl Edit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: Value) -> Self {
        self.ops.push(EditOp::Put(key.into(), value));
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push(EditOp::Remove(key.into()));
        self
    }

    pub fn clear(mut self) -> Self {
        self.ops.push(EditOp::Clear);
        self
    }

    fn apply_to(self, entries: &mut BTreeMap<String, Value>) {
        for op in self.ops {
            match op {
                EditOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                EditOp::Remove(key) => {
                    entries.remove(&key);
                }
                EditOp::Clear => entries.clear(),
            }
        }
    }
}

/// Small-document key-value persistence.
///
/// Implementations are called from blocking worker threads.
pub trait PreferenceStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Apply every operation in `edit`, or none of them.
    fn commit(&self, edit: Edit) -> Result<(), CacheError>;
}

/// Process-local store, used for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn commit(&self, edit: Edit) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        edit.apply_to(&mut entries);
        Ok(())
    }
}

/// A single JSON document on disk, mirrored in memory.
///
/// Commits write a temp file and rename it over the document, so the file
/// always holds either the old or the new state.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileStore {
    /// Open (or create) the document at `path`.
    ///
    /// An unreadable or corrupt document is logged and replaced by an empty
    /// one on the next commit.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load cache document, starting empty");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened cache document");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<BTreeMap<String, Value>, CacheError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, entries: &BTreeMap<String, Value>) -> Result<(), CacheError> {
        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn commit(&self, edit: Edit) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let mut next = entries.clone();
        edit.apply_to(&mut next);
        self.write(&next)?;
        *entries = next;
        Ok(())
    }
}
