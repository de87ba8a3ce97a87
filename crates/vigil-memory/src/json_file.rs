//! Flat-file JSON backends.
//!
//! Layout under the data directory:
//!
//! | file                     | contents                                   |
//! |--------------------------|--------------------------------------------|
//! | `captions.json`          | array of caption records                   |
//! | `behavior_analysis.json` | array of analysis records                  |
//! | `data.json`              | knowledge base, one array per category     |
//!
//! Files are pretty-printed with four-space indentation and replaced
//! atomically (write to a sibling temp file, then rename), so a reader such
//! as the dashboard never observes a half-written file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::knowledge::{KnowledgeBase, KnowledgeStore};
use crate::records::{CleanupOutcome, RecordStore, build_record, dedupe_by_key, has_timestamp};

/// Default file name of the knowledge base.
pub const KNOWLEDGE_FILE: &str = "data.json";

// ─────────────────────────────────────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Read and parse a JSON file.  `Ok(None)` when the file does not exist.
pub(crate) fn read_json(path: &Path) -> Result<Option<Value>, StoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let value = serde_json::from_str(&raw).map_err(|e| StoreError::Malformed {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Serialize `value` with four-space indentation.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(out)
}

/// Atomically replace `path` with the pretty-printed form of `value`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = to_pretty_json(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

/// Read a record array, degrading anything unreadable to an empty array.
fn read_records_lenient(path: &Path) -> Vec<Value> {
    match read_json(path) {
        Ok(None) => Vec::new(),
        Ok(Some(Value::Array(items))) => items,
        Ok(Some(_)) => {
            warn!(path = %path.display(), "record store is not an array; treating as empty");
            Vec::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "record store unreadable; treating as empty");
            Vec::new()
        }
    }
}

/// Remove entries sharing an already-seen `key` value from the array stored
/// at `path`, keeping the first occurrence.
///
/// The file is rewritten only when something was removed, so a second pass
/// leaves it untouched.
pub fn clean_json_file(path: &Path, key: &str) -> Result<CleanupOutcome, StoreError> {
    let items = match read_json(path)? {
        None => return Ok(CleanupOutcome::Missing),
        Some(Value::Array(items)) => items,
        Some(_) => return Ok(CleanupOutcome::NotAList),
    };
    let (kept, report) = dedupe_by_key(items, key);
    if report.removed > 0 {
        write_json_atomic(path, &kept)?;
        info!(path = %path.display(), removed = report.removed, "duplicates removed");
    }
    Ok(CleanupOutcome::Cleaned(report))
}

// ─────────────────────────────────────────────────────────────────────────────
// JsonFileRecordStore
// ─────────────────────────────────────────────────────────────────────────────

/// Record logs stored as `<dir>/<store>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    dir: PathBuf,
}

impl JsonFileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Backing file for `store`.
    pub fn path_for(&self, store: &str) -> PathBuf {
        self.dir.join(format!("{store}.json"))
    }
}

impl RecordStore for JsonFileRecordStore {
    fn append_if_new(
        &mut self,
        store: &str,
        timestamp: &str,
        payload: Map<String, Value>,
    ) -> Result<bool, StoreError> {
        let path = self.path_for(store);
        let mut records = read_records_lenient(&path);
        if has_timestamp(&records, timestamp) {
            debug!(store, timestamp, "duplicate timestamp rejected");
            return Ok(false);
        }
        records.push(build_record(timestamp, payload));
        write_json_atomic(&path, &records)?;
        Ok(true)
    }

    fn records(&self, store: &str) -> Vec<Value> {
        read_records_lenient(&self.path_for(store))
    }

    fn remove_duplicates(&mut self, store: &str, key: &str) -> Result<CleanupOutcome, StoreError> {
        clean_json_file(&self.path_for(store), key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JsonFileKnowledgeStore
// ─────────────────────────────────────────────────────────────────────────────

/// Knowledge base stored as a single JSON object file.
#[derive(Debug, Clone)]
pub struct JsonFileKnowledgeStore {
    path: PathBuf,
}

impl JsonFileKnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/data.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(KNOWLEDGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KnowledgeStore for JsonFileKnowledgeStore {
    fn load(&self) -> KnowledgeBase {
        match read_json(&self.path) {
            Ok(Some(value)) => KnowledgeBase::from_value(&value),
            Ok(None) => KnowledgeBase::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "knowledge base unreadable; starting empty");
                KnowledgeBase::new()
            }
        }
    }

    fn save(&mut self, base: &KnowledgeBase) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &base.to_value())
    }
}
