//! `vigil-memory` – persistence for the append-only record logs and the
//! accumulated knowledge base.
//!
//! # Modules
//!
//! - [`records`] – [`RecordStore`][records::RecordStore]: append-only,
//!   timestamp-deduplicated record logs, plus the offline duplicate cleanup.
//! - [`knowledge`] – [`KnowledgeBase`][knowledge::KnowledgeBase] and the
//!   [`KnowledgeStore`][knowledge::KnowledgeStore] it is persisted through;
//!   implements the meaningfulness and novelty filters.
//! - [`json_file`] – flat-file JSON backends compatible with the dashboard.
//! - [`sqlite`] – [`SqliteStore`][sqlite::SqliteStore], an embedded-database
//!   backend for both contracts.
//! - [`profile`] – patient profile load / initialise / save.
//!
//! Read-side failures never escape this crate: a missing or corrupt store is
//! an empty store.  Write-side failures are reported as [`StoreError`].

pub mod json_file;
pub mod knowledge;
pub mod profile;
pub mod records;
pub mod sqlite;

use std::path::Path;

use thiserror::Error;

pub use json_file::{JsonFileKnowledgeStore, JsonFileRecordStore};
pub use knowledge::{KnowledgeBase, KnowledgeStore, MergeReport, NON_ANSWER_PHRASES, is_meaningful};
pub use records::{CleanupOutcome, CleanupReport, RecordStore, append_record, dedupe_by_key};
pub use sqlite::SqliteStore;

/// Errors surfaced by write-side persistence operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Malformed store {path}: {details}")]
    Malformed { path: String, details: String },
    #[error("Record did not serialise to a JSON object")]
    NotAnObject,
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
