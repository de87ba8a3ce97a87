//! SQLite backend for both the record logs and the knowledge base.
//!
//! # Storage layout
//!
//! | table       | columns                                              |
//! |-------------|------------------------------------------------------|
//! | `records`   | `seq` (insertion order), `store`, `timestamp`, `body`|
//! | `knowledge` | `category`, `position`, `fact`                       |
//!
//! `records` carries `UNIQUE(store, timestamp)`, so the duplicate-rejection
//! rule is enforced by the database itself (`INSERT OR IGNORE`).  `body` is
//! the full record as JSON text, timestamp included.

use std::path::Path;

use rusqlite::{Connection, params};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use vigil_types::KnowledgeCategory;

use crate::StoreError;
use crate::knowledge::{KnowledgeBase, KnowledgeStore};
use crate::records::{CleanupOutcome, RecordStore, build_record, dedupe_by_key};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                seq       INTEGER PRIMARY KEY AUTOINCREMENT,
                store     TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                body      TEXT NOT NULL,
                UNIQUE(store, timestamp)
            );
            CREATE TABLE IF NOT EXISTS knowledge (
                category TEXT NOT NULL,
                position INTEGER NOT NULL,
                fact     TEXT NOT NULL,
                PRIMARY KEY(category, position)
            );",
        )?;
        Ok(())
    }

    fn try_records(&self, store: &str) -> Result<Vec<Value>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM records WHERE store = ?1 ORDER BY seq ASC")?;
        let bodies = stmt
            .query_map([store], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut records = Vec::with_capacity(bodies.len());
        for body in bodies {
            match serde_json::from_str(&body) {
                Ok(value) => records.push(value),
                Err(e) => warn!(store, error = %e, "skipping undecodable record body"),
            }
        }
        Ok(records)
    }

    fn try_load(&self) -> Result<KnowledgeBase, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT fact FROM knowledge WHERE category = ?1 ORDER BY position ASC")?;
        let mut object = Map::new();
        for category in KnowledgeCategory::ALL {
            let facts = stmt
                .query_map([category.key()], |row| row.get::<_, String>(0))?
                .map(|fact| fact.map(Value::String))
                .collect::<Result<Vec<_>, _>>()?;
            object.insert(category.key().to_string(), Value::Array(facts));
        }
        Ok(KnowledgeBase::from_value(&Value::Object(object)))
    }

    #[cfg(test)]
    fn count(&self, store: &str) -> Result<usize, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE store = ?1",
            [store],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl RecordStore for SqliteStore {
    fn append_if_new(
        &mut self,
        store: &str,
        timestamp: &str,
        payload: Map<String, Value>,
    ) -> Result<bool, StoreError> {
        let body = serde_json::to_string(&build_record(timestamp, payload))?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records (store, timestamp, body) VALUES (?1, ?2, ?3)",
            params![store, timestamp, body],
        )?;
        if inserted == 0 {
            debug!(store, timestamp, "duplicate timestamp rejected");
        }
        Ok(inserted > 0)
    }

    fn records(&self, store: &str) -> Vec<Value> {
        self.try_records(store).unwrap_or_else(|e| {
            warn!(store, error = %e, "record store unreadable; treating as empty");
            Vec::new()
        })
    }

    /// The `UNIQUE(store, timestamp)` constraint already prevents duplicate
    /// timestamps; this pass matters only for other keys.
    fn remove_duplicates(&mut self, store: &str, key: &str) -> Result<CleanupOutcome, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, body FROM records WHERE store = ?1 ORDER BY seq ASC")?;
        let rows = stmt
            .query_map([store], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        if rows.is_empty() {
            return Ok(CleanupOutcome::Missing);
        }

        // Tag each record with its row id so the survivors can be mapped back.
        let tagged: Vec<Value> = rows
            .iter()
            .map(|(seq, body)| {
                let mut value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("__seq".into(), Value::from(*seq));
                }
                value
            })
            .collect();
        let (kept, report) = dedupe_by_key(tagged, key);
        if report.removed == 0 {
            return Ok(CleanupOutcome::Cleaned(report));
        }

        let survivors: std::collections::HashSet<i64> = kept
            .iter()
            .filter_map(|v| v.get("__seq").and_then(Value::as_i64))
            .collect();
        let tx = self.conn.transaction()?;
        for (seq, _) in &rows {
            if !survivors.contains(seq) {
                tx.execute("DELETE FROM records WHERE seq = ?1", [seq])?;
            }
        }
        tx.commit()?;
        Ok(CleanupOutcome::Cleaned(report))
    }
}

impl KnowledgeStore for SqliteStore {
    fn load(&self) -> KnowledgeBase {
        self.try_load().unwrap_or_else(|e| {
            warn!(error = %e, "knowledge base unreadable; starting empty");
            KnowledgeBase::new()
        })
    }

    fn save(&mut self, base: &KnowledgeBase) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM knowledge", [])?;
        for category in KnowledgeCategory::ALL {
            for (position, fact) in base.facts(category).iter().enumerate() {
                tx.execute(
                    "INSERT INTO knowledge (category, position, fact) VALUES (?1, ?2, ?3)",
                    params![category.key(), position as i64, fact],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
