//! Append-only, timestamp-keyed record logs.
//!
//! A record store holds several independent logs, addressed by a store id
//! (`"captions"`, `"behavior_analysis"`).  Within one log the `timestamp`
//! field is unique: [`RecordStore::append_if_new`] rejects a second record
//! for a timestamp that is already present, which makes every write safe to
//! replay after a crash or a retried cycle.

use std::collections::HashSet;

use serde_json::{Map, Value};
use vigil_types::Record;

use crate::StoreError;

/// Name of the natural-key field in every persisted record.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Persistence contract for the record logs.
pub trait RecordStore: Send {
    /// Append `{timestamp, ...payload}` to `store` unless a record with the
    /// same timestamp already exists.
    ///
    /// Returns `Ok(true)` when the record was written and `Ok(false)` when it
    /// was rejected as a duplicate.  A `timestamp` key inside `payload` is
    /// ignored.  An unreadable or malformed existing log counts as empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only when the updated log cannot be written.
    fn append_if_new(
        &mut self,
        store: &str,
        timestamp: &str,
        payload: Map<String, Value>,
    ) -> Result<bool, StoreError>;

    /// All records of `store` in insertion order; empty if the log is
    /// missing or unreadable.
    fn records(&self, store: &str) -> Vec<Value>;

    /// Drop every record whose `key` value was already seen earlier in the
    /// log, keeping the first occurrence.
    fn remove_duplicates(&mut self, store: &str, key: &str) -> Result<CleanupOutcome, StoreError>;
}

/// Append a typed record to its own store.
pub fn append_record<S, R>(store: &mut S, record: &R) -> Result<bool, StoreError>
where
    S: RecordStore + ?Sized,
    R: Record,
{
    let Value::Object(payload) = serde_json::to_value(record)? else {
        return Err(StoreError::NotAnObject);
    };
    store.append_if_new(R::STORE, record.timestamp(), payload)
}

/// Build the persisted form of a record: the timestamp first, then the
/// payload fields in their original order.
pub(crate) fn build_record(timestamp: &str, payload: Map<String, Value>) -> Value {
    let mut record = Map::with_capacity(payload.len() + 1);
    record.insert(TIMESTAMP_KEY.to_string(), Value::String(timestamp.to_string()));
    for (k, v) in payload {
        if k != TIMESTAMP_KEY {
            record.insert(k, v);
        }
    }
    Value::Object(record)
}

pub(crate) fn has_timestamp(records: &[Value], timestamp: &str) -> bool {
    records
        .iter()
        .any(|r| r.get(TIMESTAMP_KEY).and_then(Value::as_str) == Some(timestamp))
}

// ─────────────────────────────────────────────────────────────────────────────
// Offline cleanup
// ─────────────────────────────────────────────────────────────────────────────

/// Counts produced by a duplicate-removal pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub kept: usize,
    pub removed: usize,
}

/// Result of cleaning one persisted log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The log does not exist; nothing was done.
    Missing,
    /// The log exists but is not a sequence; it was left untouched.
    NotAList,
    Cleaned(CleanupReport),
}

impl CleanupOutcome {
    pub fn removed(&self) -> usize {
        match self {
            CleanupOutcome::Cleaned(report) => report.removed,
            _ => 0,
        }
    }
}

/// Remove items whose `key` value was already seen, keeping the first
/// occurrence.  Items that are not objects or lack `key` are always kept.
pub fn dedupe_by_key(items: Vec<Value>, key: &str) -> (Vec<Value>, CleanupReport) {
    let total = items.len();
    let mut seen = HashSet::new();
    let kept: Vec<Value> = items
        .into_iter()
        .filter(|item| match item.get(key) {
            Some(k) => seen.insert(k.to_string()),
            None => true,
        })
        .collect();
    let report = CleanupReport {
        kept: kept.len(),
        removed: total - kept.len(),
    };
    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vigil_types::CaptionRecord;

    /// In-memory store used to exercise the trait's contract.
    #[derive(Default)]
    struct VecStore {
        logs: std::collections::HashMap<String, Vec<Value>>,
    }

    impl RecordStore for VecStore {
        fn append_if_new(
            &mut self,
            store: &str,
            timestamp: &str,
            payload: Map<String, Value>,
        ) -> Result<bool, StoreError> {
            let log = self.logs.entry(store.to_string()).or_default();
            if has_timestamp(log, timestamp) {
                return Ok(false);
            }
            log.push(build_record(timestamp, payload));
            Ok(true)
        }

        fn records(&self, store: &str) -> Vec<Value> {
            self.logs.get(store).cloned().unwrap_or_default()
        }

        fn remove_duplicates(&mut self, store: &str, key: &str) -> Result<CleanupOutcome, StoreError> {
            let log = self.logs.remove(store).unwrap_or_default();
            let (kept, report) = dedupe_by_key(log, key);
            self.logs.insert(store.to_string(), kept);
            Ok(CleanupOutcome::Cleaned(report))
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let items = vec![
            json!({"timestamp": "T1", "x": 1}),
            json!({"timestamp": "T1", "x": 2}),
            json!({"timestamp": "T2", "x": 3}),
        ];
        let (kept, report) = dedupe_by_key(items, "timestamp");
        assert_eq!(
            kept,
            vec![json!({"timestamp": "T1", "x": 1}), json!({"timestamp": "T2", "x": 3})]
        );
        assert_eq!(report, CleanupReport { kept: 2, removed: 1 });
    }

    #[test]
    fn dedupe_keeps_items_without_key() {
        let items = vec![json!({"x": 1}), json!({"x": 1}), json!("loose"), json!({"timestamp": "T"})];
        let (kept, report) = dedupe_by_key(items, "timestamp");
        assert_eq!(kept.len(), 4);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let items = vec![json!({"timestamp": "A"}), json!({"timestamp": "A"}), json!({"timestamp": "B"})];
        let (once, _) = dedupe_by_key(items, "timestamp");
        let (twice, report) = dedupe_by_key(once.clone(), "timestamp");
        assert_eq!(once, twice);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn build_record_puts_timestamp_first_and_ignores_payload_timestamp() {
        let mut payload = Map::new();
        payload.insert("caption".into(), json!("hello"));
        payload.insert("timestamp".into(), json!("spoofed"));
        let record = build_record("T1", payload);
        let keys: Vec<&String> = record.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["timestamp", "caption"]);
        assert_eq!(record["timestamp"], "T1");
    }

    #[test]
    fn append_record_rejects_repeated_timestamp() {
        let mut store = VecStore::default();
        let record = CaptionRecord {
            timestamp: "2024-03-01_10-00-00".into(),
            caption: "first".into(),
            image_path: "a.jpg".into(),
        };
        assert!(append_record(&mut store, &record).unwrap());
        let retry = CaptionRecord {
            caption: "second".into(),
            ..record.clone()
        };
        assert!(!append_record(&mut store, &retry).unwrap());
        let log = store.records("captions");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["caption"], "first");
    }

    #[test]
    fn cleanup_outcome_removed_count() {
        assert_eq!(CleanupOutcome::Missing.removed(), 0);
        assert_eq!(CleanupOutcome::Cleaned(CleanupReport { kept: 3, removed: 2 }).removed(), 2);
    }
}
