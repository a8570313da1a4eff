//! Remote → Local reconciliation.
//!
//! A remote snapshot is the full content of the tasks collection. Each child
//! is coerced into a [`Task`] (missing fields get defaults) and upserted with
//! `is_synced = true`, overwriting the local copy. The whole batch shares one
//! transaction; a bad record is logged and skipped without affecting the
//! others.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use sea_orm::DbErr;
use serde_json::{Map, Value};

use crate::error::MalformedRecord;
use crate::messages::{ChangeKind, IngestReport};
use crate::store::{LocalStore, find_in, upsert_in};
use crate::task::{Task, TaskPriority, TaskStatus, now_millis};

/// Children of a snapshot as `(key, record)` pairs.
///
/// Objects are keyed by id. Arrays (what the remote returns when every key
/// is a small integer) are keyed by index, with `null` holes skipped.
pub fn snapshot_entries(snapshot: &Value) -> Vec<(String, &Value)> {
    match snapshot {
        Value::Null => Vec::new(),
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        other => {
            log::warn!("Ignoring remote snapshot that is not a collection: {}", other);
            Vec::new()
        }
    }
}

/// Identity of a remote record: its `_id` field, or the snapshot key when
/// the field is absent.
pub fn record_id(key: &str, value: &Value) -> Result<String, MalformedRecord> {
    let Value::Object(fields) = value else {
        return Err(MalformedRecord::new(key, "record is not an object"));
    };
    let id = match fields.get("_id") {
        None | Some(Value::Null) => key.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        // Integral floats name the same record as their integer form.
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(|i| i.to_string())
            .unwrap_or_else(|| n.to_string()),
        Some(other) => {
            return Err(MalformedRecord::new(key, format!("invalid _id {other}")));
        }
    };
    if id.is_empty() {
        return Err(MalformedRecord::new(key, "empty _id"));
    }
    Ok(id)
}

/// Turn one remote record into a synced [`Task`].
///
/// Missing timestamps keep the value of `existing` when there is one, so
/// ingesting the same snapshot twice leaves the store unchanged.
pub fn coerce_record(
    id: &str,
    value: &Value,
    existing: Option<&Task>,
    now: DateTime<Utc>,
) -> Result<Task, MalformedRecord> {
    let Value::Object(fields) = value else {
        return Err(MalformedRecord::new(id, "record is not an object"));
    };

    Ok(Task {
        id: id.to_string(),
        title: text_field(id, fields, "title")?,
        description: text_field(id, fields, "description")?,
        assigned_to: text_field(id, fields, "assignedTo")?,
        status: enum_field(id, fields, "status"),
        priority: enum_field(id, fields, "priority"),
        created_at: timestamp_field(id, fields, "createdAt", existing.map(|t| t.created_at).unwrap_or(now))?,
        updated_at: timestamp_field(id, fields, "updatedAt", existing.map(|t| t.updated_at).unwrap_or(now))?,
        is_synced: true,
    })
}

fn text_field(id: &str, fields: &Map<String, Value>, name: &str) -> Result<String, MalformedRecord> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(MalformedRecord::new(id, format!("{name} is not a string: {other}"))),
    }
}

fn enum_field<T>(id: &str, fields: &Map<String, Value>, name: &str) -> T
where
    T: std::str::FromStr<Err = String> + Default,
{
    match fields.get(name) {
        None | Some(Value::Null) => T::default(),
        Some(Value::String(s)) if s.trim().is_empty() => T::default(),
        Some(Value::String(s)) => s.parse().unwrap_or_else(|e| {
            log::warn!("Task {}: {}, using default", id, e);
            T::default()
        }),
        Some(other) => {
            log::warn!("Task {}: {} is not a string ({}), using default", id, name, other);
            T::default()
        }
    }
}

fn timestamp_field(
    id: &str,
    fields: &Map<String, Value>,
    name: &str,
    fallback: DateTime<Utc>,
) -> Result<DateTime<Utc>, MalformedRecord> {
    let invalid = |detail: String| MalformedRecord::new(id, format!("invalid {name}: {detail}"));
    match fields.get(name) {
        None | Some(Value::Null) => Ok(fallback),
        Some(Value::String(s)) if s.is_empty() => Ok(fallback),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(3))
            .map_err(|e| invalid(format!("{s:?} ({e})"))),
        Some(Value::Number(n)) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| invalid(n.to_string()))?;
            if millis == 0 {
                return Ok(fallback);
            }
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| invalid(n.to_string()))
        }
        Some(other) => Err(invalid(other.to_string())),
    }
}

/// Upsert every record of `snapshot` into `store` in one transaction.
pub async fn ingest_snapshot(store: &LocalStore, snapshot: &Value) -> Result<IngestReport, DbErr> {
    let entries = snapshot_entries(snapshot);
    let mut report = IngestReport::default();
    if entries.is_empty() {
        return Ok(report);
    }

    let now = now_millis();
    let mut ingested = Vec::with_capacity(entries.len());
    let txn = store.begin().await?;
    for (key, value) in entries {
        let id = match record_id(&key, value) {
            Ok(id) => id,
            Err(skip) => {
                log::warn!("Skipped bad task: {}", skip);
                report.skipped.push(skip);
                continue;
            }
        };
        let existing = match find_in(&txn, &id).await {
            Ok(existing) => existing,
            Err(e) => {
                log::warn!("Skipped task {}: lookup failed: {}", id, e);
                report.skipped.push(MalformedRecord::new(id, e.to_string()));
                continue;
            }
        };
        let task = match coerce_record(&id, value, existing.as_ref(), now) {
            Ok(task) => task,
            Err(skip) => {
                log::warn!("Skipped bad task: {}", skip);
                report.skipped.push(skip);
                continue;
            }
        };
        if let Err(e) = upsert_in(&txn, &task).await {
            log::warn!("Skipped task {}: upsert failed: {}", id, e);
            report.skipped.push(MalformedRecord::new(id, e.to_string()));
            continue;
        }
        report.upserted += 1;
        ingested.push(task.id);
    }
    txn.commit().await?;

    log::info!(
        "Ingested {} remote task(s), skipped {}",
        report.upserted,
        report.skipped.len()
    );
    store.notify_change(ChangeKind::RemoteIngest, ingested);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let now = ts(1_700_000_000_000);
        let task = coerce_record("1", &json!({"_id": "1", "title": "Fix bug"}), None, now).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.description, "");
        assert_eq!(task.assigned_to, "");
        assert_eq!(task.created_at, now);
        assert_eq!(task.updated_at, now);
        assert!(task.is_synced);
    }

    #[test]
    fn test_missing_timestamps_keep_existing_values() {
        let existing = coerce_record("1", &json!({}), None, ts(1_000)).unwrap();
        let again = coerce_record("1", &json!({}), Some(&existing), ts(9_000)).unwrap();
        assert_eq!(again.created_at, ts(1_000));
        assert_eq!(again.updated_at, ts(1_000));
    }

    #[test]
    fn test_parses_iso_and_epoch_timestamps() {
        let record = json!({
            "createdAt": "2023-11-14T22:13:20.123456Z",
            "updatedAt": 1_700_000_001_000i64,
            "status": "In Progress",
            "priority": "low",
        });
        let task = coerce_record("1", &record, None, ts(0)).unwrap();
        assert_eq!(task.created_at, ts(1_700_000_000_123));
        assert_eq!(task.updated_at, ts(1_700_000_001_000));
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, TaskPriority::Low);
    }

    #[test]
    fn test_unknown_enum_values_fall_back_to_defaults() {
        let task = coerce_record("1", &json!({"status": "Blocked", "priority": 3}), None, ts(0)).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
    }

    #[test]
    fn test_malformed_records() {
        assert!(record_id("k", &json!("not an object")).is_err());
        assert!(record_id("k", &json!({"_id": ""})).is_err());
        assert!(record_id("k", &json!({"_id": {"nested": true}})).is_err());
        assert!(coerce_record("k", &json!({"title": 42}), None, ts(0)).is_err());
        assert!(coerce_record("k", &json!({"updatedAt": "yesterday"}), None, ts(0)).is_err());
    }

    #[test]
    fn test_record_id_sources() {
        assert_eq!(record_id("k", &json!({"_id": 1700000000000i64})).unwrap(), "1700000000000");
        assert_eq!(record_id("k", &json!({"title": "x"})).unwrap(), "k");
        assert_eq!(record_id("k", &json!({"_id": " 7 "})).unwrap(), "7");
    }

    #[test]
    fn test_float_ids_match_integer_keys() {
        assert_eq!(record_id("k", &json!({"_id": 1700000000000.0})).unwrap(), "1700000000000");
        assert_eq!(record_id("k", &json!({"_id": 2.5})).unwrap(), "2.5");
    }

    #[test]
    fn test_snapshot_entries_shapes() {
        assert!(snapshot_entries(&Value::Null).is_empty());
        assert!(snapshot_entries(&json!(12)).is_empty());

        let array = json!([null, {"_id": "1"}, {"_id": "2"}]);
        let from_array = snapshot_entries(&array);
        let keys: Vec<_> = from_array.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["1", "2"]);

        assert_eq!(snapshot_entries(&json!({"a": {}, "b": {}})).len(), 2);
    }
}
