// # Memory Record Store
//
// In-memory authoritative DNS store.
//
// ## Purpose
//
// Stands in for a hosted zone during dry runs and tests. It follows the
// change semantics of a real hosted zone closely enough to catch planning
// mistakes:
//
// - Upsert replaces the whole record set
// - Delete must name the current values exactly (order-insensitive)
// - Deleting a missing record is an error
//
// ## TXT Values
//
// TXT values are held in their quoted wire form (`"\"value\""`). Lookups
// through `TxtResolver` return them unquoted, as a DNS resolver would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::Error;
use crate::traits::{DnsApplier, RECORD_TTL_SECS, RecordType, TxtResolver, unquote_txt};

/// Kind of mutation recorded in the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Upsert,
    Delete,
}

/// One accepted mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub action: ChangeAction,
    pub name: String,
    pub record_type: RecordType,
    pub values: Vec<String>,
}

/// A record as held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub values: Vec<String>,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    RECORD_TTL_SECS
}

#[derive(Debug, Clone)]
struct StoredRecord {
    values: Vec<String>,
    ttl: u32,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<(String, RecordType), StoredRecord>,
    changes: Vec<Change>,
}

/// In-memory record store implementation
///
/// This implementation stores all records in a BTreeMap protected by a
/// RwLock. Clones share the same records.
///
/// # Example
///
/// ```rust,no_run
/// use asg_dns_core::store::MemoryRecordStore;
/// use asg_dns_core::traits::{DnsApplier, RecordType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///
///     store
///         .apply_upsert("web.example.com", RecordType::A, &["10.0.0.1".to_string()])
///         .await?;
///
///     let values = store.current_values("web.example.com", RecordType::A).await?;
///     assert_eq!(values, vec!["10.0.0.1".to_string()]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRecordStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`
    ///
    /// Seeding does not appear in the change log.
    pub fn with_records(records: impl IntoIterator<Item = RecordSnapshot>) -> Self {
        let now = Utc::now();
        let records = records
            .into_iter()
            .map(|r| {
                (
                    (normalize(&r.name), r.record_type),
                    StoredRecord {
                        values: r.values,
                        ttl: r.ttl,
                        last_updated: now,
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(RwLock::new(Inner {
                records,
                changes: Vec::new(),
            })),
        }
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// Values of a record, if it exists
    pub async fn get(&self, record_name: &str, record_type: RecordType) -> Option<Vec<String>> {
        let guard = self.inner.read().await;
        guard
            .records
            .get(&(normalize(record_name), record_type))
            .map(|r| r.values.clone())
    }

    /// When a record was last written
    pub async fn last_updated(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Option<DateTime<Utc>> {
        let guard = self.inner.read().await;
        guard
            .records
            .get(&(normalize(record_name), record_type))
            .map(|r| r.last_updated)
    }

    /// Every record, ordered by name then type
    pub async fn snapshot(&self) -> Vec<RecordSnapshot> {
        let guard = self.inner.read().await;
        guard
            .records
            .iter()
            .map(|((name, record_type), r)| RecordSnapshot {
                name: name.clone(),
                record_type: *record_type,
                values: r.values.clone(),
                ttl: r.ttl,
            })
            .collect()
    }

    /// Accepted mutations, oldest first
    pub async fn changes(&self) -> Vec<Change> {
        self.inner.read().await.changes.clone()
    }
}

/// Record names compare case-insensitively and without the trailing root dot
fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn same_set(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[async_trait]
impl DnsApplier for MemoryRecordStore {
    async fn apply_upsert(
        &self,
        record_name: &str,
        record_type: RecordType,
        values: &[String],
    ) -> Result<(), Error> {
        if values.is_empty() {
            return Err(Error::apply(record_name, "upsert requires at least one value"));
        }

        let mut guard = self.inner.write().await;
        guard.records.insert(
            (normalize(record_name), record_type),
            StoredRecord {
                values: values.to_vec(),
                ttl: RECORD_TTL_SECS,
                last_updated: Utc::now(),
            },
        );
        guard.changes.push(Change {
            action: ChangeAction::Upsert,
            name: record_name.to_string(),
            record_type,
            values: values.to_vec(),
        });

        debug!("UPSERT {} {} {:?}", record_name, record_type, values);
        Ok(())
    }

    async fn apply_delete(
        &self,
        record_name: &str,
        record_type: RecordType,
        expected_values: &[String],
    ) -> Result<(), Error> {
        let key = (normalize(record_name), record_type);
        let mut guard = self.inner.write().await;

        let current = guard.records.get(&key).ok_or_else(|| {
            Error::apply(
                record_name,
                format!("{} record set not found", record_type),
            )
        })?;

        if !same_set(&current.values, expected_values) {
            return Err(Error::apply(
                record_name,
                format!(
                    "values {:?} do not match current record set {:?}",
                    expected_values, current.values
                ),
            ));
        }

        guard.records.remove(&key);
        guard.changes.push(Change {
            action: ChangeAction::Delete,
            name: record_name.to_string(),
            record_type,
            values: expected_values.to_vec(),
        });

        debug!("DELETE {} {} {:?}", record_name, record_type, expected_values);
        Ok(())
    }

    async fn current_values(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, Error> {
        Ok(self.get(record_name, record_type).await.unwrap_or_default())
    }

    fn applier_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl TxtResolver for MemoryRecordStore {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, Error> {
        let values = self.get(name, RecordType::Txt).await.unwrap_or_default();
        Ok(values.iter().map(|v| unquote_txt(v).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vals(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_upsert_replaces_record_set() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty().await);

        store
            .apply_upsert("web.example.com", RecordType::A, &vals(&["10.0.0.1"]))
            .await
            .unwrap();
        store
            .apply_upsert("web.example.com.", RecordType::A, &vals(&["10.0.0.2", "10.0.0.3"]))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("WEB.example.com", RecordType::A).await,
            Some(vals(&["10.0.0.2", "10.0.0.3"]))
        );
        assert!(store.last_updated("web.example.com", RecordType::A).await.is_some());
        assert_eq!(store.changes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_requires_exact_values() {
        let store = MemoryRecordStore::new();
        store
            .apply_upsert("web.example.com", RecordType::A, &vals(&["10.0.0.1", "10.0.0.2"]))
            .await
            .unwrap();

        let err = store
            .apply_delete("web.example.com", RecordType::A, &vals(&["10.0.0.1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Apply { .. }));
        assert_eq!(store.len().await, 1);

        // Order does not matter
        store
            .apply_delete("web.example.com", RecordType::A, &vals(&["10.0.0.2", "10.0.0.1"]))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_missing_record_fails() {
        let store = MemoryRecordStore::new();
        let err = store
            .apply_delete("nope.example.com", RecordType::A, &vals(&["10.0.0.1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Apply { .. }));
    }

    #[tokio::test]
    async fn test_types_are_independent() {
        let store = MemoryRecordStore::new();
        store
            .apply_upsert(
                "i-1.eu-west-1.example.com",
                RecordType::Txt,
                &vals(&["\"ip-10-0-0-1.example.com\""]),
            )
            .await
            .unwrap();

        assert!(
            store
                .current_values("i-1.eu-west-1.example.com", RecordType::A)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store.resolve_txt("i-1.eu-west-1.example.com").await.unwrap(),
            vals(&["ip-10-0-0-1.example.com"])
        );
    }

    #[tokio::test]
    async fn test_seeded_records_skip_change_log() {
        let store = MemoryRecordStore::with_records([RecordSnapshot {
            name: "web.example.com".to_string(),
            record_type: RecordType::A,
            values: vals(&["10.0.0.1"]),
            ttl: RECORD_TTL_SECS,
        }]);

        assert_eq!(store.len().await, 1);
        assert!(store.changes().await.is_empty());
        assert_eq!(store.snapshot().await[0].name, "web.example.com");
    }
}
