//! Record-set planner
//!
//! Turns a desired record into the store action that converges it:
//!
//! - Non-empty desired values → [`Action::Upsert`], unconditionally
//! - Empty desired values → [`Action::Delete`] carrying the values currently on
//!   record, because the store only deletes on an exact value match
//!
//! An empty zone is never treated as "nothing to manage". If the record turns
//! out to be absent already, the delete is planned anyway and applying it
//! leaves the store untouched.

use std::collections::HashSet;
use tracing::debug;

use crate::error::Result;
use crate::traits::{DnsApplier, RecordType};

/// What a record should look like after reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    /// Record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Desired values; empty means the record should not exist
    pub values: Vec<String>,
}

impl DesiredRecord {
    /// Create a desired record, dropping duplicate values but keeping order
    pub fn new<I, S>(name: impl Into<String>, record_type: RecordType, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let values = values
            .into_iter()
            .map(Into::into)
            .filter(|v: &String| seen.insert(v.clone()))
            .collect();

        Self {
            name: name.into(),
            record_type,
            values,
        }
    }

    /// Whether the record should be removed
    pub fn is_absent(&self) -> bool {
        self.values.is_empty()
    }
}

/// Store action computed by the planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create or replace the record with `values`
    Upsert {
        name: String,
        record_type: RecordType,
        values: Vec<String>,
    },
    /// Remove the record; `current_values` is what the store holds now
    Delete {
        name: String,
        record_type: RecordType,
        current_values: Vec<String>,
    },
    /// Nothing to manage (the granularity is not configured)
    NoOp,
}

/// Outcome of applying an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The store was mutated
    Changed,
    /// The store already matched; no call was made
    AlreadyConverged,
}

impl Action {
    /// Record name targeted by the action
    pub fn name(&self) -> Option<&str> {
        match self {
            Action::Upsert { name, .. } | Action::Delete { name, .. } => Some(name),
            Action::NoOp => None,
        }
    }

    /// Whether this is a deletion
    pub fn is_delete(&self) -> bool {
        matches!(self, Action::Delete { .. })
    }

    /// Execute the action against the store
    pub async fn apply(&self, applier: &dyn DnsApplier) -> Result<Applied> {
        match self {
            Action::Upsert {
                name,
                record_type,
                values,
            } => {
                applier.apply_upsert(name, *record_type, values).await?;
                Ok(Applied::Changed)
            }
            Action::Delete {
                name,
                record_type,
                current_values,
            } => {
                if current_values.is_empty() {
                    debug!("Record {} ({}) already absent", name, record_type);
                    return Ok(Applied::AlreadyConverged);
                }
                applier
                    .apply_delete(name, *record_type, current_values)
                    .await?;
                Ok(Applied::Changed)
            }
            Action::NoOp => Ok(Applied::AlreadyConverged),
        }
    }
}

/// Plan the action converging `desired`
///
/// `lookup` is only consulted on the delete path, to resolve the values
/// currently on record.
pub async fn plan(desired: &DesiredRecord, lookup: &dyn DnsApplier) -> Result<Action> {
    if !desired.is_absent() {
        return Ok(Action::Upsert {
            name: desired.name.clone(),
            record_type: desired.record_type,
            values: desired.values.clone(),
        });
    }

    let current_values = lookup
        .current_values(&desired.name, desired.record_type)
        .await?;

    Ok(Action::Delete {
        name: desired.name.clone(),
        record_type: desired.record_type,
        current_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[tokio::test]
    async fn test_non_empty_desired_always_upserts() {
        let store = MemoryRecordStore::new();
        let desired =
            DesiredRecord::new("web.example.com", RecordType::A, ["10.0.0.2", "10.0.0.1"]);

        let action = plan(&desired, &store).await.unwrap();
        match action {
            Action::Upsert { values, .. } => {
                assert_eq!(sorted(values), vec!["10.0.0.1", "10.0.0.2"]);
            }
            other => panic!("expected upsert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_desired_deletes_with_current_values() {
        let store = MemoryRecordStore::new();
        store
            .apply_upsert("web.example.com", RecordType::A, &["10.0.0.9".to_string()])
            .await
            .unwrap();

        let desired = DesiredRecord::new("web.example.com", RecordType::A, Vec::<String>::new());
        let action = plan(&desired, &store).await.unwrap();
        assert_eq!(
            action,
            Action::Delete {
                name: "web.example.com".to_string(),
                record_type: RecordType::A,
                current_values: vec!["10.0.0.9".to_string()],
            }
        );

        assert_eq!(action.apply(&store).await.unwrap(), Applied::Changed);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_desired_on_absent_record_is_still_a_delete() {
        let store = MemoryRecordStore::new();
        let desired = DesiredRecord::new("gone.example.com", RecordType::A, Vec::<String>::new());

        let action = plan(&desired, &store).await.unwrap();
        assert!(action.is_delete());
        assert_eq!(action.apply(&store).await.unwrap(), Applied::AlreadyConverged);
        assert!(store.changes().await.is_empty());
    }

    #[test]
    fn test_duplicates_dropped_in_resolution_order() {
        let desired = DesiredRecord::new(
            "web.example.com",
            RecordType::A,
            ["10.0.0.3", "10.0.0.1", "10.0.0.3"],
        );
        assert_eq!(desired.values, vec!["10.0.0.3", "10.0.0.1"]);
    }
}
