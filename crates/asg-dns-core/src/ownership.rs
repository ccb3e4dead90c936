//! Ownership markers for per-instance records
//!
//! When a per-instance A record is created, a companion TXT record is written
//! at `{instance_id}.{region}.{domain}` whose value is the A record's name.
//! On termination the marker tells us which record to remove without
//! re-deriving it from a topology the instance is no longer part of.
//!
//! The marker is deleted last, so a failed A-record deletion leaves it in
//! place for the retried event to find.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, RecordFailure, Result};
use crate::traits::{DnsApplier, RecordType, TxtResolver, unquote_txt};

/// Name of the ownership marker for an instance
pub fn marker_name(instance_id: &str, region: &str, domain: &str) -> String {
    format!(
        "{}.{}.{}",
        instance_id,
        region,
        domain.trim_start_matches('.')
    )
}

/// Quote a TXT value for the store
fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

/// Creates and clears ownership markers
#[derive(Clone)]
pub struct OwnershipTracker {
    applier: Arc<dyn DnsApplier>,
    resolver: Arc<dyn TxtResolver>,
}

impl OwnershipTracker {
    /// Create a tracker writing through `applier` and reading through `resolver`
    pub fn new(applier: Arc<dyn DnsApplier>, resolver: Arc<dyn TxtResolver>) -> Self {
        Self { applier, resolver }
    }

    /// Record that `instance_id` owns `record_name`
    pub async fn record_ownership(
        &self,
        instance_id: &str,
        record_name: &str,
        region: &str,
        domain: &str,
    ) -> Result<()> {
        let marker = marker_name(instance_id, region, domain);
        self.applier
            .apply_upsert(&marker, RecordType::Txt, &[quote(record_name)])
            .await?;

        info!("Recorded ownership {} -> {}", marker, record_name);
        Ok(())
    }

    /// Delete the records owned by `instance_id` and then its marker
    ///
    /// # Returns
    ///
    /// - `Ok(names)`: The A-record names the marker pointed at
    /// - `Err(Error::OwnershipNotFound)`: No marker exists; nothing to delete
    /// - `Err(Error::Reconcile)`: Some owned records could not be deleted; every
    ///   name was attempted and the marker is left in place
    /// - `Err(_)`: The marker lookup itself failed
    pub async fn resolve_and_clear(
        &self,
        instance_id: &str,
        region: &str,
        domain: &str,
    ) -> Result<Vec<String>> {
        let marker = marker_name(instance_id, region, domain);

        let names: Vec<String> = self
            .resolver
            .resolve_txt(&marker)
            .await?
            .iter()
            .map(|v| unquote_txt(v).to_string())
            .filter(|v| !v.is_empty())
            .collect();

        if names.is_empty() {
            return Err(Error::OwnershipNotFound(marker));
        }

        let mut failures = Vec::new();
        for name in &names {
            if let Err(error) = self.delete_owned(name).await {
                warn!("Failed to delete owned record {}: {}", name, error);
                failures.push(RecordFailure {
                    record: name.clone(),
                    error,
                });
            }
        }

        if !failures.is_empty() {
            // Keep the marker so a retried termination finds the leftovers
            return Err(Error::Reconcile(failures));
        }

        let marker_values = self.applier.current_values(&marker, RecordType::Txt).await?;
        if !marker_values.is_empty() {
            self.applier
                .apply_delete(&marker, RecordType::Txt, &marker_values)
                .await?;
        }

        info!("Cleared ownership marker {}", marker);
        Ok(names)
    }

    async fn delete_owned(&self, name: &str) -> Result<()> {
        let current = self.applier.current_values(name, RecordType::A).await?;
        if current.is_empty() {
            debug!("Owned record {} already removed", name);
            return Ok(());
        }
        self.applier.apply_delete(name, RecordType::A, &current).await?;
        info!("Deleted owned record {} {:?}", name, current);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    fn tracker(store: &MemoryRecordStore) -> OwnershipTracker {
        OwnershipTracker::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[test]
    fn test_marker_name() {
        assert_eq!(
            marker_name("i-1", "eu-west-1", "example.com"),
            "i-1.eu-west-1.example.com"
        );
        assert_eq!(
            marker_name("i-1", "eu-west-1", ".example.com"),
            "i-1.eu-west-1.example.com"
        );
    }

    #[tokio::test]
    async fn test_record_then_clear_round_trip() {
        let store = MemoryRecordStore::new();
        let tracker = tracker(&store);

        store
            .apply_upsert("ip-10-0-0-1.example.com", RecordType::A, &["10.0.0.1".to_string()])
            .await
            .unwrap();
        tracker
            .record_ownership("i-1", "ip-10-0-0-1.example.com", "eu-west-1", "example.com")
            .await
            .unwrap();
        assert_eq!(
            store.get("i-1.eu-west-1.example.com", RecordType::Txt).await,
            Some(vec!["\"ip-10-0-0-1.example.com\"".to_string()])
        );

        let cleared = tracker
            .resolve_and_clear("i-1", "eu-west-1", "example.com")
            .await
            .unwrap();
        assert_eq!(cleared, vec!["ip-10-0-0-1.example.com".to_string()]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_marker_is_ownership_not_found() {
        let store = MemoryRecordStore::new();
        let err = tracker(&store)
            .resolve_and_clear("i-404", "eu-west-1", "example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OwnershipNotFound(_)));
    }

    #[tokio::test]
    async fn test_marker_cleared_when_record_already_gone() {
        let store = MemoryRecordStore::new();
        let tracker = tracker(&store);
        tracker
            .record_ownership("i-1", "ip-10-0-0-1.example.com", "eu-west-1", "example.com")
            .await
            .unwrap();

        let cleared = tracker
            .resolve_and_clear("i-1", "eu-west-1", "example.com")
            .await
            .unwrap();
        assert_eq!(cleared.len(), 1);
        assert!(store.is_empty().await);

        // A retried termination finds nothing left
        assert!(matches!(
            tracker.resolve_and_clear("i-1", "eu-west-1", "example.com").await,
            Err(Error::OwnershipNotFound(_))
        ));
    }
}
