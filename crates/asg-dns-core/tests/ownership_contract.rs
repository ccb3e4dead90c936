//! Contract Test: Ownership markers
//!
//! Constraints verified:
//! - Recording then clearing ownership returns exactly the recorded name
//! - A launch with per-instance records writes both the A record and marker
//! - A missing marker means "nothing to delete", never an error
//! - Every owned record is attempted even when one deletion fails, and the
//!   marker survives until all of them are gone

mod common;

use asg_dns_core::traits::RecordType;
use asg_dns_core::traits::DnsApplier;
use asg_dns_core::{EventKind, LifecycleEvent, MemoryRecordStore, OwnershipTracker};
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn record_then_resolve_returns_recorded_name() {
    let store = MemoryRecordStore::new();
    let tracker = OwnershipTracker::new(Arc::new(store.clone()), Arc::new(store.clone()));

    tracker
        .record_ownership("i-9", "ip-10-0-0-9.example.com", REGION, DOMAIN)
        .await
        .unwrap();

    let names = tracker
        .resolve_and_clear("i-9", REGION, DOMAIN)
        .await
        .unwrap();
    assert_eq!(names, vec!["ip-10-0-0-9.example.com".to_string()]);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn failed_owned_delete_does_not_block_other_owned_records() {
    let store = MemoryRecordStore::new();
    for name in ["a.example.com", "b.example.com"] {
        store
            .apply_upsert(name, RecordType::A, &["10.0.0.9".to_string()])
            .await
            .unwrap();
    }
    let marker = "i-9.eu-west-1.example.com";
    store
        .apply_upsert(
            marker,
            RecordType::Txt,
            &["\"a.example.com\"".to_string(), "\"b.example.com\"".to_string()],
        )
        .await
        .unwrap();

    let applier = CountingApplier::new(store.clone());
    applier.fail_on("a.example.com");
    let tracker = OwnershipTracker::new(Arc::new(applier.clone()), Arc::new(store.clone()));

    let err = tracker
        .resolve_and_clear("i-9", REGION, DOMAIN)
        .await
        .unwrap_err();

    assert_eq!(err.failures().len(), 1, "{err}");
    assert_eq!(err.failures()[0].record, "a.example.com");
    assert_eq!(applier.delete_call_count(), 2);
    assert!(store.get("b.example.com", RecordType::A).await.is_none());
    assert!(store.get("a.example.com", RecordType::A).await.is_some());
    assert_eq!(store.get(marker, RecordType::Txt).await.map(|v| v.len()), Some(2));
}

#[tokio::test]
async fn launch_writes_instance_record_and_marker() {
    let harness = Harness::new(ownership_config(), launch_topology());

    let report = harness
        .reconciler
        .handle_event(&LifecycleEvent::new(EventKind::Launch, "i-1", GROUP, REGION))
        .await
        .unwrap();

    let record = instance_record("10.0.0.1");
    assert_eq!(report.instance_record.as_deref(), Some(record.as_str()));
    assert_eq!(
        harness.store().get(&record, RecordType::A).await,
        Some(vec!["10.0.0.1".to_string()])
    );
    assert_eq!(
        harness
            .store()
            .get("i-1.eu-west-1.example.com", RecordType::Txt)
            .await,
        Some(vec![format!("\"{}\"", record)])
    );
}

#[tokio::test]
async fn launch_of_instance_missing_from_topology_skips_instance_record() {
    let harness = Harness::new(ownership_config(), launch_topology());

    let report = harness
        .reconciler
        .handle_event(&LifecycleEvent::new(EventKind::Launch, "i-unknown", GROUP, REGION))
        .await
        .expect("zone and region records still converge");

    assert_eq!(report.instance_record, None);
    assert!(
        harness
            .store()
            .get("i-unknown.eu-west-1.example.com", RecordType::Txt)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn terminate_without_marker_is_not_an_error() {
    // Instance launched while per-instance records were disabled
    let harness = Harness::new(ownership_config(), empty_topology());

    let report = harness
        .reconciler
        .handle_event(&LifecycleEvent::new(EventKind::Terminate, "i-1", GROUP, REGION))
        .await
        .expect("missing marker is tolerated");

    assert!(report.cleared.is_empty());
    assert_eq!(harness.applier.delete_call_count(), 0);
}

#[tokio::test]
async fn disabled_ownership_leaves_markers_alone() {
    let harness = Harness::new(base_config(), launch_topology());

    let report = harness
        .reconciler
        .handle_event(&LifecycleEvent::new(EventKind::Launch, "i-1", GROUP, REGION))
        .await
        .unwrap();

    assert_eq!(report.instance_record, None);
    assert!(
        harness
            .store()
            .snapshot()
            .await
            .iter()
            .all(|r| r.record_type == RecordType::A)
    );
}
