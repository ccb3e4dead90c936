//! Test doubles and common utilities for reconciliation contract tests
//!
//! The doubles wrap [`MemoryRecordStore`] so every test observes real store
//! semantics (exact-match deletes, TTL, change log) while still being able to
//! count calls and inject failures.

#![allow(dead_code)]

use asg_dns_core::error::{Error, Result};
use asg_dns_core::traits::{DnsApplier, RecordType, TopologyResolver, TxtResolver};
use asg_dns_core::{
    Instance, MemoryRecordStore, NamePattern, PatternKind, Reconciler, ReconcilerConfig,
    Topology,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const GROUP: &str = "web-asg";
pub const REGION: &str = "eu-west-1";
pub const ZONE_A: &str = "eu-west-1a";
pub const ZONE_B: &str = "eu-west-1b";
pub const DOMAIN: &str = "example.com";

/// An applier over a shared MemoryRecordStore that counts calls and can
/// reject writes to chosen record names
#[derive(Clone)]
pub struct CountingApplier {
    store: MemoryRecordStore,
    upsert_call_count: Arc<AtomicUsize>,
    delete_call_count: Arc<AtomicUsize>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl CountingApplier {
    pub fn new(store: MemoryRecordStore) -> Self {
        Self {
            store,
            upsert_call_count: Arc::new(AtomicUsize::new(0)),
            delete_call_count: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Reject every upsert/delete of `record_name`
    pub fn fail_on(&self, record_name: &str) {
        self.failing.lock().unwrap().insert(record_name.to_string());
    }

    /// Stop rejecting writes
    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Get the number of times apply_upsert() was called
    pub fn upsert_call_count(&self) -> usize {
        self.upsert_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times apply_delete() was called
    pub fn delete_call_count(&self) -> usize {
        self.delete_call_count.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &MemoryRecordStore {
        &self.store
    }

    fn check(&self, record_name: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(record_name) {
            return Err(Error::apply(record_name, "injected store failure"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsApplier for CountingApplier {
    async fn apply_upsert(
        &self,
        record_name: &str,
        record_type: RecordType,
        values: &[String],
    ) -> Result<()> {
        self.upsert_call_count.fetch_add(1, Ordering::SeqCst);
        self.check(record_name)?;
        self.store.apply_upsert(record_name, record_type, values).await
    }

    async fn apply_delete(
        &self,
        record_name: &str,
        record_type: RecordType,
        expected_values: &[String],
    ) -> Result<()> {
        self.delete_call_count.fetch_add(1, Ordering::SeqCst);
        self.check(record_name)?;
        self.store
            .apply_delete(record_name, record_type, expected_values)
            .await
    }

    async fn current_values(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>> {
        self.store.current_values(record_name, record_type).await
    }

    fn applier_name(&self) -> &'static str {
        "counting"
    }
}

/// A topology resolver whose answer can be swapped between events
#[derive(Clone)]
pub struct SwitchableTopologyResolver {
    topology: Arc<Mutex<Topology>>,
    call_count: Arc<AtomicUsize>,
}

impl SwitchableTopologyResolver {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology: Arc::new(Mutex::new(topology)),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `topology` from now on
    pub fn set(&self, topology: Topology) {
        *self.topology.lock().unwrap() = topology;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TopologyResolver for SwitchableTopologyResolver {
    async fn resolve_topology(&self, _group_id: &str, _region: &str) -> Result<Topology> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.topology.lock().unwrap().clone())
    }
}

/// A topology resolver that always fails
pub struct FailingTopologyResolver;

#[async_trait::async_trait]
impl TopologyResolver for FailingTopologyResolver {
    async fn resolve_topology(&self, group_id: &str, _region: &str) -> Result<Topology> {
        Err(Error::discovery(format!("describe {} timed out", group_id)))
    }
}

/// A topology resolver that never answers
pub struct HangingTopologyResolver;

#[async_trait::async_trait]
impl TopologyResolver for HangingTopologyResolver {
    async fn resolve_topology(&self, _group_id: &str, _region: &str) -> Result<Topology> {
        std::future::pending().await
    }
}

pub fn ip(s: &str) -> std::net::IpAddr {
    s.parse().unwrap()
}

/// Zone a holds i-1 (10.0.0.1), zone b is empty
pub fn launch_topology() -> Topology {
    Topology::new(
        REGION,
        [ZONE_A, ZONE_B],
        [Instance::new("i-1", ip("10.0.0.1"), ZONE_A)],
    )
}

/// Both zones empty
pub fn empty_topology() -> Topology {
    Topology::new(REGION, [ZONE_A, ZONE_B], Vec::<Instance>::new())
}

pub fn zone_record(zone: &str) -> String {
    format!("web.{}.{}", zone, DOMAIN)
}

pub fn region_record() -> String {
    format!("web.{}.{}", REGION, DOMAIN)
}

pub fn instance_record(ip: &str) -> String {
    format!("ip-{}.{}", ip, DOMAIN)
}

fn pattern(s: &str) -> NamePattern {
    NamePattern::parse(s).unwrap()
}

/// Zone and region patterns only; role is the group name minus "-asg"
pub fn base_config() -> ReconcilerConfig {
    ReconcilerConfig::new("Z123")
        .with_environment("asg")
        .with_pattern(
            PatternKind::Zone,
            pattern("{{.Role}}.{{.AvailabilityZone}}.example.com"),
        )
        .with_pattern(
            PatternKind::Region,
            pattern("{{.Role}}.{{.Region}}.example.com"),
        )
}

/// Base config plus per-instance records and ownership markers
pub fn ownership_config() -> ReconcilerConfig {
    base_config()
        .with_ip_records(DOMAIN)
        .with_pattern(PatternKind::Instance, pattern("ip-{{.IP}}.{{.Domain}}"))
}

/// Everything a contract test needs to drive and observe a reconciler
pub struct Harness {
    pub reconciler: Reconciler,
    pub applier: CountingApplier,
    pub topology: SwitchableTopologyResolver,
}

impl Harness {
    pub fn new(config: ReconcilerConfig, topology: Topology) -> Self {
        let store = MemoryRecordStore::new();
        let applier = CountingApplier::new(store.clone());
        let resolver = SwitchableTopologyResolver::new(topology);

        let (reconciler, _event_rx) = Reconciler::new(
            Arc::new(resolver.clone()),
            Arc::new(applier.clone()),
            Arc::new(store) as Arc<dyn TxtResolver>,
            config,
        )
        .expect("reconciler construction succeeds");

        Self {
            reconciler,
            applier,
            topology: resolver,
        }
    }

    pub fn store(&self) -> &MemoryRecordStore {
        self.applier.store()
    }
}
