//! Instance topology snapshots
//!
//! A [`Topology`] is the healthy-instance view of one autoscaling group at one
//! point in time. It is built fresh for every reconciliation and never mutated
//! afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::TopologyResolver;

/// A healthy instance discovered in an autoscaling group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Instance identifier (e.g. "i-0abc")
    pub id: String,
    /// Private network address
    pub private_ip: IpAddr,
    /// Availability zone the instance runs in
    pub availability_zone: String,
}

impl Instance {
    /// Create a new instance
    pub fn new(
        id: impl Into<String>,
        private_ip: IpAddr,
        availability_zone: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            private_ip,
            availability_zone: availability_zone.into(),
        }
    }
}

/// Healthy instances of a group, grouped by availability zone
///
/// Every zone known to the region has an entry, even if empty. Zones iterate
/// in name order; instances keep resolution order within their zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    region: String,
    zones: BTreeMap<String, Vec<Instance>>,
}

impl Topology {
    /// Build a topology from the region's zone list and its healthy instances
    ///
    /// Instances reporting a zone missing from `zones` still get an entry.
    pub fn new<Z, S>(
        region: impl Into<String>,
        zones: Z,
        instances: impl IntoIterator<Item = Instance>,
    ) -> Self
    where
        Z: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut by_zone: BTreeMap<String, Vec<Instance>> =
            zones.into_iter().map(|z| (z.into(), Vec::new())).collect();

        for instance in instances {
            by_zone
                .entry(instance.availability_zone.clone())
                .or_default()
                .push(instance);
        }

        Self {
            region: region.into(),
            zones: by_zone,
        }
    }

    /// Region this snapshot belongs to
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Iterate over `(zone, instances)` pairs, including empty zones
    pub fn zones(&self) -> impl Iterator<Item = (&str, &[Instance])> {
        self.zones.iter().map(|(z, i)| (z.as_str(), i.as_slice()))
    }

    /// Names of every zone in the snapshot
    pub fn zone_names(&self) -> Vec<&str> {
        self.zones.keys().map(String::as_str).collect()
    }

    /// Instances in one zone (empty for unknown zones)
    pub fn instances_in(&self, zone: &str) -> &[Instance] {
        self.zones.get(zone).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Region view: every instance, zone by zone
    pub fn region_instances(&self) -> impl Iterator<Item = &Instance> {
        self.zones.values().flatten()
    }

    /// Addresses of every instance in the region
    pub fn region_addresses(&self) -> Vec<String> {
        self.region_instances()
            .map(|i| i.private_ip.to_string())
            .collect()
    }

    /// Find a healthy instance by id
    pub fn find_instance(&self, instance_id: &str) -> Option<&Instance> {
        self.region_instances().find(|i| i.id == instance_id)
    }

    /// Total number of healthy instances
    pub fn len(&self) -> usize {
        self.zones.values().map(Vec::len).sum()
    }

    /// Whether the group has no healthy instances at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// On-disk shape of a topology snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Region the snapshot was taken in
    pub region: String,
    /// Autoscaling group the snapshot describes; any group matches when unset
    #[serde(default)]
    pub group: Option<String>,
    /// Zone name to healthy instances
    pub zones: BTreeMap<String, Vec<SnapshotInstance>>,
}

/// Instance entry in a [`TopologySnapshot`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInstance {
    /// Instance identifier
    pub id: String,
    /// Private network address
    pub private_ip: IpAddr,
}

impl From<&TopologySnapshot> for Topology {
    fn from(snapshot: &TopologySnapshot) -> Self {
        let instances = snapshot.zones.iter().flat_map(|(zone, list)| {
            list.iter()
                .map(move |i| Instance::new(i.id.clone(), i.private_ip, zone.clone()))
        });
        Topology::new(snapshot.region.clone(), snapshot.zones.keys().cloned(), instances)
    }
}

/// Topology resolver serving a fixed snapshot
///
/// Used for dry runs and tests where the discovery API is not available.
#[derive(Debug, Clone)]
pub struct StaticTopologyResolver {
    group: Option<String>,
    topology: Topology,
}

impl StaticTopologyResolver {
    /// Serve `topology` for any group in its region
    pub fn new(topology: Topology) -> Self {
        Self {
            group: None,
            topology,
        }
    }

    /// Only answer for `group`
    pub fn for_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Parse a snapshot from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let snapshot: TopologySnapshot = serde_json::from_str(json)?;
        Ok(Self {
            group: snapshot.group.clone(),
            topology: Topology::from(&snapshot),
        })
    }

    /// Load a snapshot from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::discovery(format!("reading topology snapshot {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }
}

#[async_trait]
impl TopologyResolver for StaticTopologyResolver {
    async fn resolve_topology(&self, group_id: &str, region: &str) -> Result<Topology> {
        if let Some(group) = &self.group
            && group != group_id
        {
            return Err(Error::discovery(format!(
                "no autoscaling group {:?} in snapshot (have {:?})",
                group_id, group
            )));
        }

        if self.topology.region() != region {
            return Err(Error::discovery(format!(
                "snapshot covers region {:?}, not {:?}",
                self.topology.region(),
                region
            )));
        }

        debug!(
            "Resolved {} healthy instance(s) across {} zone(s) for {}",
            self.topology.len(),
            self.topology.zones.len(),
            group_id
        );
        Ok(self.topology.clone())
    }
}
