// # Topology Resolver Trait
//
// Defines the interface for discovering the healthy instances of an
// autoscaling group.
//
// ## Implementations
//
// - Static snapshot: `crate::topology::StaticTopologyResolver`
// - Future: EC2/Auto Scaling API backed resolver
//
// ## Usage
//
// ```rust,ignore
// use asg_dns_core::TopologyResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* TopologyResolver implementation */;
//
//     let topology = resolver.resolve_topology("web-asg", "eu-west-1").await?;
//     for (zone, instances) in topology.zones() {
//         println!("{zone}: {} healthy", instances.len());
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::topology::Topology;

/// Trait for topology resolver implementations
///
/// # Contract
///
/// - Only instances the autoscaling group reports as healthy are returned.
///   A terminating instance must already be excluded.
/// - Every availability zone of the region gets an entry, even when it has
///   no healthy instances, so emptied zones still converge to a deletion.
/// - Any underlying lookup failure is reported as [`crate::Error::Discovery`].
///
/// # Trust Level: Semi-Trusted
///
/// Resolvers may perform network I/O against the discovery API. They must not
/// touch DNS records and must not retry internally; timeouts and cancellation
/// belong to the resolver's own client configuration.
#[async_trait]
pub trait TopologyResolver: Send + Sync {
    /// Resolve the healthy instances of `group_id` in `region`
    ///
    /// # Returns
    ///
    /// - `Ok(Topology)`: Healthy instances grouped by availability zone
    /// - `Err(Error::Discovery)`: If the lookup failed
    async fn resolve_topology(
        &self,
        group_id: &str,
        region: &str,
    ) -> Result<Topology, crate::Error>;
}
