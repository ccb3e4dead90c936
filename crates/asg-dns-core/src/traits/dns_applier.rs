// # DNS Applier Trait
//
// Defines the interface for mutating records in the authoritative DNS store.
//
// ## Implementations
//
// - In-memory store: `crate::store::MemoryRecordStore`
// - Future: Route 53 change batches
//
// ## Usage
//
// ```rust,ignore
// use asg_dns_core::{DnsApplier, RecordType};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let applier = /* DnsApplier implementation */;
//
//     applier
//         .apply_upsert("web.eu-west-1a.example.com", RecordType::A, &["10.0.0.1".into()])
//         .await?;
//
//     // Deletes must name the values currently on record
//     let current = applier
//         .current_values("web.eu-west-1a.example.com", RecordType::A)
//         .await?;
//     applier
//         .apply_delete("web.eu-west-1a.example.com", RecordType::A, &current)
//         .await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// TTL applied to every managed record, in seconds
pub const RECORD_TTL_SECS: u32 = 60;

/// DNS record type managed by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Address record for zone, region and per-instance names
    A,
    /// Ownership marker
    #[serde(rename = "TXT")]
    Txt,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for DNS applier implementations
///
/// # Idempotency
///
/// `apply_upsert` with an already-correct value set must be a harmless no-op.
/// `apply_delete` must fail loudly when `expected_values` does not match the
/// values on record exactly (order-insensitive); silently succeeding without
/// effect would hide races between concurrent reconcilers.
///
/// # Trust Level: Untrusted
///
/// Appliers perform one store call per invocation and report the outcome.
/// They must not retry, cache record state, or decide whether a change is
/// needed; all of that is owned by the planner and the reconciler.
#[async_trait]
pub trait DnsApplier: Send + Sync {
    /// Create or replace a record set with TTL [`RECORD_TTL_SECS`]
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The store accepted the change
    /// - `Err(Error::Apply)`: The store rejected it
    async fn apply_upsert(
        &self,
        record_name: &str,
        record_type: RecordType,
        values: &[String],
    ) -> Result<(), crate::Error>;

    /// Delete a record set whose current values are `expected_values`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The record was deleted
    /// - `Err(Error::Apply)`: The record is missing or its values differ
    async fn apply_delete(
        &self,
        record_name: &str,
        record_type: RecordType,
        expected_values: &[String],
    ) -> Result<(), crate::Error>;

    /// Fetch the values currently on record
    ///
    /// An empty vector means the record does not exist.
    async fn current_values(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, crate::Error>;

    /// Get the applier name (for logging/debugging)
    fn applier_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_wire_names() {
        assert_eq!(RecordType::A.to_string(), "A");
        assert_eq!(RecordType::Txt.to_string(), "TXT");
        assert_eq!(serde_json::to_string(&RecordType::Txt).unwrap(), "\"TXT\"");
        assert_eq!(
            serde_json::from_str::<RecordType>("\"A\"").unwrap(),
            RecordType::A
        );
    }
}
