//! Collaborator traits for the reconciliation core
//!
//! The core never talks to AWS or DNS servers itself. Everything outside the
//! reconciliation logic is reached through these interfaces:
//!
//! - [`TopologyResolver`]: Discover healthy instances grouped by zone
//! - [`DnsApplier`]: Upsert and delete records in the authoritative store
//! - [`TxtResolver`]: Look up ownership markers

pub mod dns_applier;
pub mod topology_resolver;
pub mod txt_resolver;

pub use dns_applier::{DnsApplier, RECORD_TTL_SECS, RecordType};
pub use topology_resolver::TopologyResolver;
pub use txt_resolver::{TxtResolver, unquote_txt};
