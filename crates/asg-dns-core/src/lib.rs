// # asg-dns-core
//
// Core library for event-driven DNS reconciliation of autoscaling groups.
//
// ## Architecture Overview
//
// On every launch or terminate notification the reconciler rebuilds the
// desired DNS state of the affected group from its current healthy topology
// and converges the authoritative store toward it:
// - **TopologyResolver**: Trait for discovering healthy instances by zone
// - **DnsApplier**: Trait for reading and mutating records in a hosted zone
// - **TxtResolver**: Trait for looking up ownership markers
// - **NamePattern**: Record-name templates with `{{.Placeholder}}` substitution
// - **Reconciler**: Core engine that orchestrates event → plan → apply
//
// ## Design Principles
//
// 1. **Level-triggered**: Desired state is recomputed from topology, never
//    derived from the event delta, so replays converge
// 2. **Independent records**: One failing record never blocks the others
// 3. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ownership;
pub mod pattern;
pub mod planner;
pub mod store;
pub mod topology;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, PatternKind, ReconcilerConfig};
pub use engine::{ReconcileEvent, ReconcileReport, Reconciler};
pub use error::{Error, RecordFailure, Result};
pub use event::{EventKind, LifecycleEvent};
pub use ownership::OwnershipTracker;
pub use pattern::{NamePattern, Placeholder, RenderContext};
pub use planner::{Action, Applied, DesiredRecord};
pub use store::MemoryRecordStore;
pub use topology::{Instance, StaticTopologyResolver, Topology, TopologySnapshot};
pub use traits::{DnsApplier, RecordType, TopologyResolver, TxtResolver};
