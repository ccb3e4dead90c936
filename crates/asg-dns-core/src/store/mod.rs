// # Record Store Implementations
//
// This module provides implementations of the DnsApplier and TxtResolver
// traits that keep the authoritative record set locally.

pub mod memory;

pub use memory::{Change, ChangeAction, MemoryRecordStore, RecordSnapshot};
