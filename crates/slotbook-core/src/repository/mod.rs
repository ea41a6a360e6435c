//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (slotbook-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod appointment;
pub mod slot;
pub mod store;
pub mod template;
