//! Business logic and repository trait definitions for slotbook.
//!
//! This crate defines the "ports" (repository and collaborator traits) that
//! the infrastructure layer implements, plus the booking services built on
//! them. It depends only on `slotbook-types` -- never on `slotbook-infra` or
//! any database/IO crate.

pub mod drift;
pub mod payment;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
