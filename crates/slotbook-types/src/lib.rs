//! Shared domain types for slotbook.
//!
//! This crate contains the domain types used across the workspace: slots,
//! slot templates, appointments, payments, the store/staff directory, the
//! error taxonomy, and configuration types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod appointment;
pub mod config;
pub mod error;
pub mod id;
pub mod payment;
pub mod slot;
pub mod store;
pub mod template;
