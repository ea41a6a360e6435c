//! Infrastructure layer for slotbook.
//!
//! Contains implementations of the ports defined in `slotbook-core`: SQLite
//! storage for slots, templates, appointments and the store directory, a
//! stub payment gateway that records deposits locally, and the config loader.

pub mod config;
pub mod sqlite;
