//! Booking services built on the repository ports.

pub mod appointment;
pub mod expander;
pub mod ledger;
pub mod template;
