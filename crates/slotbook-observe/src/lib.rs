//! Observability setup for slotbook: the tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
