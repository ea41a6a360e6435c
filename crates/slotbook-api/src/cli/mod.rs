//! CLI command definitions and dispatch for the `slotbook` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`slotbook store add`, `slotbook slots generate`).

pub mod appointment;
pub mod scheduler;
pub mod slot;
pub mod staff;
pub mod status;
pub mod store;
pub mod template;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Book appointments against shared store capacity.
#[derive(Parser)]
#[command(name = "slotbook", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit log events as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage stores (add, list, status).
    Store {
        #[command(subcommand)]
        action: store::StoreCommand,
    },

    /// Manage technicians (add, shift, remove).
    Staff {
        #[command(subcommand)]
        action: staff::StaffCommand,
    },

    /// Manage weekly slot templates (create, list, update, activate, delete).
    Template {
        #[command(subcommand)]
        action: template::TemplateCommand,
    },

    /// Generate, inspect and resize bookable slots.
    Slots {
        #[command(subcommand)]
        action: slot::SlotCommand,
    },

    /// Appointment lifecycle (create, pay, confirm, complete, cancel, show, list).
    #[command(alias = "appt")]
    Appointment {
        #[command(subcommand)]
        action: appointment::AppointmentCommand,
    },

    /// Run the daily slot generation by hand.
    Scheduler {
        #[command(subcommand)]
        action: scheduler::SchedulerCommand,
    },

    /// Run the daily slot scheduler until Ctrl+C or SIGTERM.
    Serve,

    /// System status dashboard.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse a `YYYY-MM-DD` argument.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid date '{s}' (expected YYYY-MM-DD): {e}"))
}

/// Parse a typed id argument, naming the kind of id in the error.
pub fn parse_id<T>(s: &str, what: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid {what} id '{s}': {e}"))
}

/// Format an amount in cents as `12.34`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

pub fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    Ok(spinner)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!();
    println!("  {} {}", style("✓").green().bold(), message);
    println!();
}

pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("  {}  {}", style(format!("{label}:")).bold(), value);
}

pub fn print_empty(message: &str, hint: &str) {
    println!();
    println!(
        "  {} {} {}",
        style("i").blue().bold(),
        message,
        style(hint).yellow()
    );
    println!();
}
