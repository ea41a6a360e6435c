//! Daily slot scheduler CLI: manual runs and the long-running `serve` loop.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use console::style;
use tokio_util::sync::CancellationToken;

use slotbook_core::scheduler::RunSummary;

use super::{parse_date, print_field, print_json, spinner};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum SchedulerCommand {
    /// Generate slots for every operating store once.
    RunOnce {
        /// Business date to generate. Defaults to tomorrow (store-local).
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the schedule and the next fire time.
    Next,
}

pub async fn handle(state: &AppState, action: SchedulerCommand, json: bool) -> Result<()> {
    match action {
        SchedulerCommand::RunOnce { date } => run_once(state, date.as_deref(), json).await,
        SchedulerCommand::Next => next(state, json),
    }
}

async fn run_once(state: &AppState, date: Option<&str>, json: bool) -> Result<()> {
    let progress = (!json).then(|| spinner("Generating slots for all stores...")).transpose()?;
    let result = match date {
        Some(date) => state.scheduler.run_for_date(parse_date(date)?).await,
        None => state.scheduler.run_with_timeout().await,
    };
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let summary = result?;
    let drift = state.drift.snapshot();

    if json {
        return print_json(&serde_json::json!({
            "summary": summary,
            "drift": drift,
        }));
    }

    print_summary(&summary);
    if drift.total() > 0 {
        println!(
            "  {} {} lock unit(s) clamped by capacity changes",
            style("!").yellow().bold(),
            drift.lock_clamped
        );
        println!();
    }
    Ok(())
}

fn next(state: &AppState, json: bool) -> Result<()> {
    let now = Utc::now();
    let next = state.scheduler.next_fire_after(now);
    let target = state.scheduler.target_date(now)?;

    if json {
        return print_json(&serde_json::json!({
            "schedule": state.scheduler.schedule(),
            "enabled": state.config.scheduler.enabled,
            "next_run": next,
            "target_date": target,
        }));
    }

    println!();
    print_field("Schedule", style(state.scheduler.schedule()).cyan());
    print_field("Enabled", state.config.scheduler.enabled);
    match next {
        Some(next) => print_field(
            "Next run",
            next.with_timezone(&state.config.local_offset())
                .format("%Y-%m-%d %H:%M:%S %:z"),
        ),
        None => print_field("Next run", style("never").yellow()),
    }
    print_field("Next target", target);
    println!();
    Ok(())
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "  {} Slots for {} generated",
        style("✓").green().bold(),
        style(summary.date).cyan()
    );
    println!();
    print_field("Stores", summary.total);
    print_field("Generated", style(summary.succeeded).green());
    if summary.skipped > 0 {
        print_field("Skipped", style(summary.skipped).yellow());
    }
    if summary.failed > 0 {
        print_field("Failed", style(summary.failed).red());
    }
    print_field("Slots written", summary.slots_written);
    println!();
}

/// Run the scheduler loop until `shutdown` resolves.
pub async fn serve(
    state: &AppState,
    shutdown: impl std::future::Future<Output = ()>,
    json: bool,
) -> Result<()> {
    if !state.config.scheduler.enabled {
        anyhow::bail!("scheduler is disabled in config.toml ([scheduler] enabled = false)");
    }

    let cancel = CancellationToken::new();
    let scheduler = state.scheduler.clone();
    let worker = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    if !json {
        println!(
            "  {} Daily slot scheduler running ({})",
            style("⚡").bold(),
            style(state.scheduler.schedule()).cyan()
        );
        if let Some(next) = state.scheduler.next_fire_after(Utc::now()) {
            println!(
                "  {}",
                style(format!(
                    "Next run at {}",
                    next.with_timezone(&state.config.local_offset())
                        .format("%Y-%m-%d %H:%M %:z")
                ))
                .dim()
            );
        }
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    shutdown.await;
    cancel.cancel();
    worker.await?;

    let drift = state.drift.snapshot();
    if json {
        return print_json(&serde_json::json!({ "stopped": true, "drift": drift }));
    }
    println!("\n  Scheduler stopped.");
    if drift.total() > 0 {
        println!(
            "  {} ledger drift this session: {} compensation, {} book, {} release, {} clamped",
            style("!").yellow().bold(),
            drift.compensation_failed,
            drift.book_failed,
            drift.release_failed,
            drift.lock_clamped
        );
    }
    Ok(())
}
