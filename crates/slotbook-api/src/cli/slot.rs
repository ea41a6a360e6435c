//! Slot CLI commands: generate, list, recalc.

use anyhow::Result;
use chrono::FixedOffset;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use slotbook_core::repository::store::StoreDirectory;
use slotbook_types::id::StoreId;
use slotbook_types::slot::{Slot, SlotStatus};

use super::{parse_date, parse_id, print_empty, print_field, print_json, print_success, spinner};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum SlotCommand {
    /// Expand the store's active template into slots for a date range.
    #[command(alias = "gen")]
    Generate {
        /// Store ID.
        store_id: String,
        /// First date (YYYY-MM-DD).
        #[arg(long)]
        from: String,
        /// Last date, inclusive. Defaults to `--from`.
        #[arg(long)]
        to: Option<String>,
        /// Capacity per slot. Defaults to the store's working technicians.
        #[arg(long)]
        headcount: Option<i32>,
    },

    /// List a store's slots.
    #[command(alias = "ls")]
    List {
        /// Store ID.
        store_id: String,
        /// Date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
        /// List through this date, inclusive.
        #[arg(long)]
        to: Option<String>,
        /// Only slots a customer can still book.
        #[arg(long, conflicts_with = "to")]
        bookable: bool,
    },

    /// Reset capacity on available slots to the current headcount.
    Recalc {
        /// Store ID.
        store_id: String,
        /// First date to resize. Defaults to today.
        #[arg(long)]
        from: Option<String>,
        /// New capacity. Defaults to the store's working technicians.
        #[arg(long)]
        headcount: Option<i32>,
    },
}

pub async fn handle(state: &AppState, action: SlotCommand, json: bool) -> Result<()> {
    match action {
        SlotCommand::Generate {
            store_id,
            from,
            to,
            headcount,
        } => generate(state, &store_id, &from, to.as_deref(), headcount, json).await,
        SlotCommand::List {
            store_id,
            date,
            to,
            bookable,
        } => list(state, &store_id, date.as_deref(), to.as_deref(), bookable, json).await,
        SlotCommand::Recalc {
            store_id,
            from,
            headcount,
        } => recalc(state, &store_id, from.as_deref(), headcount, json).await,
    }
}

async fn headcount_or_working(
    state: &AppState,
    store_id: &StoreId,
    headcount: Option<i32>,
) -> Result<i32> {
    match headcount {
        Some(n) => Ok(n),
        None => Ok(state.stores.count_working_technicians(store_id).await?),
    }
}

async fn generate(
    state: &AppState,
    store_id: &str,
    from: &str,
    to: Option<&str>,
    headcount: Option<i32>,
    json: bool,
) -> Result<()> {
    let store_id: StoreId = parse_id(store_id, "store")?;
    let start = parse_date(from)?;
    let end = match to {
        Some(to) => parse_date(to)?,
        None => start,
    };
    let headcount = headcount_or_working(state, &store_id, headcount).await?;

    let progress = (!json).then(|| spinner("Generating slots...")).transpose()?;
    let result = state
        .expander
        .generate_slots(&store_id, start, end, headcount)
        .await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let written = result?;

    if json {
        return print_json(&serde_json::json!({
            "store_id": store_id,
            "start": start,
            "end": end,
            "headcount": headcount,
            "written": written,
        }));
    }

    print_success(&format!("{written} slot(s) written"));
    print_field("Range", format!("{start} → {end}"));
    print_field("Capacity", headcount);
    println!();
    Ok(())
}

async fn list(
    state: &AppState,
    store_id: &str,
    date: Option<&str>,
    to: Option<&str>,
    bookable: bool,
    json: bool,
) -> Result<()> {
    let store_id: StoreId = parse_id(store_id, "store")?;
    let start = match date {
        Some(date) => parse_date(date)?,
        None => state.local_today(),
    };

    let slots = match (bookable, to) {
        (true, _) => state.ledger.list_bookable(&store_id, start).await?,
        (false, Some(to)) => {
            state
                .ledger
                .list_by_store_range(&store_id, start, parse_date(to)?)
                .await?
        }
        (false, None) => state.ledger.list_by_store_date(&store_id, start).await?,
    };

    if json {
        return print_json(&slots);
    }

    if slots.is_empty() {
        print_empty(
            "No slots found. Generate them with:",
            "slotbook slots generate <store-id> --from <date>",
        );
        return Ok(());
    }

    let offset = state.config.local_offset();
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Date").fg(Color::White),
        Cell::new("Time").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Cap").fg(Color::White),
        Cell::new("Locked").fg(Color::White),
        Cell::new("Booked").fg(Color::White),
        Cell::new("Free").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);
    for slot in &slots {
        table.add_row(vec![
            Cell::new(slot.date),
            Cell::new(format_window(slot, offset)),
            status_cell(slot.status),
            Cell::new(slot.capacity),
            Cell::new(slot.locked_count),
            Cell::new(slot.booked_count),
            Cell::new(slot.remaining()),
            Cell::new(slot.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn recalc(
    state: &AppState,
    store_id: &str,
    from: Option<&str>,
    headcount: Option<i32>,
    json: bool,
) -> Result<()> {
    let store_id: StoreId = parse_id(store_id, "store")?;
    let from = match from {
        Some(from) => parse_date(from)?,
        None => state.local_today(),
    };
    let headcount = headcount_or_working(state, &store_id, headcount).await?;
    let result = state
        .expander
        .recalculate_capacity(&store_id, from, headcount)
        .await?;

    if json {
        return print_json(&serde_json::json!({
            "store_id": store_id,
            "from": from,
            "headcount": headcount,
            "updated": result.updated,
            "clamped_locks": result.clamped_locks,
        }));
    }

    print_success(&format!("{} slot(s) resized to {headcount}", result.updated));
    if result.clamped_locks > 0 {
        println!(
            "  {} {} held lock(s) dropped",
            style("!").yellow().bold(),
            result.clamped_locks
        );
        println!();
    }
    Ok(())
}

/// Slot window in store-local wall-clock time.
pub fn format_window(slot: &Slot, offset: FixedOffset) -> String {
    format!(
        "{}-{}",
        slot.start_time.with_timezone(&offset).format("%H:%M"),
        slot.end_time.with_timezone(&offset).format("%H:%M")
    )
}

fn status_cell(status: SlotStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        SlotStatus::Available => cell.fg(Color::Green),
        SlotStatus::Locked => cell.fg(Color::Yellow),
        SlotStatus::Booked => cell.fg(Color::Red),
        SlotStatus::Completed | SlotStatus::Cancelled => cell.fg(Color::DarkGrey),
    }
}
