//! System status dashboard command.

use anyhow::Result;
use console::style;
use sqlx::Row;

use crate::state::AppState;

struct Counts {
    stores: i64,
    operating: i64,
    working: i64,
    active_templates: i64,
    slots: i64,
    open_units: i64,
    locked: i64,
    booked: i64,
    pending: i64,
    paid: i64,
    confirmed: i64,
}

async fn gather(state: &AppState) -> Result<Counts> {
    let today = state.local_today().format("%Y-%m-%d").to_string();
    let row = sqlx::query(
        "SELECT
            (SELECT COUNT(*) FROM stores) AS stores,
            (SELECT COUNT(*) FROM stores WHERE status = 'operating') AS operating,
            (SELECT COUNT(*) FROM staff WHERE work_status = 'working') AS working,
            (SELECT COUNT(*) FROM slot_templates WHERE status = 'active') AS active_templates,
            (SELECT COUNT(*) FROM slots WHERE date >= ?1) AS slots,
            (SELECT COALESCE(SUM(capacity - locked_count - booked_count), 0)
               FROM slots WHERE date >= ?1 AND status IN ('available', 'locked')) AS open_units,
            (SELECT COALESCE(SUM(locked_count), 0) FROM slots WHERE date >= ?1) AS locked,
            (SELECT COALESCE(SUM(booked_count), 0) FROM slots WHERE date >= ?1) AS booked,
            (SELECT COUNT(*) FROM appointments WHERE status = 'pending') AS pending,
            (SELECT COUNT(*) FROM appointments WHERE status = 'paid') AS paid,
            (SELECT COUNT(*) FROM appointments WHERE status = 'confirmed') AS confirmed",
    )
    .bind(&today)
    .fetch_one(&state.db_pool.reader)
    .await?;

    Ok(Counts {
        stores: row.try_get("stores")?,
        operating: row.try_get("operating")?,
        working: row.try_get("working")?,
        active_templates: row.try_get("active_templates")?,
        slots: row.try_get("slots")?,
        open_units: row.try_get("open_units")?,
        locked: row.try_get("locked")?,
        booked: row.try_get("booked")?,
        pending: row.try_get("pending")?,
        paid: row.try_get("paid")?,
        confirmed: row.try_get("confirmed")?,
    })
}

/// Display system status dashboard.
///
/// Shows the store directory, upcoming slot capacity, live appointments and
/// the drift counters of this process.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let counts = gather(state).await?;
    let drift = state.drift.snapshot();
    let next_run = state.scheduler.next_fire_after(chrono::Utc::now());

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "stores": {
                "total": counts.stores,
                "operating": counts.operating,
                "working_technicians": counts.working,
                "active_templates": counts.active_templates,
            },
            "slots_from_today": {
                "total": counts.slots,
                "open_units": counts.open_units,
                "locked": counts.locked,
                "booked": counts.booked,
            },
            "appointments": {
                "pending": counts.pending,
                "paid": counts.paid,
                "confirmed": counts.confirmed,
            },
            "scheduler": {
                "enabled": state.config.scheduler.enabled,
                "schedule": state.scheduler.schedule(),
                "next_run": next_run,
            },
            "drift": drift,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} slotbook v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Stores ──").dim());
    println!("  Total:      {}", style(counts.stores).bold());
    println!("  Operating:  {}", style(counts.operating).green());
    println!("  Working:    {} technician(s)", counts.working);
    println!("  Templates:  {} active", counts.active_templates);
    println!();

    println!("  {}", style("── Slots from today ──").dim());
    println!("  Slots:      {}", style(counts.slots).bold());
    println!("  Open:       {}", style(counts.open_units).green());
    println!("  Locked:     {}", style(counts.locked).yellow());
    println!("  Booked:     {}", counts.booked);
    println!();

    println!("  {}", style("── Appointments ──").dim());
    println!("  Pending:    {}", style(counts.pending).yellow());
    println!("  Paid:       {}", style(counts.paid).cyan());
    println!("  Confirmed:  {}", style(counts.confirmed).green());
    println!();

    println!("  {}", style("── Scheduler ──").dim());
    let enabled = if state.config.scheduler.enabled {
        style("enabled").green()
    } else {
        style("disabled").yellow()
    };
    println!("  Schedule:   {} ({enabled})", state.scheduler.schedule());
    if let Some(next) = next_run {
        println!(
            "  Next run:   {}",
            next.with_timezone(&state.config.local_offset())
                .format("%Y-%m-%d %H:%M %:z")
        );
    }
    println!();

    if drift.total() > 0 {
        println!("  {}", style("── Ledger drift ──").dim());
        println!("  Compensation: {}", drift.compensation_failed);
        println!("  Book:         {}", drift.book_failed);
        println!("  Release:      {}", drift.release_failed);
        println!("  Clamped:      {}", drift.lock_clamped);
        println!();
    }

    println!(
        "  {}",
        style(format!("Data: {}", state.data_dir.display())).dim()
    );
    println!();

    Ok(())
}
