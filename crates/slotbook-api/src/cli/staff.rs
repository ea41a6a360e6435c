//! Technician CLI commands: add, shift, remove.
//!
//! Every headcount change recalculates capacity on the store's available
//! slots from today through the recalculation horizon.

use anyhow::Result;
use clap::Subcommand;
use console::style;
use dialoguer::Confirm;

use slotbook_core::repository::slot::CapacityRecalc;
use slotbook_core::repository::store::{StoreDirectory, StoreRepository};
use slotbook_types::id::{StaffId, StoreId};
use slotbook_types::slot::StaffPurge;
use slotbook_types::store::{StaffMember, TECHNICIAN_ROLE, WorkStatus};

use super::{parse_id, print_field, print_json, print_success};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum StaffCommand {
    /// Add a technician to a store.
    Add {
        /// Store ID.
        store_id: String,
        /// Display name.
        name: String,
        /// Initial work status (working, rest, offline).
        #[arg(long, default_value = "working")]
        status: String,
    },

    /// Change a technician's work status and resize the store's slots.
    Shift {
        /// Staff ID.
        staff_id: String,
        /// New work status (working, rest, offline).
        status: String,
    },

    /// Take a technician offline and purge their unused pinned slots.
    #[command(alias = "rm")]
    Remove {
        /// Staff ID.
        staff_id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        force: bool,
    },
}

pub async fn handle(state: &AppState, action: StaffCommand, json: bool) -> Result<()> {
    match action {
        StaffCommand::Add {
            store_id,
            name,
            status,
        } => add_staff(state, &store_id, &name, &status, json).await,
        StaffCommand::Shift { staff_id, status } => shift(state, &staff_id, &status, json).await,
        StaffCommand::Remove { staff_id, force } => remove(state, &staff_id, force, json).await,
    }
}

fn parse_work_status(s: &str) -> Result<WorkStatus> {
    s.parse().map_err(|e: String| anyhow::anyhow!(e))
}

async fn add_staff(
    state: &AppState,
    store_id: &str,
    name: &str,
    status: &str,
    json: bool,
) -> Result<()> {
    let store_id: StoreId = parse_id(store_id, "store")?;
    let work_status = parse_work_status(status)?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("staff name cannot be empty");
    }

    let now = chrono::Utc::now();
    let staff = state
        .stores
        .create_staff(&StaffMember {
            id: StaffId::new(),
            store_id,
            display_name: name.to_string(),
            role: TECHNICIAN_ROLE.to_string(),
            work_status,
            created_at: now,
            updated_at: now,
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to add staff to store {store_id}: {e}"))?;

    let recalc = if work_status == WorkStatus::Working {
        Some(resize_store(state, &store_id).await?)
    } else {
        None
    };

    if json {
        return print_json(&serde_json::json!({
            "staff": staff,
            "recalculated": recalc.map(|r| r.updated),
        }));
    }

    print_success("Technician added");
    print_field("Name", style(&staff.display_name).cyan());
    print_field("Status", staff.work_status);
    print_field("ID", style(staff.id.to_string()).dim());
    if let Some(recalc) = recalc {
        print_recalc(&recalc);
    }
    println!();
    Ok(())
}

async fn shift(state: &AppState, staff_id: &str, status: &str, json: bool) -> Result<()> {
    let staff_id: StaffId = parse_id(staff_id, "staff")?;
    let work_status = parse_work_status(status)?;
    let staff = load_staff(state, &staff_id).await?;

    state.stores.set_work_status(&staff_id, work_status).await?;
    tracing::info!(staff_id = %staff_id, from = %staff.work_status, to = %work_status, "work status changed");
    let recalc = resize_store(state, &staff.store_id).await?;

    if json {
        return print_json(&serde_json::json!({
            "staff_id": staff_id,
            "work_status": work_status,
            "recalculated": recalc.updated,
            "clamped_locks": recalc.clamped_locks,
        }));
    }

    print_success(&format!(
        "{} is now {}",
        style(&staff.display_name).cyan(),
        work_status
    ));
    print_recalc(&recalc);
    println!();
    Ok(())
}

async fn remove(state: &AppState, staff_id: &str, force: bool, json: bool) -> Result<()> {
    let staff_id: StaffId = parse_id(staff_id, "staff")?;
    let staff = load_staff(state, &staff_id).await?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Take '{}' offline and delete their unused slots?",
                staff.display_name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.stores.set_work_status(&staff_id, WorkStatus::Offline).await?;
    let purge = state
        .expander
        .release_staff_slots(&staff_id, state.local_today())
        .await?;
    let recalc = resize_store(state, &staff.store_id).await?;

    if json {
        return print_json(&serde_json::json!({
            "staff_id": staff_id,
            "deleted_slots": purge.deleted,
            "retained_slots": purge.retained,
            "recalculated": recalc.updated,
        }));
    }

    print_success(&format!("{} removed", style(&staff.display_name).cyan()));
    print_purge(&purge);
    print_recalc(&recalc);
    println!();
    Ok(())
}

async fn load_staff(state: &AppState, staff_id: &StaffId) -> Result<StaffMember> {
    state
        .stores
        .get_staff(staff_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("staff member {staff_id} not found"))
}

/// Recalculate the store's capacity from today using the current headcount.
async fn resize_store(state: &AppState, store_id: &StoreId) -> Result<CapacityRecalc> {
    let headcount = state.stores.count_working_technicians(store_id).await?;
    Ok(state
        .expander
        .recalculate_capacity(store_id, state.local_today(), headcount)
        .await?)
}

fn print_recalc(recalc: &CapacityRecalc) {
    print_field("Slots resized", recalc.updated);
    if recalc.clamped_locks > 0 {
        println!(
            "  {} {} held lock(s) dropped by the smaller capacity",
            style("!").yellow().bold(),
            recalc.clamped_locks
        );
    }
}

fn print_purge(purge: &StaffPurge) {
    print_field("Slots deleted", purge.deleted);
    if purge.retained > 0 {
        println!(
            "  {} {} slot(s) still hold appointments and were kept",
            style("!").yellow().bold(),
            purge.retained
        );
    }
}
