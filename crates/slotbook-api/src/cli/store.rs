//! Store CLI commands: add, list, status.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use slotbook_core::repository::store::{StoreDirectory, StoreRepository};
use slotbook_types::id::StoreId;
use slotbook_types::store::{Store, StoreStatus};

use super::{parse_id, print_empty, print_field, print_json, print_success};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum StoreCommand {
    /// Register a new operating store.
    Add {
        /// Unique store name.
        name: String,
    },

    /// List all stores with their working technician count.
    #[command(alias = "ls")]
    List,

    /// Change a store's operating status (operating, closed, shutdown).
    Status {
        /// Store ID.
        store_id: String,
        /// New status.
        status: String,
    },
}

pub async fn handle(state: &AppState, action: StoreCommand, json: bool) -> Result<()> {
    match action {
        StoreCommand::Add { name } => add_store(state, &name, json).await,
        StoreCommand::List => list_stores(state, json).await,
        StoreCommand::Status { store_id, status } => {
            set_status(state, &store_id, &status, json).await
        }
    }
}

async fn add_store(state: &AppState, name: &str, json: bool) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("store name cannot be empty");
    }

    let now = chrono::Utc::now();
    let store = state
        .stores
        .create_store(&Store {
            id: StoreId::new(),
            name: name.to_string(),
            status: StoreStatus::Operating,
            created_at: now,
            updated_at: now,
        })
        .await?;

    if json {
        return print_json(&store);
    }

    print_success("Store added");
    print_field("Name", style(&store.name).cyan());
    print_field("Status", format_status(store.status));
    print_field("ID", style(store.id.to_string()).dim());
    println!();
    println!(
        "  Next: {}",
        style(format!("slotbook staff add {} <name>", store.id)).yellow()
    );
    println!();
    Ok(())
}

async fn list_stores(state: &AppState, json: bool) -> Result<()> {
    let stores = state.stores.list_stores().await?;
    let mut rows = Vec::with_capacity(stores.len());
    for store in stores {
        let working = state.stores.count_working_technicians(&store.id).await?;
        rows.push((store, working));
    }

    if json {
        let value: Vec<_> = rows
            .iter()
            .map(|(store, working)| {
                serde_json::json!({
                    "id": store.id,
                    "name": store.name,
                    "status": store.status,
                    "working_technicians": working,
                })
            })
            .collect();
        return print_json(&value);
    }

    if rows.is_empty() {
        print_empty("No stores yet. Add one with:", "slotbook store add <name>");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Working").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);
    for (store, working) in &rows {
        table.add_row(vec![
            Cell::new(&store.name),
            status_cell(store.status),
            Cell::new(working),
            Cell::new(store.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn set_status(state: &AppState, store_id: &str, status: &str, json: bool) -> Result<()> {
    let store_id: StoreId = parse_id(store_id, "store")?;
    let status: StoreStatus = status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    state.stores.set_store_status(&store_id, status).await?;
    tracing::info!(store_id = %store_id, %status, "store status changed");

    if json {
        return print_json(&serde_json::json!({ "id": store_id, "status": status }));
    }
    print_success(&format!("Store is now {}", format_status(status)));
    Ok(())
}

fn format_status(status: StoreStatus) -> String {
    match status {
        StoreStatus::Operating => format!("{}", style("● operating").green()),
        StoreStatus::Closed => format!("{}", style("○ closed").yellow()),
        StoreStatus::Shutdown => format!("{}", style("◌ shutdown").dim()),
    }
}

fn status_cell(status: StoreStatus) -> Cell {
    match status {
        StoreStatus::Operating => Cell::new("● operating").fg(Color::Green),
        StoreStatus::Closed => Cell::new("○ closed").fg(Color::Yellow),
        StoreStatus::Shutdown => Cell::new("◌ shutdown").fg(Color::DarkGrey),
    }
}
