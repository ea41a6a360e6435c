//! Slot template CLI commands: create, list, update, activate, delete.
//!
//! Rules are given as `--rule mon=09:00-10:00,10:00-11:00`, one flag per
//! weekday.

use anyhow::Result;
use chrono::Weekday;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use slotbook_types::id::{StoreId, TemplateId};
use slotbook_types::template::{
    CreateTemplateRequest, Template, TemplateStatus, TimeRange, UpdateTemplateRequest, WeekdayRule,
};

use super::{parse_id, print_empty, print_field, print_json, print_success};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// Create a weekly template for a store.
    Create {
        /// Store ID.
        store_id: String,
        /// Template name, unique within the store.
        #[arg(long, short)]
        name: String,
        /// Weekday rule, e.g. `mon=09:00-10:00,10:00-11:00`. Repeat per weekday.
        #[arg(long = "rule", short, required = true)]
        rules: Vec<String>,
        /// Make this the store's active template.
        #[arg(long)]
        activate: bool,
    },

    /// List a store's templates.
    #[command(alias = "ls")]
    List {
        /// Store ID.
        store_id: String,
    },

    /// Change a template's name, rules or status. Omitted fields are kept.
    Update {
        /// Template ID.
        template_id: String,
        #[arg(long, short)]
        name: Option<String>,
        /// Replacement weekday rules. When given, they replace all existing rules.
        #[arg(long = "rule", short)]
        rules: Vec<String>,
        /// New status (active, inactive).
        #[arg(long)]
        status: Option<String>,
    },

    /// Make a template the store's only active template.
    Activate {
        /// Template ID.
        template_id: String,
    },

    /// Delete a template. Slots already generated from it are kept.
    #[command(alias = "rm")]
    Delete {
        /// Template ID.
        template_id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        force: bool,
    },
}

pub async fn handle(state: &AppState, action: TemplateCommand, json: bool) -> Result<()> {
    match action {
        TemplateCommand::Create {
            store_id,
            name,
            rules,
            activate,
        } => create(state, &store_id, name, &rules, activate, json).await,
        TemplateCommand::List { store_id } => list(state, &store_id, json).await,
        TemplateCommand::Update {
            template_id,
            name,
            rules,
            status,
        } => update(state, &template_id, name, &rules, status.as_deref(), json).await,
        TemplateCommand::Activate { template_id } => activate(state, &template_id, json).await,
        TemplateCommand::Delete { template_id, force } => {
            delete(state, &template_id, force, json).await
        }
    }
}

/// Parse `mon=09:00-10:00,10:00-11:00` into a weekday rule.
pub fn parse_rule(s: &str) -> Result<WeekdayRule> {
    let (day, ranges) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid rule '{s}': expected <weekday>=HH:MM-HH:MM,..."))?;
    let weekday: Weekday = day
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid weekday '{}'", day.trim()))?;
    let ranges = ranges
        .split(',')
        .filter(|r| !r.trim().is_empty())
        .map(|r| TimeRange::parse(r.trim()).map_err(|e| anyhow::anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;
    Ok(WeekdayRule { weekday, ranges })
}

async fn create(
    state: &AppState,
    store_id: &str,
    name: String,
    rules: &[String],
    activate: bool,
    json: bool,
) -> Result<()> {
    let store_id: StoreId = parse_id(store_id, "store")?;
    let rules = rules
        .iter()
        .map(|r| parse_rule(r))
        .collect::<Result<Vec<_>>>()?;

    let template = state
        .template_service
        .create(CreateTemplateRequest {
            store_id,
            name,
            rules,
            activate,
        })
        .await?;

    if json {
        return print_json(&template);
    }

    print_success("Template created");
    print_field("Name", style(&template.name).cyan());
    print_field("Status", &template.status);
    print_field("ID", style(template.id.to_string()).dim());
    println!();
    print_rules(&template);
    println!();
    Ok(())
}

async fn list(state: &AppState, store_id: &str, json: bool) -> Result<()> {
    let store_id: StoreId = parse_id(store_id, "store")?;
    let templates = state.template_service.list_by_store(&store_id).await?;

    if json {
        return print_json(&templates);
    }

    if templates.is_empty() {
        print_empty(
            "No templates for this store. Create one with:",
            "slotbook template create <store-id> --name <name> --rule mon=09:00-10:00",
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Rules").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);
    for template in &templates {
        let status = if template.is_active() {
            Cell::new("● active").fg(Color::Green)
        } else {
            Cell::new("○ inactive").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&template.name),
            status,
            Cell::new(summarize_rules(&template.rules)),
            Cell::new(template.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn update(
    state: &AppState,
    template_id: &str,
    name: Option<String>,
    rules: &[String],
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    let template_id: TemplateId = parse_id(template_id, "template")?;
    let rules = rules
        .iter()
        .map(|r| parse_rule(r))
        .collect::<Result<Vec<_>>>()?;
    let status = status
        .map(|s| s.parse::<TemplateStatus>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()?;

    let template = state
        .template_service
        .update(
            &template_id,
            UpdateTemplateRequest {
                name,
                rules: (!rules.is_empty()).then_some(rules),
                status,
            },
        )
        .await?;

    if json {
        return print_json(&template);
    }

    print_success("Template updated");
    print_field("Name", style(&template.name).cyan());
    print_field("Status", &template.status);
    println!();
    print_rules(&template);
    println!();
    Ok(())
}

async fn delete(state: &AppState, template_id: &str, force: bool, json: bool) -> Result<()> {
    let template_id: TemplateId = parse_id(template_id, "template")?;
    let template = state.template_service.get(&template_id).await?;

    if !force && !json {
        let prompt = if template.is_active() {
            format!(
                "Delete active template '{}'? The store will stop getting new slots.",
                template.name
            )
        } else {
            format!("Delete template '{}'?", template.name)
        };
        let confirmed = Confirm::new().with_prompt(prompt).default(false).interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let deleted = state.template_service.delete(&template_id).await?;

    if json {
        return print_json(&serde_json::json!({ "deleted": deleted.id }));
    }
    print_success(&format!("Template '{}' deleted", style(&deleted.name).cyan()));
    Ok(())
}

async fn activate(state: &AppState, template_id: &str, json: bool) -> Result<()> {
    let template_id: TemplateId = parse_id(template_id, "template")?;
    let template = state.template_service.activate(&template_id).await?;

    if json {
        return print_json(&template);
    }
    print_success(&format!(
        "Template '{}' is now active",
        style(&template.name).cyan()
    ));
    Ok(())
}

fn summarize_rules(rules: &[WeekdayRule]) -> String {
    rules
        .iter()
        .map(|rule| format!("{} ×{}", rule.weekday, rule.ranges.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_rules(template: &Template) {
    for rule in &template.rules {
        let ranges = rule
            .ranges
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("  ");
        println!("    {} {}  {}", style("•").dim(), rule.weekday, ranges);
    }
}
