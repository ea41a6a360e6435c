//! Appointment CLI commands: create, pay, confirm, complete, cancel, show, list.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use slotbook_types::appointment::{
    Appointment, AppointmentStatus, CancelActor, CreateAppointmentRequest,
};
use slotbook_types::id::{AppointmentId, CustomerId, SlotId, StaffId, StoreId};

use super::{format_cents, parse_id, print_empty, print_field, print_json, print_success};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum AppointmentCommand {
    /// Hold one unit of a slot with a pending appointment.
    Create {
        /// Slot ID.
        slot_id: String,
        /// Customer ID. A new one is minted when omitted.
        #[arg(long)]
        customer: Option<String>,
        /// Requested technician.
        #[arg(long)]
        staff: Option<String>,
        /// Service name.
        #[arg(long)]
        service: String,
        /// Service price in cents.
        #[arg(long)]
        price: i64,
        #[arg(long)]
        remark: Option<String>,
    },

    /// Charge the deposit and move the held unit to booked.
    Pay {
        /// Appointment ID.
        id: String,
        /// Payment method recorded on the payment row.
        #[arg(long, default_value = "card")]
        method: String,
    },

    /// Record the customer's arrival and refund the deposit.
    Confirm {
        /// Appointment ID.
        id: String,
    },

    /// Finish the service and free the slot unit.
    Complete {
        /// Appointment ID.
        id: String,
    },

    /// Cancel an appointment, refunding a held deposit.
    Cancel {
        /// Appointment ID.
        id: String,
        /// Who is cancelling (customer, technician, system).
        #[arg(long, default_value = "customer")]
        by: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show one appointment with its payment history.
    Show {
        /// Appointment ID.
        id: String,
    },

    /// List appointments by customer, store or slot.
    #[command(alias = "ls")]
    List(ListArgs),
}

/// Exactly one of `--customer`, `--store` or `--slot`.
#[derive(Args)]
pub struct ListArgs {
    #[arg(
        long,
        required_unless_present_any = ["store", "slot"],
        conflicts_with_all = ["store", "slot"]
    )]
    customer: Option<String>,
    #[arg(long, conflicts_with = "slot")]
    store: Option<String>,
    #[arg(long)]
    slot: Option<String>,
    /// With `--customer`: only live appointments that have not started.
    #[arg(long, requires = "customer")]
    upcoming: bool,
}

pub async fn handle(state: &AppState, action: AppointmentCommand, json: bool) -> Result<()> {
    match action {
        AppointmentCommand::Create {
            slot_id,
            customer,
            staff,
            service,
            price,
            remark,
        } => {
            let request = CreateAppointmentRequest {
                customer_id: match customer {
                    Some(c) => parse_id(&c, "customer")?,
                    None => CustomerId::new(),
                },
                slot_id: parse_id::<SlotId>(&slot_id, "slot")?,
                staff_id: staff
                    .map(|s| parse_id::<StaffId>(&s, "staff"))
                    .transpose()?,
                service_name: service,
                service_price: price,
                remark,
            };
            let appointment = state.appointment_service.create(request).await?;
            report(state, &appointment, "Appointment created, one unit held", json)
        }
        AppointmentCommand::Pay { id, method } => {
            let id = parse_id(&id, "appointment")?;
            let appointment = state.appointment_service.pay_deposit(&id, &method).await?;
            report(state, &appointment, "Deposit paid, unit booked", json)
        }
        AppointmentCommand::Confirm { id } => {
            let id = parse_id(&id, "appointment")?;
            let appointment = state.appointment_service.confirm_arrival(&id).await?;
            report(state, &appointment, "Arrival confirmed, deposit refunded", json)
        }
        AppointmentCommand::Complete { id } => {
            let id = parse_id(&id, "appointment")?;
            let appointment = state.appointment_service.complete(&id).await?;
            report(state, &appointment, "Appointment completed", json)
        }
        AppointmentCommand::Cancel { id, by, reason } => {
            let id = parse_id(&id, "appointment")?;
            let actor: CancelActor = by.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let appointment = state.appointment_service.cancel(&id, actor, reason).await?;
            report(state, &appointment, "Appointment cancelled", json)
        }
        AppointmentCommand::Show { id } => show(state, &id, json).await,
        AppointmentCommand::List(args) => list(state, args, json).await,
    }
}

fn report(state: &AppState, appointment: &Appointment, message: &str, json: bool) -> Result<()> {
    if json {
        return print_json(appointment);
    }
    print_success(message);
    print_details(state, appointment);
    println!();
    Ok(())
}

fn print_details(state: &AppState, appointment: &Appointment) {
    let local = appointment
        .appointment_time
        .with_timezone(&state.config.local_offset());
    print_field("ID", style(appointment.id.to_string()).dim());
    print_field("Status", format_status(appointment.status));
    print_field("Service", &appointment.service_name);
    print_field("Price", format_cents(appointment.service_price));
    print_field("Starts", local.format("%Y-%m-%d %H:%M"));
    print_field("Customer", appointment.customer_id);
    print_field("Slot", appointment.slot_id);

    let deposit = match (appointment.deposit_paid, appointment.deposit_refunded) {
        (false, _) => "unpaid".to_string(),
        (true, false) => "held".to_string(),
        (true, true) => "refunded".to_string(),
    };
    print_field(
        "Deposit",
        format!("{} ({deposit})", format_cents(appointment.deposit_amount)),
    );
    if let Some(actor) = appointment.cancelled_by {
        print_field("Cancelled by", actor);
    }
    if let Some(reason) = &appointment.cancel_reason {
        print_field("Reason", reason);
    }
}

async fn show(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id: AppointmentId = parse_id(id, "appointment")?;
    let appointment = state.appointment_service.get(&id).await?;
    let payments = state.payments.payments_for(&id).await?;
    let refunds = state.payments.refunds_for(&id).await?;

    if json {
        return print_json(&serde_json::json!({
            "appointment": appointment,
            "payments": payments,
            "refunds": refunds,
        }));
    }

    println!();
    print_details(state, &appointment);
    if !payments.is_empty() || !refunds.is_empty() {
        println!();
        println!("  {}", style("── Payments ──").dim());
        for payment in &payments {
            println!(
                "  {} {} {} {} {}",
                style("+").green(),
                payment.order_no,
                payment.payment_type,
                format_cents(payment.amount),
                style(payment.status).dim()
            );
        }
        for refund in &refunds {
            println!(
                "  {} {} {} {} {}",
                style("-").yellow(),
                refund.refund_no,
                refund.refund_type,
                format_cents(refund.amount),
                style(refund.status).dim()
            );
        }
    }
    println!();
    Ok(())
}

async fn list(state: &AppState, args: ListArgs, json: bool) -> Result<()> {
    let service = &state.appointment_service;
    let appointments = if let Some(customer) = &args.customer {
        let customer: CustomerId = parse_id(customer, "customer")?;
        if args.upcoming {
            service.list_upcoming_by_customer(&customer).await?
        } else {
            service.list_by_customer(&customer).await?
        }
    } else if let Some(store) = &args.store {
        let store: StoreId = parse_id(store, "store")?;
        service.list_by_store(&store).await?
    } else if let Some(slot) = &args.slot {
        let slot: SlotId = parse_id(slot, "slot")?;
        service.list_by_slot(&slot).await?
    } else {
        anyhow::bail!("one of --customer, --store or --slot is required");
    };

    if json {
        return print_json(&appointments);
    }

    if appointments.is_empty() {
        print_empty("No appointments found.", "");
        return Ok(());
    }

    let offset = state.config.local_offset();
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Starts").fg(Color::White),
        Cell::new("Service").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Deposit").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);
    for appointment in &appointments {
        let deposit = if appointment.holds_deposit() {
            "held"
        } else if appointment.deposit_refunded {
            "refunded"
        } else {
            "-"
        };
        table.add_row(vec![
            Cell::new(
                appointment
                    .appointment_time
                    .with_timezone(&offset)
                    .format("%Y-%m-%d %H:%M"),
            ),
            Cell::new(&appointment.service_name),
            status_cell(appointment.status),
            Cell::new(deposit),
            Cell::new(appointment.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn format_status(status: AppointmentStatus) -> String {
    match status {
        AppointmentStatus::Pending => format!("{}", style("pending").yellow()),
        AppointmentStatus::Paid => format!("{}", style("paid").cyan()),
        AppointmentStatus::Confirmed => format!("{}", style("confirmed").green()),
        AppointmentStatus::Completed => format!("{}", style("completed").green().bold()),
        AppointmentStatus::Cancelled => format!("{}", style("cancelled").dim()),
    }
}

fn status_cell(status: AppointmentStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        AppointmentStatus::Pending => cell.fg(Color::Yellow),
        AppointmentStatus::Paid => cell.fg(Color::Cyan),
        AppointmentStatus::Confirmed | AppointmentStatus::Completed => cell.fg(Color::Green),
        AppointmentStatus::Cancelled => cell.fg(Color::DarkGrey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_list_requires_exactly_one_filter() {
        assert!(Cli::try_parse_from(["slotbook", "appointment", "list"]).is_err());
        assert!(
            Cli::try_parse_from([
                "slotbook", "appointment", "list", "--store", "a", "--slot", "b"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["slotbook", "appointment", "list", "--slot", "b"]).is_ok());
    }

    #[test]
    fn test_upcoming_requires_customer() {
        assert!(
            Cli::try_parse_from(["slotbook", "appointment", "list", "--store", "a", "--upcoming"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "slotbook", "appt", "ls", "--customer", "c", "--upcoming",
        ])
        .unwrap();
        let Commands::Appointment {
            action: AppointmentCommand::List(args),
        } = cli.command
        else {
            panic!("expected appointment list");
        };
        assert!(args.upcoming);
    }

    #[test]
    fn test_cancel_defaults_to_customer() {
        let cli = Cli::try_parse_from(["slotbook", "appointment", "cancel", "x"]).unwrap();
        let Commands::Appointment {
            action: AppointmentCommand::Cancel { by, .. },
        } = cli.command
        else {
            panic!("expected appointment cancel");
        };
        assert_eq!(by, "customer");
    }
}
