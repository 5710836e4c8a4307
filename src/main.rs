use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use flat_ledger::{
    init_tracing, load_flats_csv, load_payments_csv, AppConfig, FlatOrder, FlatUpdate,
    ImportSummary, Month, NewFlat, NewPayment, PaymentFilter, PaymentRequest, Period, Store,
};

#[derive(Parser)]
#[command(name = "flat-ledger", version, about = "Maintenance-fee ledger for apartment flats")]
struct Cli {
    /// SQLite database (overrides FLAT_LEDGER_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Replace all data with the sample flats and payments
    Seed,
    /// Register flats from a CSV (flatNumber,ownerName,contact)
    ImportFlats { csv: PathBuf },
    /// Record payments from a CSV (flatNumber,month,year,amount,paidOn,paymentMode)
    ImportPayments { csv: PathBuf },
    /// List flats, sorted by flat number
    Flats,
    /// Register one flat
    AddFlat {
        flat_number: String,
        owner_name: String,
        contact: String,
    },
    /// Edit the owner or contact of a flat
    UpdateFlat {
        flat_number: String,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        contact: Option<String>,
    },
    /// Remove a flat and all of its payments
    RemoveFlat { flat_number: String },
    /// Record a payment
    Pay {
        flat_number: String,
        month: Month,
        year: i32,
        #[arg(long)]
        amount: Option<f64>,
        /// Payment date, YYYY-MM-DD (default: today)
        #[arg(long)]
        paid_on: Option<String>,
        #[arg(long, default_value = "Cash")]
        mode: String,
    },
    /// Delete a payment by id
    RemovePayment { id: String },
    /// List payments, optionally filtered
    Payments {
        #[arg(long)]
        flat: Option<String>,
        #[arg(long)]
        month: Option<Month>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Paid/due counts per connectivity group (default: current month)
    Groups {
        #[arg(long)]
        month: Option<Month>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Revenue report for a year or a single month
    Report {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: Option<Month>,
    },
    /// Expected vs collected revenue for a year or a single month
    Dues {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: Option<Month>,
        /// Expected fee per flat per month (overrides FLAT_LEDGER_EXPECTED_FEE)
        #[arg(long)]
        fee: Option<f64>,
    },
    /// Details, payments and neighbourhood of one flat
    Flat { flat_number: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    init_tracing(config.log_json);

    let store = Store::from_config(&config)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let today = Utc::now().date_naive();

    match cli.command {
        Command::Init => {
            println!("✓ Database ready: {}", config.database_path.display());
        }
        Command::Seed => {
            let summary = store.seed_sample_data()?;
            println!(
                "✓ Seeded {} flats and {} payments",
                summary.flats, summary.payments
            );
        }
        Command::ImportFlats { csv } => {
            let flats = load_flats_csv(&csv)?;
            print_import("flats", &store.import_flats(&flats));
        }
        Command::ImportPayments { csv } => {
            let payments = load_payments_csv(&csv)?;
            print_import("payments", &store.import_payments(payments));
        }
        Command::Flats => {
            let flats = store.list_flats(FlatOrder::ByIdentifier)?;
            println!("{:<8} {:<24} {}", "Flat", "Owner", "Contact");
            for flat in &flats {
                println!("{:<8} {:<24} {}", flat.flat_number, flat.owner_name, flat.contact);
            }
            println!("\n{} flats", flats.len());
        }
        Command::AddFlat {
            flat_number,
            owner_name,
            contact,
        } => {
            let flat = store.register_flat(&NewFlat::new(&flat_number, &owner_name, &contact))?;
            println!("✓ Registered flat {}", flat.flat_number);
        }
        Command::UpdateFlat {
            flat_number,
            owner,
            contact,
        } => {
            let flat = store.update_flat(
                &flat_number,
                &FlatUpdate {
                    owner_name: owner,
                    contact,
                },
            )?;
            println!(
                "✓ Updated flat {}: {} ({})",
                flat.flat_number, flat.owner_name, flat.contact
            );
        }
        Command::RemoveFlat { flat_number } => {
            let removed = store.remove_flat(&flat_number)?;
            println!(
                "✓ Removed flat {} and {} payments",
                removed.flat.flat_number, removed.payments_removed
            );
        }
        Command::Pay {
            flat_number,
            month,
            year,
            amount,
            paid_on,
            mode,
        } => {
            let request = PaymentRequest {
                flat_number,
                month: month.to_string(),
                year,
                amount: amount.unwrap_or(config.expected_fee),
                paid_on: paid_on.unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
                payment_mode: mode,
            };
            let payment = store.record_payment(&NewPayment::try_from(request)?)?;
            println!(
                "✓ Recorded {} for flat {} ({} {}), id {}",
                payment.amount, payment.flat_number, payment.month, payment.year, payment.id
            );
        }
        Command::RemovePayment { id } => {
            let payment = store.remove_payment(&id)?;
            println!(
                "✓ Removed payment for flat {} ({} {})",
                payment.flat_number, payment.month, payment.year
            );
        }
        Command::Payments { flat, month, year } => {
            let payments = store.list_payments(&PaymentFilter {
                flat_number: flat,
                month,
                year,
            })?;
            println!(
                "{:<8} {:<10} {:<6} {:>10} {:<12} {}",
                "Flat", "Month", "Year", "Amount", "Paid on", "Mode"
            );
            for p in &payments {
                println!(
                    "{:<8} {:<10} {:<6} {:>10.2} {:<12} {}",
                    p.flat_number, p.month, p.year, p.amount, p.paid_on, p.payment_mode
                );
            }
            println!("\n{} payments", payments.len());
        }
        Command::Groups { month, year } => {
            let month = month.unwrap_or_else(|| Month::of(today));
            let year = year.unwrap_or_else(|| today.year());
            println!("Groups for {month} {year}");
            for (idx, group) in store.group_statistics(month, year)?.iter().enumerate() {
                println!(
                    "  Group {}: [{}]  paid {} / due {}",
                    idx + 1,
                    group.members.join(", "),
                    group.paid,
                    group.due
                );
            }
        }
        Command::Report { year, month } => {
            let period = period(year, month);
            let report = store.period_report(period)?;
            println!("Report for {}", report.period);
            println!("  Total revenue:   {:.2}", report.total_revenue);
            println!("  Total payments:  {}", report.total_payments);
            println!("  Average payment: {:.2}", report.average_payment);
            println!("  By payment mode:");
            for (mode, count) in &report.mode_distribution {
                println!("    {mode:<14} {count}");
            }
            if let Some(breakdown) = &report.monthly_breakdown {
                println!("  By month:");
                for row in breakdown {
                    println!("    {:<10} {:>10.2} ({})", row.month, row.revenue, row.count);
                }
            }
        }
        Command::Dues { year, month, fee } => {
            let fee = fee.unwrap_or(config.expected_fee);
            let dues = store.outstanding_dues(period(year, month), fee, today)?;
            println!("Outstanding dues for {}", dues.period);
            println!(
                "  Expected:    {:.2} ({} flats x {:.2} x {} months)",
                dues.expected_revenue,
                dues.flat_count,
                dues.expected_fee_per_flat,
                dues.months_elapsed
            );
            println!("  Collected:   {:.2}", dues.collected_revenue);
            println!("  Outstanding: {:.2}", dues.outstanding);
        }
        Command::Flat { flat_number } => {
            print_flat_summary(&store, &flat_number, today)?;
        }
    }

    Ok(())
}

fn period(year: i32, month: Option<Month>) -> Period {
    Period { year, month }
}

fn print_import(what: &str, summary: &ImportSummary) {
    println!("✓ Inserted: {} {}", summary.inserted, what);
    println!("✓ Rejected: {}", summary.rejected.len());
    for rejection in &summary.rejected {
        println!("    row {}: {}", rejection.row, rejection.reason);
    }
}

fn print_flat_summary(store: &Store, flat_number: &str, today: NaiveDate) -> Result<()> {
    let summary = store.flat_summary(flat_number, today)?;

    println!("Flat {}", summary.flat.flat_number);
    println!("  Owner:   {}", summary.flat.owner_name);
    println!("  Contact: {}", summary.flat.contact);
    println!("  {}: {}", summary.period, summary.status);
    println!(
        "  This year: {} paid, {} pending, {:.2} collected",
        summary.months_paid_this_year,
        summary.months_pending_this_year,
        summary.total_paid_this_year
    );
    println!(
        "  Connected flats: [{}]  paid {} / due {}",
        summary.connected_flats.join(", "),
        summary.neighbourhood.paid,
        summary.neighbourhood.due
    );
    println!("  Payments ({} total, {:.2}):", summary.payments.len(), summary.total_paid);
    for p in &summary.payments {
        println!(
            "    {} {}  {:.2}  {}  {}",
            p.month, p.year, p.amount, p.paid_on, p.payment_mode
        );
    }

    Ok(())
}
