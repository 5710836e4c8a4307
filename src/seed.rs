// Sample data set - eight flats over three floors, eight payments for 2024

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::grouping::Adjacency;
use crate::ledger;
use crate::model::{Month, NewFlat, NewPayment, PaymentMode};
use crate::registry;

pub const SAMPLE_FEE: f64 = 1500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub flats: usize,
    pub payments: usize,
}

pub fn sample_flats() -> Vec<NewFlat> {
    [
        ("101", "Mr. Rajesh Kumar", "9876543210"),
        ("102", "Mrs. Priya Sharma", "9876543211"),
        ("103", "Mr. Amit Singh", "9876543212"),
        ("201", "Dr. Sunita Gupta", "9876543213"),
        ("202", "Mr. Vikash Jain", "9876543214"),
        ("203", "Mrs. Meera Patel", "9876543215"),
        ("301", "Mr. Arjun Reddy", "9876543216"),
        ("302", "Mrs. Kavita Nair", "9876543217"),
    ]
    .into_iter()
    .map(|(number, owner, contact)| NewFlat::new(number, owner, contact))
    .collect()
}

pub fn sample_payments() -> Result<Vec<NewPayment>> {
    [
        ("101", Month::January, (1, 5), PaymentMode::Upi),
        ("101", Month::February, (2, 3), PaymentMode::Cash),
        ("102", Month::January, (1, 10), PaymentMode::BankTransfer),
        ("102", Month::March, (3, 15), PaymentMode::Upi),
        ("201", Month::January, (1, 8), PaymentMode::Cash),
        ("203", Month::February, (2, 20), PaymentMode::Upi),
        ("301", Month::January, (1, 12), PaymentMode::BankTransfer),
        ("302", Month::March, (3, 25), PaymentMode::Cash),
    ]
    .into_iter()
    .map(|(flat, month, (m, d), mode)| -> Result<NewPayment> {
        let paid_on = NaiveDate::from_ymd_opt(2024, m, d)
            .ok_or_else(|| LedgerError::validation(format!("invalid sample date 2024-{m}-{d}")))?;
        Ok(NewPayment {
            flat_number: flat.to_string(),
            month,
            year: 2024,
            amount: SAMPLE_FEE,
            paid_on,
            payment_mode: mode,
        })
    })
    .collect()
}

/// Floors form the groups: 101-102-103, 201-202-203, 301-302
pub fn sample_adjacency() -> Result<Adjacency> {
    Adjacency::from_pairs([
        ("101", vec!["102"]),
        ("102", vec!["101", "103"]),
        ("103", vec!["102"]),
        ("201", vec!["202"]),
        ("202", vec!["201", "203"]),
        ("203", vec!["202"]),
        ("301", vec!["302"]),
        ("302", vec!["301"]),
    ])
}

/// Replace everything in the store with the sample set, atomically
pub fn seed_sample_data(conn: &mut Connection) -> Result<SeedSummary> {
    let flats = sample_flats();
    let payments = sample_payments()?;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM payments", [])?;
    tx.execute("DELETE FROM flats", [])?;

    for flat in &flats {
        registry::insert_flat(&tx, flat)?;
    }
    for payment in &payments {
        ledger::insert_payment(&tx, payment)?;
    }
    tx.commit()?;

    let summary = SeedSummary {
        flats: flats.len(),
        payments: payments.len(),
    };
    info!(flats = summary.flats, payments = summary.payments, "sample data seeded");
    Ok(summary)
}
