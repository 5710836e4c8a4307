// Payment Ledger - one maintenance payment per flat per month per year
//
// The (flat_number, month, year) triple is checked inside the same
// transaction that inserts the row, and the unique index on payments backs
// that check up if two writers ever race past it.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::db::{self, Event, PAYMENT_COLUMNS};
use crate::error::{is_constraint_violation, LedgerError, Result};
use crate::model::{Month, NewPayment, Payment, PaymentFilter};
use crate::registry;

const ACTOR: &str = "payment_ledger";

/// Paid/due classification of a flat for one month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Paid,
    Due,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Due => "Due",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Record a payment for an existing flat and a period it has not paid yet
pub fn record_payment(conn: &mut Connection, new_payment: &NewPayment) -> Result<Payment> {
    let tx = conn.transaction()?;
    let payment = insert_payment(&tx, new_payment)?;
    tx.commit()?;

    info!(
        id = %payment.id,
        flat_number = %payment.flat_number,
        period = %payment.period(),
        amount = payment.amount,
        "payment recorded"
    );
    Ok(payment)
}

/// Validation + referential and period checks + insert, inside the caller's
/// transaction
pub(crate) fn insert_payment(conn: &Connection, new_payment: &NewPayment) -> Result<Payment> {
    new_payment.validate()?;

    let flat_number = new_payment.flat_number.trim();
    if !registry::flat_exists(conn, flat_number)? {
        warn!(flat_number, "rejected payment for unknown flat");
        return Err(LedgerError::UnknownFlat(flat_number.to_string()));
    }

    let duplicate_period = || LedgerError::DuplicatePeriod {
        flat_number: flat_number.to_string(),
        month: new_payment.month,
        year: new_payment.year,
    };

    if find_for_period(conn, flat_number, new_payment.month, new_payment.year)?.is_some() {
        warn!(
            flat_number,
            month = %new_payment.month,
            year = new_payment.year,
            "rejected duplicate payment period"
        );
        return Err(duplicate_period());
    }

    let payment = Payment {
        id: uuid::Uuid::new_v4().to_string(),
        flat_number: flat_number.to_string(),
        month: new_payment.month,
        year: new_payment.year,
        amount: new_payment.amount,
        paid_on: new_payment.paid_on,
        payment_mode: new_payment.payment_mode,
        created_at: Utc::now(),
    };

    match db::insert_payment_row(conn, &payment) {
        Ok(()) => {}
        Err(e) if is_constraint_violation(&e) => return Err(duplicate_period()),
        Err(e) => return Err(e.into()),
    }

    db::insert_event(
        conn,
        &Event::new(
            "payment_recorded",
            "payment",
            &payment.id,
            serde_json::json!({
                "flatNumber": payment.flat_number,
                "month": payment.month,
                "year": payment.year,
                "amount": payment.amount,
                "paymentMode": payment.payment_mode,
            }),
            ACTOR,
        ),
    )?;

    Ok(payment)
}

pub fn find_payment(conn: &Connection, id: &str) -> Result<Payment> {
    conn.query_row(
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
        params![id],
        db::payment_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::payment_not_found(id))
}

/// The payment a flat made for one period, if any
pub fn find_for_period(
    conn: &Connection,
    flat_number: &str,
    month: Month,
    year: i32,
) -> Result<Option<Payment>> {
    let flat_number = flat_number.trim();
    let payment = conn
        .query_row(
            &format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments
                 WHERE flat_number = ?1 AND month = ?2 AND year = ?3"
            ),
            params![flat_number, month.as_str(), year],
            db::payment_from_row,
        )
        .optional()?;
    Ok(payment)
}

/// Payments matching every set field of `filter`, newest `paid_on` first
pub fn list_payments(conn: &Connection, filter: &PaymentFilter) -> Result<Vec<Payment>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(flat_number) = &filter.flat_number {
        values.push(Value::Text(flat_number.trim().to_string()));
        clauses.push(format!("flat_number = ?{}", values.len()));
    }
    if let Some(month) = filter.month {
        values.push(Value::Text(month.as_str().to_string()));
        clauses.push(format!("month = ?{}", values.len()));
    }
    if let Some(year) = filter.year {
        values.push(Value::Integer(year as i64));
        clauses.push(format!("year = ?{}", values.len()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments {where_clause}
         ORDER BY paid_on DESC, created_at DESC"
    ))?;
    let payments = stmt
        .query_map(params_from_iter(values), db::payment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(count = payments.len(), ?filter, "listed payments");
    Ok(payments)
}

/// All payments of one flat, latest period first
pub fn list_for_flat(conn: &Connection, flat_number: &str) -> Result<Vec<Payment>> {
    let mut payments = list_payments(conn, &PaymentFilter::for_flat(flat_number))?;
    payments.sort_by(|a, b| b.year.cmp(&a.year).then(b.month.cmp(&a.month)));
    Ok(payments)
}

/// Delete one payment; payments have no dependents
pub fn remove_payment(conn: &mut Connection, id: &str) -> Result<Payment> {
    let tx = conn.transaction()?;

    let payment = find_payment(&tx, id)?;
    tx.execute("DELETE FROM payments WHERE id = ?1", params![id])?;

    db::insert_event(
        &tx,
        &Event::new(
            "payment_removed",
            "payment",
            id,
            serde_json::json!({
                "flatNumber": payment.flat_number,
                "month": payment.month,
                "year": payment.year,
            }),
            ACTOR,
        ),
    )?;
    tx.commit()?;

    info!(id, flat_number = %payment.flat_number, "payment removed");
    Ok(payment)
}

// ============================================================================
// STATUS DERIVATION
// ============================================================================

/// Paid iff a payment exists for this flat and period; evaluated per call
pub fn payment_status(
    conn: &Connection,
    flat_number: &str,
    month: Month,
    year: i32,
) -> Result<PaymentStatus> {
    let flat_number = flat_number.trim();
    let paid: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM payments WHERE flat_number = ?1 AND month = ?2 AND year = ?3
         )",
        params![flat_number, month.as_str(), year],
        |row| row.get(0),
    )?;

    Ok(if paid {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Due
    })
}

/// Every flat number that has a payment for the given period
pub fn paid_flats(conn: &Connection, month: Month, year: i32) -> Result<HashSet<String>> {
    let mut stmt =
        conn.prepare("SELECT flat_number FROM payments WHERE month = ?1 AND year = ?2")?;
    let paid = stmt
        .query_map(params![month.as_str(), year], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(paid)
}
