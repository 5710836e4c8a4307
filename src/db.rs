use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::model::{Flat, Month, NewFlat, Payment, PaymentMode, PaymentRequest};

pub(crate) const FLAT_COLUMNS: &str = "flat_number, owner_name, contact, created_at, updated_at";

pub(crate) const PAYMENT_COLUMNS: &str =
    "id, flat_number, month, year, amount, paid_on, payment_mode, created_at";

/// Event for audit trail - every mutation of a flat or payment leaves one
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    // ==========================================================================
    // Flats
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS flats (
            flat_number TEXT PRIMARY KEY NOT NULL,
            owner_name TEXT NOT NULL,
            contact TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Payments - one per (flat_number, month, year)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY NOT NULL,
            flat_number TEXT NOT NULL
                REFERENCES flats(flat_number) ON DELETE CASCADE,
            month TEXT NOT NULL,
            year INTEGER NOT NULL,
            amount REAL NOT NULL CHECK (amount >= 0),
            paid_on TEXT NOT NULL,
            payment_mode TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_period
         ON payments(flat_number, month, year)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_year ON payments(year, month)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_column<T, E>(
    idx: usize,
    raw: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    parse(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_column(idx, &raw, |s| {
        DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
    })
}

/// Map a row selected with [`FLAT_COLUMNS`]
pub(crate) fn flat_from_row(row: &Row<'_>) -> rusqlite::Result<Flat> {
    Ok(Flat {
        flat_number: row.get(0)?,
        owner_name: row.get(1)?,
        contact: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

/// Map a row selected with [`PAYMENT_COLUMNS`]
pub(crate) fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    let month: String = row.get(2)?;
    let paid_on: String = row.get(5)?;
    let payment_mode: String = row.get(6)?;

    Ok(Payment {
        id: row.get(0)?,
        flat_number: row.get(1)?,
        month: parse_column(2, &month, Month::from_str)?,
        year: row.get(3)?,
        amount: row.get(4)?,
        paid_on: parse_column(5, &paid_on, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))?,
        payment_mode: parse_column(6, &payment_mode, PaymentMode::from_str)?,
        created_at: timestamp_column(row, 7)?,
    })
}

pub(crate) fn insert_flat_row(conn: &Connection, flat: &Flat) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO flats (flat_number, owner_name, contact, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            flat.flat_number,
            flat.owner_name,
            flat.contact,
            flat.created_at.to_rfc3339(),
            flat.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_payment_row(conn: &Connection, payment: &Payment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO payments (
            id, flat_number, month, year, amount, paid_on, payment_mode, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            payment.id,
            payment.flat_number,
            payment.month.as_str(),
            payment.year,
            payment.amount,
            payment.paid_on.format("%Y-%m-%d").to_string(),
            payment.payment_mode.as_str(),
            payment.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    let data_json = event.data.to_string();

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> rusqlite::Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_column(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: parse_column(5, &data_json, |s| {
                    serde_json::from_str::<serde_json::Value>(s)
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(events)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// Read flats from a CSV with `flatNumber,ownerName,contact` headers
pub fn load_flats_csv(csv_path: &Path) -> Result<Vec<NewFlat>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut flats = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let flat: NewFlat =
            result.with_context(|| format!("Failed to deserialize flat on row {}", line + 1))?;
        flats.push(flat);
    }

    Ok(flats)
}

/// Read payments from a CSV with
/// `flatNumber,month,year,amount,paidOn,paymentMode` headers
///
/// Enumerated fields stay strings here; they are checked when recorded.
pub fn load_payments_csv(csv_path: &Path) -> Result<Vec<PaymentRequest>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut payments = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let payment: PaymentRequest =
            result.with_context(|| format!("Failed to deserialize payment on row {}", line + 1))?;
        payments.push(payment);
    }

    Ok(payments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('flats', 'payments', 'events')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_unique_period_index_rejects_second_row() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let now = Utc::now();
        let flat = Flat {
            flat_number: "101".to_string(),
            owner_name: "Mr. Rajesh Kumar".to_string(),
            contact: "9876543210".to_string(),
            created_at: now,
            updated_at: now,
        };
        insert_flat_row(&conn, &flat).unwrap();

        let mut payment = Payment {
            id: "a".to_string(),
            flat_number: "101".to_string(),
            month: Month::January,
            year: 2024,
            amount: 1500.0,
            paid_on: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            payment_mode: PaymentMode::Upi,
            created_at: now,
        };
        insert_payment_row(&conn, &payment).unwrap();

        payment.id = "b".to_string();
        let err = insert_payment_row(&conn, &payment).unwrap_err();
        assert!(crate::error::is_constraint_violation(&err));

        let mut stmt = conn
            .prepare(&format!("SELECT {PAYMENT_COLUMNS} FROM payments"))
            .unwrap();
        let stored: Vec<Payment> = stmt
            .query_map([], payment_from_row)
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "a");
        assert_eq!(stored[0].payment_mode, PaymentMode::Upi);
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "payment_recorded",
            "payment",
            "test_id_123",
            serde_json::json!({"flatNumber": "101"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "payment", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "payment_recorded");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data["flatNumber"], "101");
    }

    #[test]
    fn test_load_csv_files() {
        let dir = tempfile::tempdir().unwrap();

        let flats_path = dir.path().join("flats.csv");
        let mut f = std::fs::File::create(&flats_path).unwrap();
        writeln!(f, "flatNumber,ownerName,contact").unwrap();
        writeln!(f, "101,Mr. Rajesh Kumar,9876543210").unwrap();
        writeln!(f, "102,Mrs. Priya Sharma,9876543211").unwrap();
        drop(f);

        let payments_path = dir.path().join("payments.csv");
        let mut f = std::fs::File::create(&payments_path).unwrap();
        writeln!(f, "flatNumber,month,year,amount,paidOn,paymentMode").unwrap();
        writeln!(f, "101,January,2024,1500,2024-01-05,UPI").unwrap();
        drop(f);

        let flats = load_flats_csv(&flats_path).unwrap();
        assert_eq!(flats.len(), 2);
        assert_eq!(flats[1].owner_name, "Mrs. Priya Sharma");

        let payments = load_payments_csv(&payments_path).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_mode, "UPI");
    }
}
