// Flat Registry - the set of known flats
//
// Identity is the flat number; owner and contact are values that can be
// edited. Removing a flat removes every payment that references it, in the
// same SQLite transaction, so the ledger never holds an orphaned payment.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::db::{self, Event, FLAT_COLUMNS};
use crate::error::{is_constraint_violation, LedgerError, Result};
use crate::model::{Flat, FlatUpdate, NewFlat};

const ACTOR: &str = "flat_registry";

/// Ordering requested from `list_flats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlatOrder {
    /// Whatever order storage yields (registration order for SQLite)
    #[default]
    Unspecified,
    /// Sorted by flat number
    ByIdentifier,
}

/// Outcome of a cascading removal
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedFlat {
    pub flat: Flat,
    pub payments_removed: usize,
}

/// Register a new flat; its number must not already be taken
pub fn register_flat(conn: &mut Connection, new_flat: &NewFlat) -> Result<Flat> {
    let tx = conn.transaction()?;
    let flat = insert_flat(&tx, new_flat)?;
    tx.commit()?;

    info!(flat_number = %flat.flat_number, "flat registered");
    Ok(flat)
}

/// Uniqueness check + insert + audit event, inside the caller's transaction
pub(crate) fn insert_flat(conn: &Connection, new_flat: &NewFlat) -> Result<Flat> {
    let new_flat = new_flat.normalized()?;

    if flat_exists(conn, &new_flat.flat_number)? {
        warn!(flat_number = %new_flat.flat_number, "rejected duplicate flat registration");
        return Err(LedgerError::DuplicateIdentifier(new_flat.flat_number));
    }

    let now = Utc::now();
    let flat = Flat {
        flat_number: new_flat.flat_number,
        owner_name: new_flat.owner_name,
        contact: new_flat.contact,
        created_at: now,
        updated_at: now,
    };

    match db::insert_flat_row(conn, &flat) {
        Ok(()) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(LedgerError::DuplicateIdentifier(flat.flat_number));
        }
        Err(e) => return Err(e.into()),
    }

    db::insert_event(
        conn,
        &Event::new(
            "flat_registered",
            "flat",
            &flat.flat_number,
            serde_json::json!({
                "ownerName": flat.owner_name,
                "contact": flat.contact,
            }),
            ACTOR,
        ),
    )?;

    Ok(flat)
}

/// Look up one flat by number
pub fn find_flat(conn: &Connection, flat_number: &str) -> Result<Flat> {
    let flat_number = flat_number.trim();
    conn.query_row(
        &format!("SELECT {FLAT_COLUMNS} FROM flats WHERE flat_number = ?1"),
        params![flat_number],
        db::flat_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::flat_not_found(flat_number))
}

pub fn flat_exists(conn: &Connection, flat_number: &str) -> Result<bool> {
    let flat_number = flat_number.trim();
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM flats WHERE flat_number = ?1)",
        params![flat_number],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn list_flats(conn: &Connection, order: FlatOrder) -> Result<Vec<Flat>> {
    let order_by = match order {
        FlatOrder::Unspecified => "rowid",
        FlatOrder::ByIdentifier => "flat_number",
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {FLAT_COLUMNS} FROM flats ORDER BY {order_by}"
    ))?;
    let flats = stmt
        .query_map([], db::flat_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(count = flats.len(), "listed flats");
    Ok(flats)
}

pub fn count_flats(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM flats", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Edit owner/contact; the flat number is never changed
pub fn update_flat(
    conn: &mut Connection,
    flat_number: &str,
    update: &FlatUpdate,
) -> Result<Flat> {
    if update.is_empty() {
        return Err(LedgerError::validation("nothing to update: give ownerName or contact"));
    }

    let tx = conn.transaction()?;

    let mut flat = find_flat(&tx, flat_number)?;
    update.apply(&mut flat)?;
    flat.updated_at = Utc::now();

    tx.execute(
        "UPDATE flats SET owner_name = ?1, contact = ?2, updated_at = ?3
         WHERE flat_number = ?4",
        params![
            flat.owner_name,
            flat.contact,
            flat.updated_at.to_rfc3339(),
            flat.flat_number,
        ],
    )?;

    db::insert_event(
        &tx,
        &Event::new(
            "flat_updated",
            "flat",
            &flat.flat_number,
            serde_json::to_value(update).unwrap_or_default(),
            ACTOR,
        ),
    )?;
    tx.commit()?;

    info!(flat_number = %flat.flat_number, "flat updated");
    Ok(flat)
}

/// Remove a flat together with all of its payments
///
/// Both deletions happen in one transaction: if anything fails, neither the
/// flat nor any payment is removed.
pub fn remove_flat(conn: &mut Connection, flat_number: &str) -> Result<RemovedFlat> {
    let tx = conn.transaction()?;

    let flat = find_flat(&tx, flat_number)?;
    let flat_number = flat.flat_number.as_str();

    let payments_removed = tx.execute(
        "DELETE FROM payments WHERE flat_number = ?1",
        params![flat_number],
    )?;
    tx.execute("DELETE FROM flats WHERE flat_number = ?1", params![flat_number])?;

    db::insert_event(
        &tx,
        &Event::new(
            "flat_removed",
            "flat",
            flat_number,
            serde_json::json!({ "paymentsRemoved": payments_removed }),
            ACTOR,
        ),
    )?;
    tx.commit()?;

    info!(flat_number, payments_removed, "flat removed");
    Ok(RemovedFlat {
        flat,
        payments_removed,
    })
}
