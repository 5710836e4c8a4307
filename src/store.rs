// Store - the one handle every caller goes through
//
// Registry and Ledger share a single SQLite connection behind a mutex, so
// each check-then-insert runs without interleaving and every reader sees a
// committed state. The adjacency relation sits behind its own lock and is
// swapped whole on reload; a traversal always works on one snapshot.

use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::{self, Event};
use crate::error::Result;
use crate::grouping::{self, Adjacency};
use crate::ledger::{self, PaymentStatus};
use crate::model::{
    Flat, FlatUpdate, Month, NewFlat, NewPayment, Payment, PaymentFilter, PaymentRequest, Period,
};
use crate::registry::{self, FlatOrder, RemovedFlat};
use crate::reports::{
    self, Dashboard, FlatSummary, GroupStatistics, OutstandingDues, PeriodReport, StatusFilter,
};
use crate::seed::{self, SeedSummary};

/// One row that an import skipped, and why
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRejection {
    /// 1-based data row (header excluded)
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub rejected: Vec<ImportRejection>,
}

pub struct Store {
    conn: Mutex<Connection>,
    adjacency: RwLock<Arc<Adjacency>>,
}

impl Store {
    pub fn new(conn: Connection, adjacency: Adjacency) -> Result<Self> {
        db::setup_database(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
            adjacency: RwLock::new(Arc::new(adjacency)),
        })
    }

    pub fn open(path: &Path, adjacency: Adjacency) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "database opened");
        Store::new(conn, adjacency)
    }

    pub fn open_in_memory(adjacency: Adjacency) -> Result<Self> {
        Store::new(Connection::open_in_memory()?, adjacency)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Store::open(&config.database_path, config.load_adjacency()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction rolls the transaction back, so the
        // connection is still consistent after poisoning.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // FLATS
    // ========================================================================

    pub fn register_flat(&self, new_flat: &NewFlat) -> Result<Flat> {
        registry::register_flat(&mut self.conn(), new_flat)
    }

    pub fn find_flat(&self, flat_number: &str) -> Result<Flat> {
        registry::find_flat(&self.conn(), flat_number)
    }

    pub fn list_flats(&self, order: FlatOrder) -> Result<Vec<Flat>> {
        registry::list_flats(&self.conn(), order)
    }

    pub fn update_flat(&self, flat_number: &str, update: &FlatUpdate) -> Result<Flat> {
        registry::update_flat(&mut self.conn(), flat_number, update)
    }

    pub fn remove_flat(&self, flat_number: &str) -> Result<RemovedFlat> {
        registry::remove_flat(&mut self.conn(), flat_number)
    }

    // ========================================================================
    // PAYMENTS
    // ========================================================================

    pub fn record_payment(&self, new_payment: &NewPayment) -> Result<Payment> {
        ledger::record_payment(&mut self.conn(), new_payment)
    }

    pub fn find_payment(&self, id: &str) -> Result<Payment> {
        ledger::find_payment(&self.conn(), id)
    }

    pub fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        ledger::list_payments(&self.conn(), filter)
    }

    pub fn list_for_flat(&self, flat_number: &str) -> Result<Vec<Payment>> {
        ledger::list_for_flat(&self.conn(), flat_number)
    }

    pub fn remove_payment(&self, id: &str) -> Result<Payment> {
        ledger::remove_payment(&mut self.conn(), id)
    }

    pub fn payment_status(
        &self,
        flat_number: &str,
        month: Month,
        year: i32,
    ) -> Result<PaymentStatus> {
        ledger::payment_status(&self.conn(), flat_number, month, year)
    }

    // ========================================================================
    // GROUPS
    // ========================================================================

    /// Snapshot of the current adjacency relation
    pub fn adjacency(&self) -> Arc<Adjacency> {
        Arc::clone(&self.adjacency.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the adjacency relation; traversals already running keep theirs
    pub fn reload_adjacency(&self, adjacency: Adjacency) {
        let vertices = adjacency.len();
        *self.adjacency.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(adjacency);
        info!(vertices, "adjacency reloaded");
    }

    pub fn compute_groups(&self) -> Vec<Vec<String>> {
        grouping::compute_groups(&self.adjacency())
    }

    pub fn group_statistics(&self, month: Month, year: i32) -> Result<Vec<GroupStatistics>> {
        let groups = self.compute_groups();
        reports::group_statistics(&self.conn(), &groups, month, year)
    }

    // ========================================================================
    // REPORTS
    // ========================================================================

    pub fn period_report(&self, period: Period) -> Result<PeriodReport> {
        reports::period_report(&self.conn(), period)
    }

    pub fn outstanding_dues(
        &self,
        period: Period,
        expected_fee_per_flat: f64,
        as_of: NaiveDate,
    ) -> Result<OutstandingDues> {
        reports::outstanding_dues(&self.conn(), period, expected_fee_per_flat, as_of)
    }

    pub fn dashboard(
        &self,
        search: &str,
        filter: StatusFilter,
        month: Month,
        year: i32,
    ) -> Result<Dashboard> {
        reports::dashboard(&self.conn(), search, filter, month, year)
    }

    pub fn flat_summary(&self, flat_number: &str, as_of: NaiveDate) -> Result<FlatSummary> {
        let adjacency = self.adjacency();
        reports::flat_summary(&self.conn(), &adjacency, flat_number, as_of)
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        Ok(db::get_events_for_entity(&self.conn(), entity_type, entity_id)?)
    }

    // ========================================================================
    // BULK
    // ========================================================================

    pub fn seed_sample_data(&self) -> Result<SeedSummary> {
        let summary = seed::seed_sample_data(&mut self.conn())?;
        self.reload_adjacency(seed::sample_adjacency()?);
        Ok(summary)
    }

    /// Register each flat independently; rejected rows are reported, not fatal
    pub fn import_flats(&self, flats: &[NewFlat]) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for (idx, flat) in flats.iter().enumerate() {
            match self.register_flat(flat) {
                Ok(_) => summary.inserted += 1,
                Err(e) => {
                    warn!(row = idx + 1, error = %e, "flat row rejected");
                    summary.rejected.push(ImportRejection {
                        row: idx + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        summary
    }

    /// Record each payment independently; rejected rows are reported, not fatal
    pub fn import_payments(&self, payments: Vec<PaymentRequest>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for (idx, request) in payments.into_iter().enumerate() {
            let outcome = NewPayment::try_from(request).and_then(|p| self.record_payment(&p));
            match outcome {
                Ok(_) => summary.inserted += 1,
                Err(e) => {
                    warn!(row = idx + 1, error = %e, "payment row rejected");
                    summary.rejected.push(ImportRejection {
                        row: idx + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::model::PaymentMode;
    use std::thread;

    fn store() -> Store {
        Store::open_in_memory(seed::sample_adjacency().unwrap()).unwrap()
    }

    fn january(flat: &str) -> NewPayment {
        NewPayment {
            flat_number: flat.to_string(),
            month: Month::January,
            year: 2024,
            amount: 1500.0,
            paid_on: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            payment_mode: PaymentMode::Cash,
        }
    }

    #[test]
    fn test_concurrent_records_keep_period_unique() {
        let store = Arc::new(store());
        store.register_flat(&NewFlat::new("101", "Owner", "1")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.record_payment(&january("101")))
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        let duplicates = outcomes
            .iter()
            .filter(|o| matches!(o, Err(LedgerError::DuplicatePeriod { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.list_for_flat("101").unwrap().len(), 1);
    }

    #[test]
    fn test_reload_adjacency() {
        let store = store();
        assert_eq!(store.compute_groups().len(), 3);

        store.reload_adjacency(Adjacency::from_pairs([("A", vec!["B"]), ("B", vec![])]).unwrap());
        assert_eq!(store.compute_groups(), vec![vec!["A", "B"]]);
    }

    #[test]
    fn test_imports_report_rejections() {
        let store = store();

        let flats = vec![
            NewFlat::new("101", "A", "1"),
            NewFlat::new("101", "B", "2"),
            NewFlat::new("102", "", "3"),
        ];
        let summary = store.import_flats(&flats);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.rejected.len(), 2);
        assert_eq!(summary.rejected[0].row, 2);

        let request = |flat: &str, month: &str| PaymentRequest {
            flat_number: flat.to_string(),
            month: month.to_string(),
            year: 2024,
            amount: 1500.0,
            paid_on: "2024-01-05".to_string(),
            payment_mode: "Cash".to_string(),
        };
        let summary = store.import_payments(vec![
            request("101", "January"),
            request("101", "January"),
            request("999", "January"),
            request("101", "Janvier"),
        ]);
        assert_eq!(summary.inserted, 1);
        assert_eq!(
            summary.rejected.iter().map(|r| r.row).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn test_audit_trail() {
        let store = store();
        store.register_flat(&NewFlat::new("101", "A", "1")).unwrap();
        let payment = store.record_payment(&january("101")).unwrap();
        store.remove_payment(&payment.id).unwrap();

        let events = store.events_for("payment", &payment.id).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.event_type == "payment_removed"));
    }
}
