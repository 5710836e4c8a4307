// Status & Report Engine
//
// Derived views over Registry + Ledger + Grouper. Nothing here is stored:
// every figure is recomputed from the current ledger on each call.

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::grouping::Adjacency;
use crate::ledger::{self, PaymentStatus};
use crate::model::{validate_year, Flat, Month, Payment, PaymentFilter, PaymentMode, Period};
use crate::registry::{self, FlatOrder};

/// Number of recent payments shown on a flat summary
pub const RECENT_PAYMENTS: usize = 6;

// ============================================================================
// GROUP STATISTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatistics {
    pub members: Vec<String>,
    pub total: usize,
    pub paid: usize,
    pub due: usize,
}

/// Paid/due counts per group for one reference month
///
/// A member with no registered flat has no payments, so it counts as due.
pub fn group_statistics(
    conn: &Connection,
    groups: &[Vec<String>],
    month: Month,
    year: i32,
) -> Result<Vec<GroupStatistics>> {
    let paid_flats = ledger::paid_flats(conn, month, year)?;

    let stats = groups
        .iter()
        .map(|members| {
            let paid = members.iter().filter(|m| paid_flats.contains(*m)).count();
            GroupStatistics {
                members: members.clone(),
                total: members.len(),
                paid,
                due: members.len() - paid,
            }
        })
        .collect();

    Ok(stats)
}

// ============================================================================
// PERIOD REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: Month,
    pub revenue: f64,
    pub count: usize,
}

/// Flat-wise row of a period report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatPeriodSummary {
    pub flat_number: String,
    pub owner_name: String,
    pub payments_count: usize,
    pub total_paid: f64,
    pub last_payment: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub period: Period,
    pub total_revenue: f64,
    pub total_payments: usize,
    pub average_payment: f64,
    pub mode_distribution: BTreeMap<PaymentMode, usize>,
    /// All twelve months of the year; only present for a yearly report
    pub monthly_breakdown: Option<Vec<MonthlyRevenue>>,
    pub flats: Vec<FlatPeriodSummary>,
}

pub fn period_report(conn: &Connection, period: Period) -> Result<PeriodReport> {
    validate_year(period.year)?;

    let payments = ledger::list_payments(conn, &PaymentFilter::for_period(period))?;

    let total_revenue: f64 = payments.iter().map(|p| p.amount).sum();
    let total_payments = payments.len();
    let average_payment = if total_payments == 0 {
        0.0
    } else {
        total_revenue / total_payments as f64
    };

    let mut mode_distribution = BTreeMap::new();
    for payment in &payments {
        *mode_distribution.entry(payment.payment_mode).or_insert(0) += 1;
    }

    let monthly_breakdown = period.is_yearly().then(|| monthly_breakdown(&payments));

    let flats = registry::list_flats(conn, FlatOrder::ByIdentifier)?
        .into_iter()
        .map(|flat| flat_period_summary(flat, &payments))
        .collect();

    debug!(%period, total_payments, total_revenue, "period report computed");

    Ok(PeriodReport {
        period,
        total_revenue,
        total_payments,
        average_payment,
        mode_distribution,
        monthly_breakdown,
        flats,
    })
}

fn monthly_breakdown(payments: &[Payment]) -> Vec<MonthlyRevenue> {
    Month::ALL
        .iter()
        .map(|&month| {
            let in_month = payments.iter().filter(|p| p.month == month);
            MonthlyRevenue {
                month,
                revenue: in_month.clone().map(|p| p.amount).sum(),
                count: in_month.count(),
            }
        })
        .collect()
}

fn flat_period_summary(flat: Flat, payments: &[Payment]) -> FlatPeriodSummary {
    let own: Vec<&Payment> = payments
        .iter()
        .filter(|p| p.flat_number == flat.flat_number)
        .collect();

    FlatPeriodSummary {
        payments_count: own.len(),
        total_paid: own.iter().map(|p| p.amount).sum(),
        last_payment: own.iter().map(|p| p.paid_on).max(),
        flat_number: flat.flat_number,
        owner_name: flat.owner_name,
    }
}

// ============================================================================
// OUTSTANDING DUES
// ============================================================================

/// Expected-vs-collected estimate for a period
///
/// Assumes every registered flat owes the same fee for every elapsed month.
/// It does not prorate flats registered mid-period or partial payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingDues {
    pub period: Period,
    pub flat_count: usize,
    pub expected_fee_per_flat: f64,
    pub months_elapsed: u32,
    pub expected_revenue: f64,
    pub collected_revenue: f64,
    pub outstanding: f64,
}

pub fn outstanding_dues(
    conn: &Connection,
    period: Period,
    expected_fee_per_flat: f64,
    as_of: NaiveDate,
) -> Result<OutstandingDues> {
    validate_year(period.year)?;
    if !expected_fee_per_flat.is_finite() || expected_fee_per_flat < 0.0 {
        return Err(LedgerError::validation(format!(
            "expected fee must be a non-negative number, got {expected_fee_per_flat}"
        )));
    }

    let flat_count = registry::count_flats(conn)?;
    let months_elapsed = period.months_elapsed(as_of);
    let expected_revenue = flat_count as f64 * expected_fee_per_flat * months_elapsed as f64;

    let collected_revenue: f64 = ledger::list_payments(conn, &PaymentFilter::for_period(period))?
        .iter()
        .map(|p| p.amount)
        .sum();

    Ok(OutstandingDues {
        period,
        flat_count,
        expected_fee_per_flat,
        months_elapsed,
        expected_revenue,
        collected_revenue,
        outstanding: (expected_revenue - collected_revenue).max(0.0),
    })
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    All,
    Paid,
    Due,
}

impl StatusFilter {
    pub fn admits(&self, status: PaymentStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Paid => status == PaymentStatus::Paid,
            StatusFilter::Due => status == PaymentStatus::Due,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "paid" => Ok(StatusFilter::Paid),
            "due" => Ok(StatusFilter::Due),
            other => Err(LedgerError::validation(format!(
                "unknown status filter: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatWithStatus {
    #[serde(flatten)]
    pub flat: Flat,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub period: Period,
    pub total_flats: usize,
    pub paid_flats: usize,
    pub due_flats: usize,
    pub flats: Vec<FlatWithStatus>,
}

/// Totals over every flat, plus the flats matching `search` and `filter`
///
/// `search` is a case-insensitive substring of the flat number or owner.
pub fn dashboard(
    conn: &Connection,
    search: &str,
    filter: StatusFilter,
    month: Month,
    year: i32,
) -> Result<Dashboard> {
    let paid = ledger::paid_flats(conn, month, year)?;
    let all = registry::list_flats(conn, FlatOrder::ByIdentifier)?;

    let total_flats = all.len();
    let paid_flats = all.iter().filter(|f| paid.contains(&f.flat_number)).count();

    let needle = search.trim().to_lowercase();
    let flats = all
        .into_iter()
        .filter(|flat| {
            needle.is_empty()
                || flat.flat_number.to_lowercase().contains(&needle)
                || flat.owner_name.to_lowercase().contains(&needle)
        })
        .map(|flat| {
            let status = if paid.contains(&flat.flat_number) {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Due
            };
            FlatWithStatus { flat, status }
        })
        .filter(|f| filter.admits(f.status))
        .collect();

    Ok(Dashboard {
        period: Period::month(year, month),
        total_flats,
        paid_flats,
        due_flats: total_flats - paid_flats,
        flats,
    })
}

// ============================================================================
// FLAT SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatSummary {
    pub flat: Flat,
    /// Reference month the status fields are computed for
    pub period: Period,
    pub status: PaymentStatus,
    /// Every payment of the flat, latest period first
    pub payments: Vec<Payment>,
    pub total_paid: f64,
    /// Direct neighbours from the adjacency relation
    pub connected_flats: Vec<String>,
    /// The flat together with its direct neighbours
    pub neighbourhood: GroupStatistics,
    pub months_paid_this_year: usize,
    pub months_pending_this_year: usize,
    pub total_paid_this_year: f64,
    pub recent_payments: Vec<Payment>,
}

pub fn flat_summary(
    conn: &Connection,
    adjacency: &Adjacency,
    flat_number: &str,
    as_of: NaiveDate,
) -> Result<FlatSummary> {
    let flat = registry::find_flat(conn, flat_number)?;
    let period = Period::current(as_of);
    let month = Month::of(as_of);
    let year = as_of.year();

    let payments = ledger::list_for_flat(conn, flat_number)?;
    let total_paid = payments.iter().map(|p| p.amount).sum();

    let this_year: Vec<&Payment> = payments.iter().filter(|p| p.year == year).collect();
    let months_paid_this_year = this_year.len();
    let total_paid_this_year = this_year.iter().map(|p| p.amount).sum();

    let mut recent_payments = payments.clone();
    recent_payments.sort_by(|a, b| b.paid_on.cmp(&a.paid_on));
    recent_payments.truncate(RECENT_PAYMENTS);

    let connected_flats = adjacency.neighbors(flat_number).to_vec();
    let mut members = vec![flat_number.to_string()];
    members.extend(connected_flats.iter().cloned());
    let neighbourhood = group_statistics(conn, &[members], month, year)?
        .pop()
        .unwrap_or(GroupStatistics {
            members: Vec::new(),
            total: 0,
            paid: 0,
            due: 0,
        });

    let status = if payments.iter().any(|p| p.month == month && p.year == year) {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Due
    };

    Ok(FlatSummary {
        flat,
        period,
        status,
        payments,
        total_paid,
        connected_flats,
        neighbourhood,
        months_paid_this_year,
        months_pending_this_year: Month::ALL.len().saturating_sub(months_paid_this_year),
        total_paid_this_year,
        recent_payments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::grouping::compute_groups;
    use crate::model::NewPayment;
    use crate::seed;

    fn seeded() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed::seed_sample_data(&mut conn).unwrap();
        conn
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_group_statistics_for_january() {
        let conn = seeded();
        let groups = compute_groups(&seed::sample_adjacency().unwrap());
        let stats = group_statistics(&conn, &groups, Month::January, 2024).unwrap();

        assert_eq!(stats.len(), 3);
        // January 2024: 101, 102, 201, 301 paid
        assert_eq!((stats[0].paid, stats[0].due), (2, 1));
        assert_eq!((stats[1].paid, stats[1].due), (1, 2));
        assert_eq!((stats[2].paid, stats[2].due), (1, 1));
        assert_eq!(stats[0].total, 3);
    }

    #[test]
    fn test_yearly_report() {
        let conn = seeded();
        let report = period_report(&conn, Period::year(2024)).unwrap();

        assert_eq!(report.total_revenue, 12000.0);
        assert_eq!(report.total_payments, 8);
        assert_eq!(report.average_payment, 1500.0);

        assert_eq!(report.mode_distribution[&PaymentMode::Upi], 3);
        assert_eq!(report.mode_distribution[&PaymentMode::Cash], 3);
        assert_eq!(report.mode_distribution[&PaymentMode::BankTransfer], 2);
        assert!(!report.mode_distribution.contains_key(&PaymentMode::Cheque));

        let breakdown = report.monthly_breakdown.unwrap();
        assert_eq!(breakdown.len(), 12);
        assert_eq!(breakdown[0].count, 4);
        assert_eq!(breakdown[0].revenue, 6000.0);
        assert_eq!(breakdown[1].count, 2);
        assert_eq!(breakdown[2].count, 2);
        assert_eq!(breakdown[11].count, 0);

        let flat_101 = report.flats.iter().find(|f| f.flat_number == "101").unwrap();
        assert_eq!(flat_101.payments_count, 2);
        assert_eq!(flat_101.total_paid, 3000.0);
        assert_eq!(flat_101.last_payment, Some(date(2024, 2, 3)));
    }

    #[test]
    fn test_monthly_report_has_no_breakdown() {
        let conn = seeded();
        let report = period_report(&conn, Period::month(2024, Month::March)).unwrap();

        assert_eq!(report.total_payments, 2);
        assert_eq!(report.total_revenue, 3000.0);
        assert!(report.monthly_breakdown.is_none());
    }

    #[test]
    fn test_empty_report_average_is_zero() {
        let conn = seeded();
        let report = period_report(&conn, Period::year(2025)).unwrap();
        assert_eq!(report.total_payments, 0);
        assert_eq!(report.average_payment, 0.0);
        assert!(report.mode_distribution.is_empty());
    }

    #[test]
    fn test_outstanding_dues() {
        let conn = seeded();

        let april_period = Period::month(2024, Month::April);
        let april = outstanding_dues(&conn, april_period, 1500.0, date(2024, 6, 1)).unwrap();
        assert_eq!(april.expected_revenue, 12000.0);
        assert_eq!(april.collected_revenue, 0.0);
        assert_eq!(april.outstanding, 12000.0);

        let year = outstanding_dues(&conn, Period::year(2024), 1500.0, date(2024, 3, 31)).unwrap();
        assert_eq!(year.months_elapsed, 3);
        assert_eq!(year.expected_revenue, 36000.0);
        assert_eq!(year.outstanding, 24000.0);

        // Over-collection never goes negative
        let jan_period = Period::month(2024, Month::January);
        let jan = outstanding_dues(&conn, jan_period, 100.0, date(2024, 1, 31)).unwrap();
        assert_eq!(jan.outstanding, 0.0);

        assert!(outstanding_dues(&conn, Period::year(2024), -1.0, date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_dashboard_search_and_filter() {
        let conn = seeded();

        let all = dashboard(&conn, "", StatusFilter::All, Month::January, 2024).unwrap();
        assert_eq!(all.total_flats, 8);
        assert_eq!(all.paid_flats, 4);
        assert_eq!(all.due_flats, 4);
        assert_eq!(all.flats.len(), 8);

        let due = dashboard(&conn, "", StatusFilter::Due, Month::January, 2024).unwrap();
        assert!(due.flats.iter().all(|f| f.status == PaymentStatus::Due));
        assert_eq!(due.flats.len(), 4);

        let by_owner = dashboard(&conn, "SHARMA", StatusFilter::All, Month::January, 2024).unwrap();
        assert_eq!(by_owner.flats.len(), 1);
        assert_eq!(by_owner.flats[0].flat.flat_number, "102");

        let by_number = dashboard(&conn, "20", StatusFilter::Paid, Month::January, 2024).unwrap();
        assert_eq!(by_number.flats.len(), 1);
        assert_eq!(by_number.flats[0].flat.flat_number, "201");

        assert_eq!("due".parse::<StatusFilter>().unwrap(), StatusFilter::Due);
        assert!("late".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn test_flat_summary() {
        let mut conn = seeded();
        crate::ledger::record_payment(
            &mut conn,
            &NewPayment {
                flat_number: "102".to_string(),
                month: Month::February,
                year: 2024,
                amount: 1500.0,
                paid_on: date(2024, 2, 9),
                payment_mode: PaymentMode::Online,
            },
        )
        .unwrap();

        let adjacency = seed::sample_adjacency().unwrap();
        let summary = flat_summary(&conn, &adjacency, "102", date(2024, 2, 20)).unwrap();

        assert_eq!(summary.status, PaymentStatus::Paid);
        assert_eq!(summary.payments.len(), 3);
        assert_eq!(summary.payments[0].month, Month::March);
        assert_eq!(summary.total_paid, 4500.0);
        assert_eq!(summary.connected_flats, vec!["101", "103"]);
        // February 2024: 101 and 102 paid, 103 due
        assert_eq!(summary.neighbourhood.total, 3);
        assert_eq!(summary.neighbourhood.paid, 2);
        assert_eq!(summary.months_paid_this_year, 3);
        assert_eq!(summary.months_pending_this_year, 9);
        assert_eq!(summary.recent_payments[0].paid_on, date(2024, 3, 15));

        assert!(matches!(
            flat_summary(&conn, &adjacency, "999", date(2024, 2, 20)),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_dashboard_totals_ignore_search() {
        let conn = seeded();
        let march = dashboard(&conn, "kavita", StatusFilter::All, Month::March, 2024).unwrap();
        assert_eq!(march.paid_flats, 2);
        assert_eq!(march.due_flats, 6);
        assert_eq!(march.flats.len(), 1);
        assert_eq!(march.flats[0].status, PaymentStatus::Paid);
    }
}
