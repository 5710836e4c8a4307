// Domain model - flats, payments and the periods they are reported over
//
// A Flat is identified by its flat number, which never changes after
// registration. A Payment belongs to exactly one (flat, month, year) and is
// immutable once recorded.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, Result};

/// Lowest year a payment may be recorded for
pub const MIN_YEAR: i32 = 2020;

/// Highest year a payment may be recorded for
pub const MAX_YEAR: i32 = 2030;

// ============================================================================
// MONTH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// 1-based calendar number (January = 1)
    pub fn number(&self) -> u32 {
        *self as u32 + 1
    }

    pub fn of(date: NaiveDate) -> Month {
        // month0() is always 0..=11
        Month::ALL[date.month0() as usize]
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Month {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Month::ALL
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| LedgerError::validation(format!("unrecognized month: {trimmed:?}")))
    }
}

// ============================================================================
// PAYMENT MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaymentMode {
    Cash,
    #[serde(rename = "UPI")]
    Upi,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    Cheque,
    Online,
}

impl PaymentMode {
    pub const ALL: [PaymentMode; 5] = [
        PaymentMode::Cash,
        PaymentMode::Upi,
        PaymentMode::BankTransfer,
        PaymentMode::Cheque,
        PaymentMode::Online,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::Upi => "UPI",
            PaymentMode::BankTransfer => "Bank Transfer",
            PaymentMode::Cheque => "Cheque",
            PaymentMode::Online => "Online",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        PaymentMode::ALL
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| {
                LedgerError::validation(format!("unrecognized payment mode: {trimmed:?}"))
            })
    }
}

// ============================================================================
// FLAT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flat {
    /// Stable identity - never changes after registration
    pub flat_number: String,
    pub owner_name: String,
    pub contact: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a flat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFlat {
    pub flat_number: String,
    pub owner_name: String,
    pub contact: String,
}

impl NewFlat {
    pub fn new(flat_number: &str, owner_name: &str, contact: &str) -> Self {
        NewFlat {
            flat_number: flat_number.to_string(),
            owner_name: owner_name.to_string(),
            contact: contact.to_string(),
        }
    }

    /// Trim every field and reject blanks
    pub fn normalized(&self) -> Result<NewFlat> {
        Ok(NewFlat {
            flat_number: required("flatNumber", &self.flat_number)?,
            owner_name: required("ownerName", &self.owner_name)?,
            contact: required("contact", &self.contact)?,
        })
    }
}

/// Owner/contact edits; the flat number itself is not editable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatUpdate {
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

impl FlatUpdate {
    pub fn is_empty(&self) -> bool {
        self.owner_name.is_none() && self.contact.is_none()
    }

    /// Apply onto an existing flat, trimming and rejecting blank values
    pub fn apply(&self, flat: &mut Flat) -> Result<()> {
        if let Some(owner_name) = &self.owner_name {
            flat.owner_name = required("ownerName", owner_name)?;
        }
        if let Some(contact) = &self.contact {
            flat.contact = required("contact", contact)?;
        }
        Ok(())
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// PAYMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub flat_number: String,
    pub month: Month,
    pub year: i32,
    pub amount: f64,
    pub paid_on: NaiveDate,
    pub payment_mode: PaymentMode,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn period(&self) -> Period {
        Period::month(self.year, self.month)
    }
}

/// Input for recording a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub flat_number: String,
    pub month: Month,
    pub year: i32,
    pub amount: f64,
    pub paid_on: NaiveDate,
    pub payment_mode: PaymentMode,
}

impl NewPayment {
    /// Check the domain constraints that do not need the store
    pub fn validate(&self) -> Result<()> {
        if self.flat_number.trim().is_empty() {
            return Err(LedgerError::validation("flatNumber must not be empty"));
        }
        validate_year(self.year)?;
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(LedgerError::validation(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Wire shape of a payment request: every enumerated field still a string
///
/// Converting it is where unrecognized months and payment modes are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub flat_number: String,
    pub month: String,
    pub year: i32,
    pub amount: f64,
    pub paid_on: String,
    pub payment_mode: String,
}

impl TryFrom<PaymentRequest> for NewPayment {
    type Error = LedgerError;

    fn try_from(req: PaymentRequest) -> Result<Self> {
        let paid_on = parse_date(&req.paid_on)?;
        Ok(NewPayment {
            flat_number: req.flat_number.trim().to_string(),
            month: req.month.parse()?,
            year: req.year,
            amount: req.amount,
            paid_on,
            payment_mode: req.payment_mode.parse()?,
        })
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| LedgerError::validation(format!("invalid date: {value:?}")))
}

pub fn validate_year(year: i32) -> Result<()> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(LedgerError::validation(format!(
            "year must be between {MIN_YEAR} and {MAX_YEAR}, got {year}"
        )));
    }
    Ok(())
}

// ============================================================================
// PERIOD & FILTER
// ============================================================================

/// A (year) or (year, month) scope for reports and status queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: Option<Month>,
}

impl Period {
    pub fn year(year: i32) -> Self {
        Period { year, month: None }
    }

    pub fn month(year: i32, month: Month) -> Self {
        Period {
            year,
            month: Some(month),
        }
    }

    /// The calendar month containing `today`
    pub fn current(today: NaiveDate) -> Self {
        Period::month(today.year(), Month::of(today))
    }

    pub fn is_yearly(&self) -> bool {
        self.month.is_none()
    }

    /// Billing periods that have elapsed for this scope
    ///
    /// One for a month view. For a year view: January through the month of
    /// `as_of`, inclusive, whatever year the view is for.
    pub fn months_elapsed(&self, as_of: NaiveDate) -> u32 {
        match self.month {
            Some(_) => 1,
            None => as_of.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(month) => write!(f, "{} {}", month, self.year),
            None => write!(f, "{}", self.year),
        }
    }
}

/// Optional conjunction over flat number, month and year
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFilter {
    #[serde(default)]
    pub flat_number: Option<String>,
    #[serde(default)]
    pub month: Option<Month>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl PaymentFilter {
    pub fn for_flat(flat_number: &str) -> Self {
        PaymentFilter {
            flat_number: Some(flat_number.to_string()),
            ..Default::default()
        }
    }

    pub fn for_period(period: Period) -> Self {
        PaymentFilter {
            flat_number: None,
            month: period.month,
            year: Some(period.year),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment(flat: &str, month: Month, year: i32) -> Payment {
        Payment {
            id: "p1".to_string(),
            flat_number: flat.to_string(),
            month,
            year,
            amount: 1500.0,
            paid_on: date(year, month.number(), 5),
            payment_mode: PaymentMode::Upi,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_month_parsing_and_numbers() {
        assert_eq!("march".parse::<Month>().unwrap(), Month::March);
        assert_eq!(" December ".parse::<Month>().unwrap(), Month::December);
        assert!("Smarch".parse::<Month>().is_err());

        assert_eq!(Month::January.number(), 1);
        assert_eq!(Month::December.number(), 12);
        assert_eq!(Month::of(date(2024, 7, 31)), Month::July);
    }

    #[test]
    fn test_payment_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMode::BankTransfer).unwrap(),
            "\"Bank Transfer\""
        );
        assert_eq!(serde_json::to_string(&PaymentMode::Upi).unwrap(), "\"UPI\"");
        assert_eq!("upi".parse::<PaymentMode>().unwrap(), PaymentMode::Upi);
        assert!("Barter".parse::<PaymentMode>().is_err());
    }

    #[test]
    fn test_new_payment_validation() {
        let mut p = NewPayment {
            flat_number: "101".to_string(),
            month: Month::January,
            year: 2024,
            amount: 1500.0,
            paid_on: date(2024, 1, 5),
            payment_mode: PaymentMode::Cash,
        };
        assert!(p.validate().is_ok());

        p.amount = 0.0;
        assert!(p.validate().is_ok(), "zero amount is allowed");

        p.amount = -1.0;
        assert!(matches!(p.validate(), Err(LedgerError::Validation(_))));

        p.amount = f64::NAN;
        assert!(matches!(p.validate(), Err(LedgerError::Validation(_))));

        p.amount = 1500.0;
        p.year = 2019;
        assert!(matches!(p.validate(), Err(LedgerError::Validation(_))));
        p.year = 2031;
        assert!(matches!(p.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_payment_request_conversion() {
        let req: PaymentRequest = serde_json::from_value(serde_json::json!({
            "flatNumber": " 101 ",
            "month": "February",
            "year": 2024,
            "amount": 1500,
            "paidOn": "2024-02-03T00:00:00Z",
            "paymentMode": "Bank Transfer"
        }))
        .unwrap();
        let p = NewPayment::try_from(req).unwrap();
        assert_eq!(p.flat_number, "101");
        assert_eq!(p.month, Month::February);
        assert_eq!(p.paid_on, date(2024, 2, 3));
        assert_eq!(p.payment_mode, PaymentMode::BankTransfer);

        let bad: PaymentRequest = serde_json::from_value(serde_json::json!({
            "flatNumber": "101",
            "month": "Febtober",
            "year": 2024,
            "amount": 1500,
            "paidOn": "2024-02-03",
            "paymentMode": "Cash"
        }))
        .unwrap();
        assert!(matches!(NewPayment::try_from(bad), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_flat_update_rejects_blank() {
        let now = Utc::now();
        let mut flat = Flat {
            flat_number: "101".to_string(),
            owner_name: "Mr. Rajesh Kumar".to_string(),
            contact: "9876543210".to_string(),
            created_at: now,
            updated_at: now,
        };

        let update = FlatUpdate {
            owner_name: Some("  Mrs. Asha Kumar ".to_string()),
            contact: None,
        };
        update.apply(&mut flat).unwrap();
        assert_eq!(flat.owner_name, "Mrs. Asha Kumar");
        assert_eq!(flat.contact, "9876543210");

        let blank = FlatUpdate {
            owner_name: None,
            contact: Some("   ".to_string()),
        };
        assert!(blank.apply(&mut flat).is_err());
    }

    #[test]
    fn test_period_and_filter() {
        assert_eq!(
            payment("101", Month::January, 2024).period(),
            Period::month(2024, Month::January)
        );

        let as_of = date(2024, 3, 14);
        assert_eq!(Period::year(2024).months_elapsed(as_of), 3);
        assert_eq!(Period::month(2024, Month::July).months_elapsed(as_of), 1);
        assert_eq!(Period::current(as_of), Period::month(2024, Month::March));

        assert_eq!(
            PaymentFilter::for_period(Period::month(2024, Month::March)),
            PaymentFilter {
                flat_number: None,
                month: Some(Month::March),
                year: Some(2024),
            }
        );
        assert_eq!(
            PaymentFilter::for_flat("101").flat_number.as_deref(),
            Some("101")
        );
    }
}
