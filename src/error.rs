// Error taxonomy for the payment ledger
//
// Every core operation fails fast with one of these kinds. The API layer
// translates each kind into a client-visible response; nothing in the core
// retries or coerces.

use thiserror::Error;

use crate::model::Month;

/// Which stored entity a `NotFound` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Flat,
    Payment,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Flat => "flat",
            Entity::Payment => "payment",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: Entity, key: String },

    #[error("flat {0} is already registered")]
    DuplicateIdentifier(String),

    #[error("payment already exists for flat {flat_number}, {month} {year}")]
    DuplicatePeriod {
        flat_number: String,
        month: Month,
        year: i32,
    },

    #[error("flat {0} does not exist")]
    UnknownFlat(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LedgerError {
    pub fn flat_not_found(flat_number: &str) -> Self {
        LedgerError::NotFound {
            entity: Entity::Flat,
            key: flat_number.to_string(),
        }
    }

    pub fn payment_not_found(id: &str) -> Self {
        LedgerError::NotFound {
            entity: Entity::Payment,
            key: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// Short machine-readable kind, used by the API envelope
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NotFound",
            LedgerError::DuplicateIdentifier(_) => "DuplicateIdentifier",
            LedgerError::DuplicatePeriod { .. } => "DuplicatePeriod",
            LedgerError::UnknownFlat(_) => "UnknownFlat",
            LedgerError::Validation(_) => "ValidationError",
            LedgerError::Config(_) => "ConfigError",
            LedgerError::Storage(_) => "StorageError",
        }
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// True when a rusqlite error is a UNIQUE / PRIMARY KEY / FK violation
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
