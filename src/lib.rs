// Flat Ledger - Core Library
// Maintenance-fee ledger for a fixed set of flats: registry, payment ledger,
// connectivity groups and reports. Used by the CLI, the API server and tests.

pub mod config;
pub mod db;
pub mod error;
pub mod grouping;
pub mod ledger;
pub mod model;
pub mod registry;
pub mod reports;
pub mod seed;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{
    get_events_for_entity, insert_event, load_flats_csv, load_payments_csv, setup_database, Event,
};
pub use error::{Entity, LedgerError, Result};
pub use grouping::{compute_groups, Adjacency};
pub use ledger::PaymentStatus;
pub use model::{
    Flat, FlatUpdate, Month, NewFlat, NewPayment, Payment, PaymentFilter, PaymentMode,
    PaymentRequest, Period, MAX_YEAR, MIN_YEAR,
};
pub use registry::{FlatOrder, RemovedFlat};
pub use reports::{
    Dashboard, FlatPeriodSummary, FlatSummary, FlatWithStatus, GroupStatistics, MonthlyRevenue,
    OutstandingDues, PeriodReport, StatusFilter,
};
pub use seed::SeedSummary;
pub use store::{ImportRejection, ImportSummary, Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global tracing subscriber (`RUST_LOG`, default `info`)
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // try_init: a second call (tests, embedding) keeps the first subscriber
    let _ = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
}
