//! Market Journal core: a dated ledger of daily FX, index, commodity, crypto
//! and 10-year yield observations.
//!
//! - Observation schema and the in-memory ledger
//! - Source adapters (Yahoo chart, FRED observations, EODHD end-of-day)
//! - Fallback resolver: source-priority chain, then carry-forward
//! - Reconciliation engine with write-once and refresh modes
//! - Repair passes: gap-fill, rescale, precision, ordering, override
//! - CSV ledger store with atomic full-table commit

pub mod cell;
pub mod config;
pub mod data;
pub mod journal;
pub mod ledger;
pub mod logging;
pub mod reconcile;
pub mod repair;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod store;

pub use cell::Cell;
pub use config::{ConfigError, JournalConfig};
pub use journal::{Journal, JournalError, LedgerStatus, RepairOp, RepairOutcome, UpdateOutcome};
pub use ledger::{Ledger, ObservationRow};
pub use reconcile::{ReconcileEngine, ReconcileMode, ReconcileReport, TargetDates};
pub use repair::RepairReport;
pub use resolver::{FallbackResolver, Resolution};
pub use schema::{FieldDescriptor, FieldId, ObservationSchema, SourceSpec, UnitFamily};
pub use store::{CommitSummary, LedgerError, LedgerStore, PersistMode, SchemaViolation};

#[cfg(test)]
mod tests {
    use super::*;

    /// Adapters live behind `Arc<dyn ...>` in the registry; everything the
    /// journal owns must stay shareable across threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Ledger>();
        require_sync::<Ledger>();
        require_send::<ObservationSchema>();
        require_sync::<ObservationSchema>();
        require_send::<FallbackResolver>();
        require_sync::<FallbackResolver>();
        require_send::<LedgerStore>();
        require_sync::<LedgerStore>();
        require_send::<data::YahooSource>();
        require_sync::<data::YahooSource>();
        require_send::<data::FredSource>();
        require_sync::<data::FredSource>();
        require_send::<data::EodhdSource>();
        require_sync::<data::EodhdSource>();
    }
}
