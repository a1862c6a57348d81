use crate::ledger::Ledger;

use super::RepairReport;

pub const PASS_NAME: &str = "sort";

/// Ascending date order, for deterministic diffs.
pub fn sort_by_date(ledger: &mut Ledger) -> RepairReport {
    let mut report = RepairReport::new(PASS_NAME);
    report.rows_reordered = ledger.sort_by_date();
    tracing::info!(moved = report.rows_reordered, "sort pass done");
    report
}
