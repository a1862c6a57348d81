//! Rescale pass: fix values stored at the wrong unit scale.
//!
//! A rule matches `above < v < below` and multiplies the match by `factor`.
//! The window is chosen so a corrected value falls outside it, which keeps
//! the pass idempotent. `force` skips the window and rescales every value.

use rust_decimal::Decimal;

use crate::cell::{quantize, Cell};
use crate::ledger::Ledger;
use crate::report::{CellChange, CellRef, Provenance};
use crate::schema::{FieldId, ObservationSchema};

use super::RepairReport;

pub const PASS_NAME: &str = "rescale";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescaleRule {
    pub field: FieldId,
    pub above: Decimal,
    pub below: Decimal,
    pub factor: Decimal,
}

impl RescaleRule {
    pub fn matches(&self, value: Decimal) -> bool {
        self.above < value && value < self.below
    }
}

pub fn rescale(
    ledger: &mut Ledger,
    schema: &ObservationSchema,
    rules: &[RescaleRule],
    force: bool,
) -> RepairReport {
    let mut report = RepairReport::new(PASS_NAME);
    if force {
        tracing::warn!("force rescale: every value of the selected fields is multiplied");
    }

    for pos in ledger.ascending_positions() {
        let date = ledger.row_at(pos).date;
        for rule in rules {
            let field = schema.field(rule.field);
            let v = match ledger.row_at(pos).cell(rule.field) {
                Cell::Value(v) => *v,
                Cell::Empty => continue,
                Cell::Malformed(_) => {
                    report.skipped_malformed.push(CellRef {
                        date,
                        field: field.name.clone(),
                    });
                    continue;
                }
            };
            if !force && !rule.matches(v) {
                continue;
            }

            let fixed = quantize(v * rule.factor, field.precision);
            ledger.row_at_mut(pos).set(rule.field, fixed.into());
            report.record(CellChange {
                date,
                field: field.name.clone(),
                before: Some(quantize(v, field.precision).to_string()),
                after: fixed.to_string(),
                provenance: Provenance::Repair {
                    pass: PASS_NAME.to_string(),
                },
            });
        }
    }

    tracing::info!(rescaled = report.changes.len(), force, "rescale pass done");
    report
}
