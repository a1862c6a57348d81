//! Precision normalization. Formatting only: the numeric value never changes,
//! only the number of fractional digits it is held and written with.

use crate::cell::{has_precision, quantize, Cell};
use crate::ledger::Ledger;
use crate::report::{CellChange, CellRef, Provenance};
use crate::schema::{FieldId, ObservationSchema};

use super::RepairReport;

pub const PASS_NAME: &str = "precision";

pub fn normalize_precision(
    ledger: &mut Ledger,
    schema: &ObservationSchema,
    fields: &[FieldId],
) -> RepairReport {
    let mut report = RepairReport::new(PASS_NAME);

    for pos in ledger.ascending_positions() {
        let date = ledger.row_at(pos).date;
        for &id in fields {
            let field = schema.field(id);
            let v = match ledger.row_at(pos).cell(id) {
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
            if has_precision(v, field.precision) {
                continue;
            }
            let q = quantize(v, field.precision);
            if q != v {
                // rounding would change the value: more digits than the field holds
                tracing::debug!(%date, field = %field.name, from = %v, to = %q, "value rounded");
            }
            ledger.row_at_mut(pos).set(id, q.into());
            report.record(CellChange {
                date,
                field: field.name.clone(),
                before: Some(v.to_string()),
                after: q.to_string(),
                provenance: Provenance::Repair {
                    pass: PASS_NAME.to_string(),
                },
            });
        }
    }

    tracing::info!(normalized = report.changes.len(), "precision pass done");
    report
}
