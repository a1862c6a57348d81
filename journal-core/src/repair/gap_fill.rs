//! Gap-fill: resolve missing cells on a field subset, oldest row first, so a
//! cell filled early in the pass is history for every later row.

use crate::ledger::Ledger;
use crate::report::{CellChange, CellRef};
use crate::resolver::FallbackResolver;
use crate::schema::{FieldId, ObservationSchema};

use super::{DateFilter, RepairReport};

pub const PASS_NAME: &str = "gap-fill";

#[derive(Debug, Clone, Default)]
pub struct GapFillOptions {
    pub fields: Vec<FieldId>,
    pub filter: DateFilter,
    /// Skip every adapter and use ledger history only.
    pub carry_forward_only: bool,
}

pub fn gap_fill(
    ledger: &mut Ledger,
    schema: &ObservationSchema,
    resolver: &FallbackResolver,
    opts: &GapFillOptions,
) -> RepairReport {
    let mut report = RepairReport::new(PASS_NAME);

    for pos in ledger.ascending_positions() {
        let date = ledger.row_at(pos).date;
        if !opts.filter.matches(date) {
            continue;
        }

        for &id in &opts.fields {
            let cell = ledger.row_at(pos).cell(id);
            if cell.is_present() {
                continue;
            }
            let before = cell.raw_text();
            let field = schema.field(id);
            let history = || ledger.last_known_before(id, date);

            let res = if opts.carry_forward_only {
                resolver.resolve_from_history(field, None, history)
            } else {
                resolver.resolve(field, date, None, history)
            };

            match res.value {
                Some(v) => {
                    ledger.row_at_mut(pos).set(id, v.into());
                    report.record(CellChange {
                        date,
                        field: field.name.clone(),
                        before,
                        after: v.to_string(),
                        provenance: res.provenance,
                    });
                }
                None => report.unavailable.push(CellRef {
                    date,
                    field: field.name.clone(),
                }),
            }
        }
    }

    tracing::info!(
        filled = report.changes.len(),
        unavailable = report.unavailable.len(),
        "gap-fill pass done"
    );
    report
}
