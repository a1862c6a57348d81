//! Explicit override: re-query the chain and replace stored values that
//! materially differ from the source. Never carries forward and never clears
//! a cell the chain has nothing for.

use crate::cell::quantize;
use crate::ledger::Ledger;
use crate::report::{CellChange, CellRef};
use crate::resolver::FallbackResolver;
use crate::schema::{FieldId, ObservationSchema};

use super::{DateFilter, RepairReport};

pub const PASS_NAME: &str = "override";

#[derive(Debug, Clone, Default)]
pub struct OverrideOptions {
    pub fields: Vec<FieldId>,
    pub filter: DateFilter,
}

pub fn override_from_sources(
    ledger: &mut Ledger,
    schema: &ObservationSchema,
    resolver: &FallbackResolver,
    opts: &OverrideOptions,
) -> RepairReport {
    let mut report = RepairReport::new(PASS_NAME);

    for pos in ledger.ascending_positions() {
        let date = ledger.row_at(pos).date;
        if !opts.filter.matches(date) {
            continue;
        }

        for &id in &opts.fields {
            let field = schema.field(id);
            let Some(hit) = resolver.query_chain(field, date) else {
                report.unavailable.push(CellRef {
                    date,
                    field: field.name.clone(),
                });
                continue;
            };
            let Some(v) = hit.value else { continue };

            let cell = ledger.row_at(pos).cell(id);
            // equal at field precision is not a material difference
            if cell.value().map(|c| quantize(c, field.precision)) == Some(v) {
                continue;
            }
            let before = cell.raw_text();
            ledger.row_at_mut(pos).set(id, v.into());
            report.record(CellChange {
                date,
                field: field.name.clone(),
                before,
                after: v.to_string(),
                provenance: hit.provenance,
            });
        }
    }

    tracing::info!(replaced = report.changes.len(), "override pass done");
    report
}
