//! Fallback resolver: one field on one date through its source-priority chain,
//! then carry-forward.
//!
//! Adapter errors never escape. Each one is logged and the chain moves on to
//! the next step; there is no retry at this level.

use chrono::{Days, NaiveDate};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::cell::quantize;
use crate::data::{SourceError, SourceRegistry};
use crate::ledger::LastKnown;
use crate::report::Provenance;
use crate::schema::{FieldDescriptor, SourceSpec};

/// A resolved cell: a value (or none) and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: Option<Decimal>,
    pub provenance: Provenance,
}

impl Resolution {
    fn unavailable() -> Self {
        Self {
            value: None,
            provenance: Provenance::Unavailable,
        }
    }

    fn existing(value: Decimal) -> Self {
        Self {
            value: Some(value),
            provenance: Provenance::Existing,
        }
    }

    fn carried(lk: LastKnown, precision: u32) -> Self {
        Self {
            value: Some(quantize(lk.value, precision)),
            provenance: Provenance::CarryForward { from: lk.date },
        }
    }

    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FallbackResolver {
    registry: SourceRegistry,
}

impl FallbackResolver {
    pub fn new(registry: SourceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Fill-only resolution. A present `current` is returned unchanged, so
    /// resolving an already-filled cell never calls an adapter.
    pub fn resolve(
        &self,
        field: &FieldDescriptor,
        date: NaiveDate,
        current: Option<Decimal>,
        history: impl FnOnce() -> Option<LastKnown>,
    ) -> Resolution {
        if let Some(v) = current {
            return Resolution::existing(v);
        }
        let res = match self.query_chain(field, date) {
            Some(hit) => hit,
            None => history()
                .map(|lk| Resolution::carried(lk, field.precision))
                .unwrap_or_else(Resolution::unavailable),
        };
        log_resolution(field, date, &res);
        res
    }

    /// Refresh resolution: the chain is consulted even when `current` is
    /// present. A source hit wins; otherwise the current value stands, and
    /// only an empty cell falls back to history.
    pub fn resolve_fresh(
        &self,
        field: &FieldDescriptor,
        date: NaiveDate,
        current: Option<Decimal>,
        history: impl FnOnce() -> Option<LastKnown>,
    ) -> Resolution {
        let res = match (self.query_chain(field, date), current) {
            (Some(hit), _) => hit,
            (None, Some(v)) => Resolution::existing(v),
            (None, None) => history()
                .map(|lk| Resolution::carried(lk, field.precision))
                .unwrap_or_else(Resolution::unavailable),
        };
        log_resolution(field, date, &res);
        res
    }

    /// Carry-forward without consulting any adapter.
    pub fn resolve_from_history(
        &self,
        field: &FieldDescriptor,
        current: Option<Decimal>,
        history: impl FnOnce() -> Option<LastKnown>,
    ) -> Resolution {
        match current {
            Some(v) => Resolution::existing(v),
            None => history()
                .map(|lk| Resolution::carried(lk, field.precision))
                .unwrap_or_else(Resolution::unavailable),
        }
    }

    /// First chain step with a value, already in schema units and quantized.
    pub fn query_chain(&self, field: &FieldDescriptor, date: NaiveDate) -> Option<Resolution> {
        for step in &field.chain {
            match self.fetch_step(step, date) {
                Ok(Some(raw)) => match to_schema_units(raw, step.divisor()) {
                    Some(v) => {
                        return Some(Resolution {
                            value: Some(quantize(v, field.precision)),
                            provenance: Provenance::Source {
                                name: step.source().to_string(),
                                instrument: step.id().to_string(),
                            },
                        })
                    }
                    None => tracing::warn!(
                        field = %field.name,
                        source = step.source(),
                        instrument = step.id(),
                        "divisor could not be applied; step skipped"
                    ),
                },
                Ok(None) => {}
                Err(e) if e.is_quiet() => tracing::debug!(
                    field = %field.name,
                    %date,
                    source = step.source(),
                    error = %e,
                    "source unavailable"
                ),
                Err(e) => tracing::warn!(
                    field = %field.name,
                    %date,
                    source = step.source(),
                    instrument = step.id(),
                    error = %e,
                    "source call failed"
                ),
            }
        }
        None
    }

    fn fetch_step(&self, step: &SourceSpec, date: NaiveDate) -> Result<Option<Decimal>, SourceError> {
        match step {
            SourceSpec::Point { source, id, .. } => match self.registry.point(source) {
                Some(adapter) => adapter.get_point(id, date),
                None => Err(SourceError::Other(format!("no point source named '{source}'"))),
            },
            SourceSpec::Series {
                source,
                id,
                lookback_days,
                ..
            } => match self.registry.series(source) {
                Some(adapter) => {
                    adapter.get_series_leq(id, date, Days::new(u64::from(*lookback_days)))
                }
                None => Err(SourceError::Other(format!(
                    "no series source named '{source}'"
                ))),
            },
        }
    }
}

/// Divide a scaled provider quote back to schema units.
fn to_schema_units(raw: Decimal, divisor: Option<f64>) -> Option<Decimal> {
    match divisor {
        None => Some(raw),
        Some(d) => Decimal::from_f64(d).and_then(|d| raw.checked_div(d)),
    }
}

fn log_resolution(field: &FieldDescriptor, date: NaiveDate, res: &Resolution) {
    tracing::debug!(
        field = %field.name,
        %date,
        value = ?res.value,
        provenance = %res.provenance,
        "resolved"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemorySource;
    use crate::schema::{SourceSpec, UnitFamily};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn us10() -> FieldDescriptor {
        FieldDescriptor::new(
            "US 10 YR (%)",
            UnitFamily::RatePercent,
            vec![
                SourceSpec::point("yahoo", "^TNX").scaled_by(10.0),
                SourceSpec::series("fred", "DGS10", 10),
            ],
        )
    }

    fn resolver(yahoo: MemorySource, fred: MemorySource) -> (FallbackResolver, Arc<MemorySource>) {
        let yahoo = Arc::new(yahoo);
        let mut reg = SourceRegistry::new();
        reg.register(yahoo.clone()).register(Arc::new(fred));
        (FallbackResolver::new(reg), yahoo)
    }

    #[test]
    fn present_value_short_circuits() {
        let (r, yahoo) = resolver(
            MemorySource::new("yahoo").with_point("^TNX", d("2025-09-05"), dec!(41.0)),
            MemorySource::new("fred"),
        );
        let res = r.resolve(&us10(), d("2025-09-05"), Some(dec!(4.3)), || None);
        assert_eq!(res.value, Some(dec!(4.3)));
        assert_eq!(res.provenance, Provenance::Existing);
        assert_eq!(yahoo.calls(), 0);
    }

    #[test]
    fn primary_beats_fallback_and_is_divided() {
        let (r, _) = resolver(
            MemorySource::new("yahoo").with_point("^TNX", d("2025-09-05"), dec!(42.0)),
            MemorySource::new("fred").with_observation("DGS10", d("2025-09-05"), dec!(4.1)),
        );
        let res = r.resolve(&us10(), d("2025-09-05"), None, || None);
        let v = res.value.unwrap();
        assert_eq!(v.to_string(), "4.2000");
        assert!(matches!(res.provenance, Provenance::Source { ref name, .. } if name == "yahoo"));
    }

    #[test]
    fn failing_primary_falls_through() {
        let (r, _) = resolver(
            MemorySource::new("yahoo").failing("^TNX"),
            MemorySource::new("fred").with_observation("DGS10", d("2025-09-04"), dec!(4.08)),
        );
        let res = r.resolve(&us10(), d("2025-09-05"), None, || None);
        assert_eq!(res.value, Some(dec!(4.08)));
    }

    #[test]
    fn carry_forward_when_chain_is_dry() {
        let (r, _) = resolver(MemorySource::new("yahoo"), MemorySource::new("fred"));
        let lk = LastKnown {
            date: d("2025-09-04"),
            value: dec!(4.1),
        };
        let res = r.resolve(&us10(), d("2025-09-05"), None, || Some(lk));
        assert_eq!(res.value.unwrap().to_string(), "4.1000");
        assert_eq!(
            res.provenance,
            Provenance::CarryForward {
                from: d("2025-09-04")
            }
        );
    }

    #[test]
    fn nothing_anywhere_is_unavailable() {
        let (r, _) = resolver(MemorySource::new("yahoo"), MemorySource::new("fred"));
        let res = r.resolve(&us10(), d("2025-09-05"), None, || None);
        assert!(!res.is_available());
        assert_eq!(res.provenance, Provenance::Unavailable);
    }

    #[test]
    fn fresh_keeps_current_on_miss() {
        let (r, _) = resolver(MemorySource::new("yahoo"), MemorySource::new("fred"));
        let lk = LastKnown {
            date: d("2025-09-04"),
            value: dec!(9.9),
        };
        let res = r.resolve_fresh(&us10(), d("2025-09-05"), Some(dec!(4.3)), || Some(lk));
        assert_eq!(res.value, Some(dec!(4.3)));
        assert_eq!(res.provenance, Provenance::Existing);
    }

    #[test]
    fn fresh_prefers_source_over_current() {
        let (r, _) = resolver(
            MemorySource::new("yahoo").with_point("^TNX", d("2025-09-05"), dec!(43.5)),
            MemorySource::new("fred"),
        );
        let res = r.resolve_fresh(&us10(), d("2025-09-05"), Some(dec!(4.3)), || None);
        assert_eq!(res.value, Some(dec!(4.35)));
    }

    #[test]
    fn history_only_never_calls_adapters() {
        let (r, yahoo) = resolver(
            MemorySource::new("yahoo").with_point("^TNX", d("2025-09-05"), dec!(43.5)),
            MemorySource::new("fred"),
        );
        let res = r.resolve_from_history(&us10(), None, || None);
        assert!(!res.is_available());
        assert_eq!(yahoo.calls(), 0);
    }
}
