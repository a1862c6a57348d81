//! In-memory adapter for tests, fixtures and benchmarks.

use super::source::{PointSource, SeriesSource, SourceError, SourceResult};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted provider: a point table and a dated series table per identifier.
///
/// Identifiers listed with [`MemorySource::failing`] return a network error,
/// which exercises the resolver's degrade-and-continue path.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    points: HashMap<(String, NaiveDate), Decimal>,
    series: HashMap<String, BTreeMap<NaiveDate, Decimal>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_point(mut self, id: &str, date: NaiveDate, value: Decimal) -> Self {
        self.points.insert((id.to_string(), date), value);
        self
    }

    pub fn with_observation(mut self, id: &str, date: NaiveDate, value: Decimal) -> Self {
        self.series
            .entry(id.to_string())
            .or_default()
            .insert(date, value);
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Number of adapter calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn check(&self, id: &str) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.contains(id) {
            return Err(SourceError::NetworkUnreachable(format!(
                "{}: scripted failure for {id}",
                self.name
            )));
        }
        Ok(())
    }
}

impl PointSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_point(&self, instrument: &str, date: NaiveDate) -> SourceResult {
        self.check(instrument)?;
        Ok(self.points.get(&(instrument.to_string(), date)).copied())
    }
}

impl SeriesSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_series_leq(&self, series: &str, date: NaiveDate, lookback: Days) -> SourceResult {
        self.check(series)?;
        let Some(obs) = self.series.get(series) else {
            return Ok(None);
        };
        let start = date.checked_sub_days(lookback).unwrap_or(NaiveDate::MIN);
        Ok(obs.range(start..=date).next_back().map(|(_, v)| *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn series_respects_lookback_window() {
        let src = MemorySource::new("fred")
            .with_observation("IRLTLT01JPM156N", d("2025-08-01"), dec!(1.85))
            .with_observation("IRLTLT01JPM156N", d("2025-10-01"), dec!(1.62));

        let v = src
            .get_series_leq("IRLTLT01JPM156N", d("2025-09-15"), Days::new(180))
            .unwrap();
        assert_eq!(v, Some(dec!(1.85)));

        let v = src
            .get_series_leq("IRLTLT01JPM156N", d("2025-09-15"), Days::new(30))
            .unwrap();
        assert_eq!(v, None);
        assert_eq!(src.calls(), 2);
    }

    #[test]
    fn point_is_exact_date() {
        let src = MemorySource::new("yahoo").with_point("GC=F", d("2025-09-05"), dec!(3613.7));
        assert_eq!(src.get_point("GC=F", d("2025-09-05")).unwrap(), Some(dec!(3613.7)));
        assert_eq!(src.get_point("GC=F", d("2025-09-04")).unwrap(), None);
    }

    #[test]
    fn failing_ids_error() {
        let src = MemorySource::new("yahoo").failing("^TNX");
        assert!(src.get_point("^TNX", d("2025-09-05")).is_err());
    }
}
