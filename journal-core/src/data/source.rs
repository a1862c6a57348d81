//! Source adapter traits and structured error types.
//!
//! Two provider classes exist: daily quote feeds answer "the value on this
//! date", macro series answer "the latest value on or before this date".
//! Adapters report failures as [`SourceError`]; the resolver degrades every
//! error to "unavailable" for that attempt, so nothing here is ever fatal to
//! a run.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use thiserror::Error;

/// `Ok(None)` is "no observation"; `Err` is "the call failed". Both leave the
/// cell to the next step of the chain.
pub type SourceResult = Result<Option<Decimal>, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication rejected by {provider}")]
    AuthenticationRejected { provider: String },

    #[error("{provider} credential not configured (set {env})")]
    MissingCredential { provider: String, env: String },

    #[error("identifier not found: {id}")]
    NotFound { id: String },

    #[error("{provider} circuit breaker open, requests refused")]
    CircuitBreakerTripped { provider: String },

    #[error("HTTP {status} from {provider}")]
    Http { provider: String, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("source error: {0}")]
    Other(String),
}

impl SourceError {
    /// Expected absences that should not be logged at warn on every cell.
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            SourceError::MissingCredential { .. } | SourceError::CircuitBreakerTripped { .. }
        )
    }
}

/// Daily quote adapter: `get_point(instrument, date)`.
pub trait PointSource: Send + Sync {
    /// Registry name, referenced by [`crate::schema::SourceSpec`].
    fn name(&self) -> &str;

    /// Value observed for `instrument` on exactly `date`, in raw provider units.
    fn get_point(&self, instrument: &str, date: NaiveDate) -> SourceResult;
}

/// Series adapter: `get_series_leq(series, date, lookback)`.
pub trait SeriesSource: Send + Sync {
    fn name(&self) -> &str;

    /// Chronologically last non-missing observation dated on or before `date`
    /// and no earlier than `date - lookback`, in raw provider units.
    fn get_series_leq(&self, series: &str, date: NaiveDate, lookback: Days) -> SourceResult;
}

/// Stand-in adapter that never has data. Used for offline runs and for
/// providers switched off in configuration.
#[derive(Debug, Clone)]
pub struct DisabledSource {
    name: String,
}

impl DisabledSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PointSource for DisabledSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_point(&self, _instrument: &str, _date: NaiveDate) -> SourceResult {
        Ok(None)
    }
}

impl SeriesSource for DisabledSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_series_leq(&self, _series: &str, _date: NaiveDate, _lookback: Days) -> SourceResult {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_source_has_no_data() {
        let s = DisabledSource::new("yahoo");
        let d = NaiveDate::from_ymd_opt(2025, 9, 5).unwrap();
        assert!(s.get_point("^N225", d).unwrap().is_none());
        assert!(s.get_series_leq("DGS10", d, Days::new(10)).unwrap().is_none());
        assert_eq!(PointSource::name(&s), "yahoo");
    }

    #[test]
    fn missing_credential_is_quiet() {
        let e = SourceError::MissingCredential {
            provider: "fred".into(),
            env: "FRED_API_KEY".into(),
        };
        assert!(e.is_quiet());
        assert!(e.to_string().contains("FRED_API_KEY"));
        assert!(!SourceError::NetworkUnreachable("x".into()).is_quiet());
    }
}
