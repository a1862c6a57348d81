//! FRED series-observations adapter.
//!
//! Answers "latest value on or before the date" for daily and monthly macro
//! series. Monthly OECD yields publish once per month, so the look-back
//! window has to span at least one month boundary.

use super::http::{HttpFetcher, HttpSettings};
use super::source::{SeriesSource, SourceError, SourceResult};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

pub const SOURCE_NAME: &str = "fred";

/// Environment variable the API key is read from unless configured otherwise.
pub const DEFAULT_KEY_ENV: &str = "FRED_API_KEY";

const OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

pub struct FredSource {
    http: HttpFetcher,
    api_key: Option<String>,
    key_env: String,
    base_url: String,
    warned_missing_key: AtomicBool,
}

impl FredSource {
    /// `api_key` is resolved by the caller; `key_env` only names it in logs.
    pub fn new(
        settings: &HttpSettings,
        api_key: Option<String>,
        key_env: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new(SOURCE_NAME, settings)?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            key_env: key_env.to_string(),
            base_url: OBSERVATIONS_URL.to_string(),
            warned_missing_key: AtomicBool::new(false),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn missing_key(&self) -> SourceError {
        if !self.warned_missing_key.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                provider = SOURCE_NAME,
                env = %self.key_env,
                "API key not configured; source disabled for this run"
            );
        }
        SourceError::MissingCredential {
            provider: SOURCE_NAME.to_string(),
            env: self.key_env.clone(),
        }
    }
}

/// Chronologically last non-missing observation dated on or before `date`.
/// FRED writes a missing observation as `"."`.
fn latest_leq(series: &str, date: NaiveDate, resp: ObservationsResponse) -> SourceResult {
    let mut best: Option<(NaiveDate, Decimal)> = None;

    for obs in resp.observations {
        let raw = obs.value.trim();
        if raw.is_empty() || raw == "." {
            continue;
        }
        let obs_date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|_| {
            SourceError::ResponseFormatChanged(format!("{series}: bad date '{}'", obs.date))
        })?;
        if obs_date > date {
            continue;
        }
        let value = Decimal::from_str(raw).map_err(|_| {
            SourceError::ResponseFormatChanged(format!("{series}: bad value '{raw}'"))
        })?;
        match best {
            Some((d, _)) if d > obs_date => {}
            _ => best = Some((obs_date, value)),
        }
    }

    Ok(best.map(|(_, v)| v))
}

impl SeriesSource for FredSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn get_series_leq(&self, series: &str, date: NaiveDate, lookback: Days) -> SourceResult {
        let Some(key) = self.api_key.as_deref() else {
            return Err(self.missing_key());
        };

        let start = date.checked_sub_days(lookback).unwrap_or(NaiveDate::MIN);
        let start = start.format("%Y-%m-%d").to_string();
        let end = date.format("%Y-%m-%d").to_string();

        let resp: ObservationsResponse = self.http.get_json(
            &self.base_url,
            &[
                ("series_id", series),
                ("api_key", key),
                ("file_type", "json"),
                ("observation_start", start.as_str()),
                ("observation_end", end.as_str()),
                ("sort_order", "asc"),
            ],
        )?;

        latest_leq(series, date, resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn parse(json: &str, date: &str) -> SourceResult {
        let resp: ObservationsResponse = serde_json::from_str(json).unwrap();
        latest_leq("IRLTLT01JPM156N", d(date), resp)
    }

    const MONTHLY: &str = r#"{"observations":[
        {"date":"2025-07-01","value":"1.5800"},
        {"date":"2025-08-01","value":"1.8500"},
        {"date":"2025-09-01","value":"."}
    ]}"#;

    #[test]
    fn carries_last_monthly_figure_forward() {
        assert_eq!(parse(MONTHLY, "2025-09-15").unwrap(), Some(dec!(1.85)));
    }

    #[test]
    fn ignores_observations_after_date() {
        assert_eq!(parse(MONTHLY, "2025-07-31").unwrap(), Some(dec!(1.58)));
    }

    #[test]
    fn empty_window_is_unavailable() {
        assert_eq!(parse(r#"{"observations":[]}"#, "2025-09-15").unwrap(), None);
        assert_eq!(parse(MONTHLY, "2025-06-30").unwrap(), None);
    }

    #[test]
    fn order_of_rows_does_not_matter() {
        let json = r#"{"observations":[
            {"date":"2025-08-01","value":"1.85"},
            {"date":"2025-07-01","value":"1.58"}
        ]}"#;
        assert_eq!(parse(json, "2025-09-15").unwrap(), Some(dec!(1.85)));
    }

    #[test]
    fn garbage_value_is_format_change() {
        let json = r#"{"observations":[{"date":"2025-08-01","value":"NaN%"}]}"#;
        assert!(matches!(
            parse(json, "2025-09-15"),
            Err(SourceError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn missing_key_degrades_without_network() {
        let src = FredSource::new(&HttpSettings::default(), None, DEFAULT_KEY_ENV).unwrap();
        assert!(!src.has_credential());
        let err = src
            .get_series_leq("DGS10", d("2025-09-05"), Days::new(10))
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingCredential { .. }));
        // second call stays quiet but still refuses
        assert!(src
            .get_series_leq("DGS10", d("2025-09-05"), Days::new(10))
            .is_err());
    }
}
