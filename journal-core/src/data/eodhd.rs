//! EODHD end-of-day adapter, used for the daily government bond yields
//! (`DE10Y.GBOND`, `JP10Y.GBOND`, `UK10Y.GBOND`).

use super::http::{HttpFetcher, HttpSettings};
use super::source::{PointSource, SourceError, SourceResult};
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};

pub const SOURCE_NAME: &str = "eodhd";

pub const DEFAULT_KEY_ENV: &str = "EODHD_API_TOKEN";

const EOD_BASE: &str = "https://eodhd.com/api/eod";

#[derive(Debug, Deserialize)]
struct EodBar {
    date: String,
    close: Option<f64>,
}

pub struct EodhdSource {
    http: HttpFetcher,
    api_token: Option<String>,
    key_env: String,
    base_url: String,
    warned_missing_key: AtomicBool,
}

impl EodhdSource {
    pub fn new(
        settings: &HttpSettings,
        api_token: Option<String>,
        key_env: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new(SOURCE_NAME, settings)?,
            api_token: api_token.filter(|k| !k.trim().is_empty()),
            key_env: key_env.to_string(),
            base_url: EOD_BASE.to_string(),
            warned_missing_key: AtomicBool::new(false),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_token.is_some()
    }
}

fn close_on(date: NaiveDate, bars: Vec<EodBar>) -> SourceResult {
    let target = date.format("%Y-%m-%d").to_string();
    Ok(bars
        .into_iter()
        .find(|b| b.date == target)
        .and_then(|b| b.close)
        .and_then(Decimal::from_f64))
}

impl PointSource for EodhdSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn get_point(&self, instrument: &str, date: NaiveDate) -> SourceResult {
        let Some(token) = self.api_token.as_deref() else {
            if !self.warned_missing_key.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    provider = SOURCE_NAME,
                    env = %self.key_env,
                    "API token not configured; source disabled for this run"
                );
            }
            return Err(SourceError::MissingCredential {
                provider: SOURCE_NAME.to_string(),
                env: self.key_env.clone(),
            });
        };

        let day = date.format("%Y-%m-%d").to_string();
        let bars: Vec<EodBar> = self.http.get_json(
            &format!("{}/{}", self.base_url, instrument),
            &[
                ("api_token", token),
                ("fmt", "json"),
                ("period", "d"),
                ("from", day.as_str()),
                ("to", day.as_str()),
            ],
        )?;

        close_on(date, bars)
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
    fn reads_close_for_exact_date() {
        let bars: Vec<EodBar> = serde_json::from_str(
            r#"[{"date":"2025-09-05","open":2.70,"high":2.73,"low":2.65,
                 "close":2.662,"adjusted_close":2.662,"volume":0}]"#,
        )
        .unwrap();
        assert_eq!(close_on(d("2025-09-05"), bars).unwrap(), Some(dec!(2.662)));
    }

    #[test]
    fn holiday_is_unavailable() {
        let bars: Vec<EodBar> = serde_json::from_str("[]").unwrap();
        assert_eq!(close_on(d("2025-09-06"), bars).unwrap(), None);
    }

    #[test]
    fn missing_token_is_credential_error() {
        let src = EodhdSource::new(&HttpSettings::default(), Some("  ".into()), DEFAULT_KEY_ENV)
            .unwrap();
        assert!(!src.has_credential());
        assert!(matches!(
            src.get_point("DE10Y.GBOND", d("2025-09-05")),
            Err(SourceError::MissingCredential { .. })
        ));
    }
}
