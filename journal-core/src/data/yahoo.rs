//! Yahoo Finance daily-quote adapter.
//!
//! Reads one daily close from Yahoo's v8 chart API. Yahoo has no official API
//! and is subject to unannounced format changes; every parse failure is
//! reported as [`SourceError::ResponseFormatChanged`] and degrades to
//! "unavailable" in the resolver.

use super::http::{HttpFetcher, HttpSettings};
use super::source::{PointSource, SourceError, SourceResult};
use chrono::{DateTime, Days, NaiveDate};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

pub const SOURCE_NAME: &str = "yahoo";

const CHART_BASE: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

pub struct YahooSource {
    http: HttpFetcher,
    base_url: String,
}

impl YahooSource {
    pub fn new(settings: &HttpSettings) -> Result<Self, SourceError> {
        Ok(Self {
            http: HttpFetcher::new(SOURCE_NAME, settings)?,
            base_url: CHART_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/{}", self.base_url, encode_symbol(symbol))
    }

    pub fn is_available(&self) -> bool {
        self.http.is_available()
    }
}

/// Percent-encode the characters Yahoo tickers use that are not path-safe.
fn encode_symbol(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len() + 4);
    for c in symbol.chars() {
        match c {
            '^' => out.push_str("%5E"),
            '=' => out.push_str("%3D"),
            ' ' => out.push_str("%20"),
            _ => out.push(c),
        }
    }
    out
}

/// Close of the bar whose exchange-local date is exactly `date`.
fn parse_close(symbol: &str, date: NaiveDate, resp: ChartResponse) -> SourceResult {
    let result = match resp.chart.result {
        Some(r) => r,
        None => {
            return match resp.chart.error {
                Some(err) if err.code == "Not Found" => Err(SourceError::NotFound {
                    id: symbol.to_string(),
                }),
                Some(err) => Err(SourceError::ResponseFormatChanged(format!(
                    "{}: {}",
                    err.code, err.description
                ))),
                None => Err(SourceError::ResponseFormatChanged(
                    "empty result with no error".into(),
                )),
            };
        }
    };

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::ResponseFormatChanged("result array is empty".into()))?;

    // No timestamps means no trading in the window.
    let Some(timestamps) = data.timestamp else {
        return Ok(None);
    };

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::ResponseFormatChanged("no quote data".into()))?;

    if quote.close.len() != timestamps.len() {
        return Err(SourceError::ResponseFormatChanged(format!(
            "{} timestamps but {} closes",
            timestamps.len(),
            quote.close.len()
        )));
    }

    let offset = data.meta.map(|m| m.gmtoffset).unwrap_or(0);

    for (ts, close) in timestamps.iter().zip(quote.close.iter()) {
        let local = DateTime::from_timestamp(ts + offset, 0)
            .ok_or_else(|| SourceError::ResponseFormatChanged(format!("bad timestamp {ts}")))?
            .date_naive();
        if local != date {
            continue;
        }
        return Ok(close.and_then(Decimal::from_f64));
    }

    Ok(None)
}

impl PointSource for YahooSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn get_point(&self, instrument: &str, date: NaiveDate) -> SourceResult {
        let start = date
            .checked_sub_days(Days::new(1))
            .unwrap_or(date)
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or_default();
        let end = date
            .checked_add_days(Days::new(2))
            .unwrap_or(date)
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or_default();
        let period1 = start.to_string();
        let period2 = end.to_string();

        let resp: ChartResponse = self.http.get_json(
            &self.chart_url(instrument),
            &[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
            ],
        )?;

        parse_close(instrument, date, resp)
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
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        parse_close("^N225", d(date), resp)
    }

    // Tokyo bars stamped 00:00 JST land on the previous UTC day.
    const NIKKEI: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "gmtoffset": 32400 },
                "timestamp": [1756998000, 1757257200],
                "indicators": { "quote": [{ "close": [43018.75, 43643.81] }] }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn picks_exchange_local_date() {
        // 1756998000 is 2025-09-04T15:00Z, which is 2025-09-05 in Tokyo
        assert_eq!(parse(NIKKEI, "2025-09-05").unwrap(), Some(dec!(43018.75)));
        assert_eq!(parse(NIKKEI, "2025-09-08").unwrap(), Some(dec!(43643.81)));
    }

    #[test]
    fn absent_date_is_unavailable() {
        assert_eq!(parse(NIKKEI, "2025-09-06").unwrap(), None);
    }

    #[test]
    fn null_close_is_unavailable() {
        let json = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},
            "timestamp":[1757030400],
            "indicators":{"quote":[{"close":[null]}]}}],"error":null}}"#;
        assert_eq!(parse(json, "2025-09-05").unwrap(), None);
    }

    #[test]
    fn no_timestamps_is_unavailable() {
        let json = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},
            "indicators":{"quote":[{}]}}],"error":null}}"#;
        assert_eq!(parse(json, "2025-09-06").unwrap(), None);
    }

    #[test]
    fn not_found_error() {
        let json = r#"{"chart":{"result":null,
            "error":{"code":"Not Found","description":"No data found"}}}"#;
        assert!(matches!(
            parse(json, "2025-09-05"),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn length_mismatch_is_format_change() {
        let json = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},
            "timestamp":[1757030400, 1757116800],
            "indicators":{"quote":[{"close":[1.0]}]}}],"error":null}}"#;
        assert!(matches!(
            parse(json, "2025-09-05"),
            Err(SourceError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn encodes_index_and_fx_tickers() {
        assert_eq!(encode_symbol("^TNX"), "%5ETNX");
        assert_eq!(encode_symbol("EURUSD=X"), "EURUSD%3DX");
        assert_eq!(encode_symbol("BTC-USD"), "BTC-USD");
    }
}
